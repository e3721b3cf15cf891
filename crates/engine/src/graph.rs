//! Pipeline graph - arena-backed chain state and the relink algorithm
//!
//! Processors live in a slab owned by the pipeline and refer to each other
//! by slot key (`next`/`prev`), never by pointer. Head and Tail are
//! ordinary slots pinned to the reserved sentinel priorities.
//!
//! Every method here runs with the pipeline lock already held: `&self`
//! methods under the read lock, `&mut self` methods under the write lock.

use std::sync::Arc;
use std::time::Instant;

use contracts::{PipelineError, Result, HEAD_PRIORITY, TAIL_PRIORITY};
use slab::Slab;
use tracing::trace;

use crate::data::DataType;
use crate::error_support::{ErrorReporter, ErrorSupport};
use crate::node::{ChainSnapshot, NodeInfo, NodeRole, NodeState, PointGroupInfo};
use crate::stage::{Passthrough, Stage, StageContext};

pub(crate) const HEAD_NAME: &str = "head";
pub(crate) const TAIL_NAME: &str = "tail";

/// Local output registered on a node (peek tap)
pub(crate) struct Tap<D: DataType> {
    pub uid: u64,
    pub id: String,
    pub data: D::Data,
}

pub(crate) struct NodeSlot<D: DataType> {
    pub state: NodeState,
    pub role: NodeRole,
    pub stage: Arc<dyn Stage<D>>,
    pub input: D::Data,
    pub output: D::Data,
    pub taps: Vec<Tap<D>>,
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

impl<D: DataType> NodeSlot<D> {
    /// Bypassed nodes pass their output straight through
    pub fn input_data(&self) -> D::Data {
        if self.state.bypassed {
            self.output.clone()
        } else {
            self.input.clone()
        }
    }

    fn info(&self) -> NodeInfo {
        NodeInfo {
            name: self.state.name.clone(),
            role: self.role,
            priority: self.state.priority,
            enabled: self.state.enabled,
            bypassed: self.state.bypassed,
            taps: self.taps.iter().map(|t| t.id.clone()).collect(),
        }
    }
}

pub(crate) struct EntrySlot<D: DataType> {
    pub uid: u64,
    pub id: String,
    pub enabled: bool,
    /// Current target of the entry point's forwarder
    pub value: D::Data,
}

pub(crate) struct InputSlot<D: DataType> {
    pub uid: u64,
    pub name: String,
    pub enabled: bool,
    pub stage: Arc<dyn Stage<D>>,
    pub value: D::Data,
    pub entries: Vec<EntrySlot<D>>,
}

pub(crate) struct EndSlot<D: DataType> {
    pub uid: u64,
    pub id: String,
    pub enabled: bool,
    pub data: D::Data,
}

pub(crate) struct OutputSlot<D: DataType> {
    pub uid: u64,
    pub name: String,
    pub enabled: bool,
    pub stage: Arc<dyn Stage<D>>,
    pub value: D::Data,
    pub ends: Vec<EndSlot<D>>,
}

/// Binds stages with the pipeline's data type and error support
pub(crate) struct Binder<'a, D: DataType> {
    pub data_type: &'a D,
    pub errors: &'a Arc<ErrorSupport>,
}

impl<D: DataType> Binder<'_, D> {
    fn bind(&self, stage: &dyn Stage<D>, name: &str, output: D::Data) -> D::Data {
        let reporter = ErrorReporter::new(name, Arc::clone(self.errors));
        let ctx = StageContext::new(name, self.data_type, reporter);
        stage.bind(output, &ctx)
    }
}

/// What a structural mutation requires afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    /// Nothing observable changed
    None,
    /// Re-sort the active chain and recompute everything
    Relink,
    /// Recompute from this node back to the head
    Cascade(usize),
    /// Recompute head inputs and their entry points only
    Inputs,
    /// Recompute tail outputs, then cascade from the tail
    Outputs,
}

pub(crate) struct Graph<D: DataType> {
    pub nodes: Slab<NodeSlot<D>>,
    /// Enabled nodes sorted by `(priority, seq)`; head first, tail last
    pub active: Vec<usize>,
    pub head: usize,
    pub tail: usize,
    pub inputs: Vec<InputSlot<D>>,
    pub outputs: Vec<OutputSlot<D>>,
    counter: u64,
}

impl<D: DataType> Graph<D> {
    pub fn new(binder: &Binder<'_, D>) -> Self {
        let mut graph = Self {
            nodes: Slab::new(),
            active: Vec::with_capacity(2),
            head: 0,
            tail: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            counter: 0,
        };
        graph.head = graph.insert_node(
            NodeRole::Head,
            HEAD_NAME,
            HEAD_PRIORITY,
            Arc::new(Passthrough),
            binder,
        );
        graph.tail = graph.insert_node(
            NodeRole::Tail,
            TAIL_NAME,
            TAIL_PRIORITY,
            Arc::new(Passthrough),
            binder,
        );
        for key in [graph.head, graph.tail] {
            graph.nodes[key].state.enabled = true;
            graph.active.push(key);
        }
        graph.relink(binder);
        graph
    }

    /// Next value of the shared sequence (insertion order, uids, generations)
    pub fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn insert_node(
        &mut self,
        role: NodeRole,
        name: &str,
        priority: i64,
        stage: Arc<dyn Stage<D>>,
        binder: &Binder<'_, D>,
    ) -> usize {
        let seq = self.next_id();
        let empty = binder.data_type.empty();
        self.nodes.insert(NodeSlot {
            state: NodeState {
                name: name.to_string(),
                priority,
                enabled: false,
                bypassed: false,
                seq,
                generation: seq,
            },
            role,
            stage,
            input: empty.clone(),
            output: empty,
            taps: Vec::new(),
            next: None,
            prev: None,
        })
    }

    /// Register a disabled processor; returns `(key, generation)`
    pub fn insert_processor(
        &mut self,
        name: &str,
        priority: i64,
        stage: Arc<dyn Stage<D>>,
        binder: &Binder<'_, D>,
    ) -> Result<(usize, u64)> {
        check_priority(priority)?;
        if name == HEAD_NAME || name == TAIL_NAME {
            return Err(PipelineError::sentinel(name, "register"));
        }
        if self.find_processor(name).is_some() {
            return Err(PipelineError::duplicate_id("pipeline processors", name));
        }
        let key = self.insert_node(NodeRole::Processor, name, priority, stage, binder);
        let generation = self.nodes[key].state.generation;
        Ok((key, generation))
    }

    pub fn find_processor(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .find(|(_, n)| n.role == NodeRole::Processor && n.state.name == name)
            .map(|(key, _)| key)
    }

    /// Slot for a handle, if the handle is still current
    pub fn node(&self, key: usize, generation: u64) -> Option<&NodeSlot<D>> {
        self.nodes
            .get(key)
            .filter(|n| n.state.generation == generation)
    }

    pub fn node_mut(&mut self, key: usize, generation: u64) -> Option<&mut NodeSlot<D>> {
        self.nodes
            .get_mut(key)
            .filter(|n| n.state.generation == generation)
    }

    pub fn is_active(&self, key: usize) -> bool {
        self.active.contains(&key)
    }

    /// Put an enabled node back into the active list (sorted on relink)
    pub fn activate(&mut self, key: usize) {
        if !self.is_active(key) {
            self.active.push(key);
        }
    }

    /// Drop a node from the active chain; its output goes stale
    pub fn deactivate(&mut self, key: usize) {
        self.active.retain(|k| *k != key);
        if let Some(node) = self.nodes.get_mut(key) {
            node.next = None;
            node.prev = None;
        }
    }

    pub fn remove_processor(&mut self, key: usize) -> NodeSlot<D> {
        self.deactivate(key);
        self.nodes.remove(key)
    }

    /// Apply the follow-up a mutation asked for
    pub fn apply(&mut self, change: Change, binder: &Binder<'_, D>) {
        match change {
            Change::None => {}
            Change::Relink => self.relink(binder),
            Change::Cascade(key) => self.cascade_from(key, binder),
            Change::Inputs => self.recompute_inputs(binder),
            Change::Outputs => {
                self.recompute_outputs(binder);
                let tail = self.tail;
                self.cascade_from(tail, binder);
            }
        }
    }

    /// Full relink: re-sort, rewire `next`/`prev`, recompute tail to head
    pub fn relink(&mut self, binder: &Binder<'_, D>) {
        let started = Instant::now();

        let nodes = &self.nodes;
        self.active.sort_by_key(|key| nodes[*key].state.sort_key());

        for (_, node) in self.nodes.iter_mut() {
            node.next = None;
            node.prev = None;
        }

        self.recompute_outputs(binder);

        for idx in (0..self.active.len()).rev() {
            let key = self.active[idx];
            let next = self.active.get(idx + 1).copied();
            let prev = idx.checked_sub(1).map(|p| self.active[p]);
            let node = &mut self.nodes[key];
            node.next = next;
            node.prev = prev;
            self.recompute_node(key, binder);
        }

        self.recompute_inputs(binder);

        observability::record_relink(self.active.len().saturating_sub(2), started.elapsed());
        trace!(active = self.active.len(), "Relink complete");
    }

    /// Recompute `key` and everything upstream of it
    pub fn cascade_from(&mut self, key: usize, binder: &Binder<'_, D>) {
        if !self.is_active(key) {
            return;
        }
        let mut cursor = Some(key);
        while let Some(current) = cursor {
            self.recompute_node(current, binder);
            cursor = self.nodes[current].prev;
        }
        self.recompute_inputs(binder);
    }

    /// `output = wrap(taps ++ downstream)`, `input = stage(output)`
    fn recompute_node(&mut self, key: usize, binder: &Binder<'_, D>) {
        let downstream = if key == self.tail {
            self.tail_downstream(binder)
        } else {
            match self.nodes[key].next {
                Some(next) => self.nodes[next].input_data(),
                None => binder.data_type.empty(),
            }
        };

        let node = &self.nodes[key];
        let mut items: Vec<D::Data> = node.taps.iter().map(|t| t.data.clone()).collect();
        items.push(downstream);
        let output = binder.data_type.wrap_all(&items);

        let stage = Arc::clone(&node.stage);
        let name = node.state.name.clone();
        let input = binder.bind(stage.as_ref(), &name, output.clone());

        let node = &mut self.nodes[key];
        node.output = output;
        node.input = input;
    }

    fn tail_downstream(&self, binder: &Binder<'_, D>) -> D::Data {
        let values: Vec<D::Data> = self
            .outputs
            .iter()
            .filter(|o| o.enabled)
            .map(|o| o.value.clone())
            .collect();
        binder.data_type.wrap_all(&values)
    }

    /// Each output's value is its stage applied to the wrap of its
    /// enabled end points
    pub fn recompute_outputs(&mut self, binder: &Binder<'_, D>) {
        for output in &mut self.outputs {
            let ends: Vec<D::Data> = output
                .ends
                .iter()
                .filter(|e| e.enabled)
                .map(|e| e.data.clone())
                .collect();
            let wrapped = binder.data_type.wrap_all(&ends);
            output.value = binder.bind(output.stage.as_ref(), &output.name, wrapped);
        }
    }

    /// Each input binds to the head's output; entry points follow their
    /// input unless either is disabled
    pub fn recompute_inputs(&mut self, binder: &Binder<'_, D>) {
        let head_output = self.nodes[self.head].output.clone();
        for input in &mut self.inputs {
            input.value = binder.bind(input.stage.as_ref(), &input.name, head_output.clone());
            for entry in &mut input.entries {
                entry.value = if input.enabled && entry.enabled {
                    input.value.clone()
                } else {
                    binder.data_type.empty()
                };
            }
        }
    }

    pub fn input(&self, uid: u64) -> Option<&InputSlot<D>> {
        self.inputs.iter().find(|i| i.uid == uid)
    }

    pub fn input_mut(&mut self, uid: u64) -> Option<&mut InputSlot<D>> {
        self.inputs.iter_mut().find(|i| i.uid == uid)
    }

    pub fn output(&self, uid: u64) -> Option<&OutputSlot<D>> {
        self.outputs.iter().find(|o| o.uid == uid)
    }

    pub fn output_mut(&mut self, uid: u64) -> Option<&mut OutputSlot<D>> {
        self.outputs.iter_mut().find(|o| o.uid == uid)
    }

    pub fn entry(&self, input_uid: u64, uid: u64) -> Option<&EntrySlot<D>> {
        self.input(input_uid)
            .and_then(|i| i.entries.iter().find(|e| e.uid == uid))
    }

    /// Names of active processors in dispatch order
    pub fn active_names(&self) -> Vec<String> {
        self.active
            .iter()
            .map(|key| &self.nodes[*key])
            .filter(|n| n.role == NodeRole::Processor)
            .map(|n| n.state.name.clone())
            .collect()
    }

    pub fn snapshot(&self, pipeline: &str) -> ChainSnapshot {
        let mut registered: Vec<&NodeSlot<D>> = self
            .nodes
            .iter()
            .map(|(_, n)| n)
            .filter(|n| n.role == NodeRole::Processor)
            .collect();
        registered.sort_by_key(|n| n.state.seq);

        ChainSnapshot {
            pipeline: pipeline.to_string(),
            active: self.active.iter().map(|k| self.nodes[*k].info()).collect(),
            registered: registered.into_iter().map(|n| n.info()).collect(),
            inputs: self
                .inputs
                .iter()
                .map(|i| PointGroupInfo {
                    name: i.name.clone(),
                    enabled: i.enabled,
                    points: i.entries.iter().map(|e| (e.id.clone(), e.enabled)).collect(),
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|o| PointGroupInfo {
                    name: o.name.clone(),
                    enabled: o.enabled,
                    points: o.ends.iter().map(|e| (e.id.clone(), e.enabled)).collect(),
                })
                .collect(),
        }
    }
}

/// Sentinel priorities are not available to processors
pub(crate) fn check_priority(priority: i64) -> Result<()> {
    if priority == HEAD_PRIORITY || priority == TAIL_PRIORITY {
        return Err(PipelineError::ReservedPriority { priority });
    }
    Ok(())
}
