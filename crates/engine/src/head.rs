//! Head sentinel - fan-in side of a pipeline
//!
//! ```text
//! EntryPoint ─┐
//! EntryPoint ─┼─ Input ─┐
//!             │         ├─ Head ─ processors ─ Tail
//! EntryPoint ─┴─ Input ─┘
//! ```
//!
//! Every input binds its own stage against the head's output; entry points
//! hand out lock-guarded forwarders to their input's value.

use std::fmt;
use std::sync::Arc;

use contracts::{PipelineError, Registration, Result};
use tracing::debug;

use crate::data::DataType;
use crate::graph::{Change, EntrySlot, InputSlot};
use crate::pipeline::{Forward, Shared};
use crate::processor::{add_tap, TapRegistration};
use crate::stage::{Passthrough, Stage};

/// Fan-in sentinel of a pipeline
pub struct Head<D: DataType> {
    shared: Arc<Shared<D>>,
}

impl<D: DataType> Head<D> {
    pub(crate) fn new(shared: Arc<Shared<D>>) -> Self {
        Self { shared }
    }

    /// Register an input that forwards entry point data unchanged
    pub fn add_input(&self, name: &str) -> Result<Input<D>> {
        self.add_input_with(name, Passthrough)
    }

    /// Register an input transforming everything its entry points receive
    pub fn add_input_with<S: Stage<D>>(&self, name: &str, stage: S) -> Result<Input<D>> {
        self.add_shared_input(name, Arc::new(stage))
    }

    pub fn add_shared_input(&self, name: &str, stage: Arc<dyn Stage<D>>) -> Result<Input<D>> {
        let uid = self.shared.mutate(|graph, binder| {
            if graph.inputs.iter().any(|i| i.name == name) {
                return Err(PipelineError::duplicate_id("head inputs", name));
            }
            let uid = graph.next_id();
            graph.inputs.push(InputSlot {
                uid,
                name: name.to_string(),
                enabled: true,
                stage,
                value: binder.data_type.empty(),
                entries: Vec::new(),
            });
            Ok((uid, Change::Inputs))
        })?;

        debug!(pipeline = %self.shared.name, input = name, "Input registered");
        Ok(Input::new(Arc::clone(&self.shared), uid, name))
    }

    pub fn input(&self, name: &str) -> Option<Input<D>> {
        let uid = self
            .shared
            .read(|graph| graph.inputs.iter().find(|i| i.name == name).map(|i| i.uid))?;
        Some(Input::new(Arc::clone(&self.shared), uid, name))
    }

    /// Input names in registration order
    pub fn inputs(&self) -> Vec<String> {
        self.shared
            .read(|graph| graph.inputs.iter().map(|i| i.name.clone()).collect())
    }

    /// Observe every value entering the chain
    pub fn peek(&self, id: &str, data: D::Data) -> Result<TapRegistration<D>> {
        let (key, generation) = self
            .shared
            .read(|graph| (graph.head, graph.nodes[graph.head].state.generation));
        add_tap(&self.shared, key, generation, "head", id, data)
    }

    /// Value the head forwards into the chain
    pub fn output_data(&self) -> D::Data {
        self.shared
            .read(|graph| graph.nodes[graph.head].output.clone())
    }
}

/// Named group of entry points sharing one stage
pub struct Input<D: DataType> {
    shared: Arc<Shared<D>>,
    uid: u64,
    name: String,
}

impl<D: DataType> Clone for Input<D> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.shared), self.uid, &self.name)
    }
}

impl<D: DataType> fmt::Debug for Input<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl<D: DataType> Input<D> {
    fn new(shared: Arc<Shared<D>>, uid: u64, name: &str) -> Self {
        Self {
            shared,
            uid,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create an enabled entry point; ids are unique within this input
    pub fn create_entry_point(&self, id: &str) -> Result<EntryPoint<D>> {
        let uid = self.shared.mutate(|graph, binder| {
            let uid = graph.next_id();
            let input = graph
                .input_mut(self.uid)
                .ok_or_else(|| PipelineError::not_registered(&self.name))?;
            if input.entries.iter().any(|e| e.id == id) {
                return Err(PipelineError::duplicate_id(
                    format!("input '{}'", self.name),
                    id,
                ));
            }
            input.entries.push(EntrySlot {
                uid,
                id: id.to_string(),
                enabled: true,
                value: binder.data_type.empty(),
            });
            Ok((uid, Change::Inputs))
        })?;

        debug!(pipeline = %self.shared.name, input = %self.name, entry_point = id, "Entry point created");
        Ok(EntryPoint::new(&self.shared, self.uid, uid, id))
    }

    pub fn entry_point(&self, id: &str) -> Option<EntryPoint<D>> {
        let uid = self.shared.read(|graph| {
            graph
                .input(self.uid)
                .and_then(|i| i.entries.iter().find(|e| e.id == id))
                .map(|e| e.uid)
        })?;
        Some(EntryPoint::new(&self.shared, self.uid, uid, id))
    }

    pub fn entry_points(&self) -> Vec<String> {
        self.shared.read(|graph| {
            graph
                .input(self.uid)
                .map(|i| i.entries.iter().map(|e| e.id.clone()).collect())
                .unwrap_or_default()
        })
    }

    /// Disabled inputs silence all of their entry points
    pub fn enable(&self, enabled: bool) -> Result<&Self> {
        self.shared.mutate(|graph, _| {
            let input = graph
                .input_mut(self.uid)
                .ok_or_else(|| PipelineError::not_registered(&self.name))?;
            if input.enabled == enabled {
                return Ok(((), Change::None));
            }
            input.enabled = enabled;
            Ok(((), Change::Inputs))
        })?;
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared
            .read(|graph| graph.input(self.uid).is_some_and(|i| i.enabled))
    }
}

impl<D: DataType> Registration for Input<D> {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn is_registered(&self) -> bool {
        self.shared.read(|graph| graph.input(self.uid).is_some())
    }

    /// Remove the input together with its entry points
    fn unregister(&self) -> Result<()> {
        self.shared.mutate(|graph, _| {
            let before = graph.inputs.len();
            graph.inputs.retain(|i| i.uid != self.uid);
            if graph.inputs.len() == before {
                return Err(PipelineError::already_unregistered(&self.name));
            }
            Ok(((), Change::None))
        })?;
        debug!(pipeline = %self.shared.name, input = %self.name, "Input unregistered");
        Ok(())
    }
}

/// Where external callers push data into a pipeline
pub struct EntryPoint<D: DataType> {
    shared: Arc<Shared<D>>,
    input_uid: u64,
    uid: u64,
    id: String,
    forwarder: D::Data,
}

impl<D: DataType> Clone for EntryPoint<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            input_uid: self.input_uid,
            uid: self.uid,
            id: self.id.clone(),
            forwarder: self.forwarder.clone(),
        }
    }
}

impl<D: DataType> fmt::Debug for EntryPoint<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl<D: DataType> EntryPoint<D> {
    fn new(shared: &Arc<Shared<D>>, input_uid: u64, uid: u64, id: &str) -> Self {
        let forwarder = shared
            .data_type
            .forward(Forward::new(shared, input_uid, uid, id));
        Self {
            shared: Arc::clone(shared),
            input_uid,
            uid,
            id: id.to_string(),
            forwarder,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stable value to invoke; survives every relink
    ///
    /// Invoking it takes the pipeline read lock for the whole dispatch.
    /// Values pushed while the entry point is disabled are dropped silently.
    pub fn input(&self) -> D::Data {
        self.forwarder.clone()
    }

    /// Current raw target of the forwarder
    pub fn input_data(&self) -> Result<D::Data> {
        self.shared
            .read(|graph| {
                graph
                    .entry(self.input_uid, self.uid)
                    .map(|e| e.value.clone())
            })
            .ok_or_else(|| PipelineError::not_registered(&self.id))
    }

    pub fn enable(&self, enabled: bool) -> Result<&Self> {
        self.shared.mutate(|graph, _| {
            let entry = graph
                .input_mut(self.input_uid)
                .and_then(|i| i.entries.iter_mut().find(|e| e.uid == self.uid))
                .ok_or_else(|| PipelineError::not_registered(&self.id))?;
            if entry.enabled == enabled {
                return Ok(((), Change::None));
            }
            entry.enabled = enabled;
            Ok(((), Change::Inputs))
        })?;
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.read(|graph| {
            graph
                .entry(self.input_uid, self.uid)
                .is_some_and(|e| e.enabled)
        })
    }
}

impl<D: DataType> Registration for EntryPoint<D> {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn is_registered(&self) -> bool {
        self.shared
            .read(|graph| graph.entry(self.input_uid, self.uid).is_some())
    }

    /// Outstanding forwarders become no-ops
    fn unregister(&self) -> Result<()> {
        self.shared.mutate(|graph, _| {
            let input = graph
                .input_mut(self.input_uid)
                .ok_or_else(|| PipelineError::already_unregistered(&self.id))?;
            let before = input.entries.len();
            input.entries.retain(|e| e.uid != self.uid);
            if input.entries.len() == before {
                return Err(PipelineError::already_unregistered(&self.id));
            }
            Ok(((), Change::None))
        })?;
        debug!(pipeline = %self.shared.name, entry_point = %self.id, "Entry point unregistered");
        Ok(())
    }
}
