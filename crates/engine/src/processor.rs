//! Processor handles and peek taps
//!
//! A [`ProcessorHandle`] addresses its arena slot by `(key, generation)`;
//! once the processor is unregistered every call on a stale handle fails
//! with `NotRegistered` instead of touching a recycled slot.

use std::fmt;
use std::sync::Arc;

use contracts::{PipelineError, Registration, Result};
use tracing::{debug, info};

use crate::data::DataType;
use crate::graph::{check_priority, Change, Tap, HEAD_NAME, TAIL_NAME};
use crate::pipeline::Shared;

/// Handle to one registered processor
pub struct ProcessorHandle<D: DataType> {
    shared: Arc<Shared<D>>,
    key: usize,
    generation: u64,
    label: String,
}

impl<D: DataType> Clone for ProcessorHandle<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            key: self.key,
            generation: self.generation,
            label: self.label.clone(),
        }
    }
}

impl<D: DataType> fmt::Debug for ProcessorHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("name", &self.name())
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl<D: DataType> ProcessorHandle<D> {
    pub(crate) fn new(shared: Arc<Shared<D>>, key: usize, generation: u64, name: &str) -> Self {
        Self {
            shared,
            key,
            generation,
            label: name.to_string(),
        }
    }

    fn not_registered(&self) -> PipelineError {
        PipelineError::not_registered(&self.label)
    }

    fn read<R>(&self, f: impl FnOnce(&crate::graph::NodeSlot<D>) -> R) -> Result<R> {
        self.shared
            .read(|graph| graph.node(self.key, self.generation).map(f))
            .ok_or_else(|| self.not_registered())
    }

    /// Current name (falls back to the registration name once unregistered)
    pub fn name(&self) -> String {
        self.read(|n| n.state.name.clone())
            .unwrap_or_else(|_| self.label.clone())
    }

    pub fn priority(&self) -> Result<i64> {
        self.read(|n| n.state.priority)
    }

    pub fn is_enabled(&self) -> bool {
        self.read(|n| n.state.enabled).unwrap_or(false)
    }

    pub fn is_bypassed(&self) -> bool {
        self.read(|n| n.state.bypassed).unwrap_or(false)
    }

    /// Whether the processor currently sits in the active chain
    pub fn is_active(&self) -> bool {
        self.shared.read(|graph| {
            graph.node(self.key, self.generation).is_some() && graph.is_active(self.key)
        })
    }

    /// Value callers of this processor invoke (output itself when bypassed)
    pub fn input_data(&self) -> Result<D::Data> {
        self.read(|n| n.input_data())
    }

    /// Wrap of this processor's taps and its downstream neighbour
    pub fn output_data(&self) -> Result<D::Data> {
        self.read(|n| n.output.clone())
    }

    /// Join or leave the active chain; triggers a full relink on change
    pub fn enable(&self, enabled: bool) -> Result<&Self> {
        let changed = self.shared.mutate(|graph, _| {
            let node = graph
                .node_mut(self.key, self.generation)
                .ok_or_else(|| self.not_registered())?;
            if node.state.enabled == enabled {
                return Ok((false, Change::None));
            }
            node.state.enabled = enabled;
            if enabled {
                graph.activate(self.key);
            } else {
                graph.deactivate(self.key);
            }
            Ok((true, Change::Relink))
        })?;

        if changed {
            info!(
                pipeline = %self.shared.name,
                processor = %self.name(),
                enabled,
                "Processor toggled"
            );
        }
        Ok(self)
    }

    /// Keep the processor linked but skip its transformation
    ///
    /// Taps keep observing while bypassed. Only the upstream part of the
    /// chain is recomputed.
    pub fn bypass(&self, bypassed: bool) -> Result<&Self> {
        let changed = self.shared.mutate(|graph, _| {
            let node = graph
                .node_mut(self.key, self.generation)
                .ok_or_else(|| self.not_registered())?;
            if node.state.bypassed == bypassed {
                return Ok((false, Change::None));
            }
            node.state.bypassed = bypassed;
            Ok((true, Change::Cascade(self.key)))
        })?;

        if changed {
            info!(
                pipeline = %self.shared.name,
                processor = %self.name(),
                bypassed,
                "Processor bypass toggled"
            );
        }
        Ok(self)
    }

    /// Move the processor; it is ordered after existing peers of equal
    /// priority
    pub fn set_priority(&self, priority: i64) -> Result<&Self> {
        check_priority(priority)?;
        self.shared.mutate(|graph, _| {
            let current = graph
                .node(self.key, self.generation)
                .ok_or_else(|| self.not_registered())?
                .state
                .priority;
            if current == priority {
                return Ok(((), Change::None));
            }
            let seq = graph.next_id();
            let active = graph.is_active(self.key);
            let node = &mut graph.nodes[self.key];
            node.state.priority = priority;
            node.state.seq = seq;
            Ok(((), if active { Change::Relink } else { Change::None }))
        })?;
        Ok(self)
    }

    pub fn rename(&self, name: &str) -> Result<&Self> {
        self.shared.mutate(|graph, _| {
            let current = graph
                .node(self.key, self.generation)
                .ok_or_else(|| self.not_registered())?
                .state
                .name
                .clone();
            if current == name {
                return Ok(((), Change::None));
            }
            if name == HEAD_NAME || name == TAIL_NAME {
                return Err(PipelineError::sentinel(name, "rename"));
            }
            if graph.find_processor(name).is_some_and(|k| k != self.key) {
                return Err(PipelineError::duplicate_id("pipeline processors", name));
            }
            graph.nodes[self.key].state.name = name.to_string();
            // stages see their name at bind time
            Ok(((), Change::Cascade(self.key)))
        })?;
        Ok(self)
    }

    /// Register a local output observing what this processor forwards
    pub fn peek(&self, id: &str, data: D::Data) -> Result<TapRegistration<D>> {
        add_tap(&self.shared, self.key, self.generation, &self.label, id, data)
    }

    /// Ids of the taps currently registered on this processor
    pub fn taps(&self) -> Vec<String> {
        self.read(|n| n.taps.iter().map(|t| t.id.clone()).collect())
            .unwrap_or_default()
    }
}

impl<D: DataType> Registration for ProcessorHandle<D> {
    fn id(&self) -> String {
        self.name()
    }

    fn is_registered(&self) -> bool {
        self.read(|_| ()).is_ok()
    }

    /// Remove the processor; it must be disabled first
    fn unregister(&self) -> Result<()> {
        let removed = self.shared.mutate(|graph, _| {
            let node = graph
                .node(self.key, self.generation)
                .ok_or_else(|| PipelineError::already_unregistered(&self.label))?;
            if node.state.enabled {
                return Err(PipelineError::still_enabled(&node.state.name));
            }
            let slot = graph.remove_processor(self.key);
            Ok((slot.state.name, Change::None))
        })?;
        debug!(pipeline = %self.shared.name, processor = %removed, "Processor unregistered");
        Ok(())
    }
}

/// Insert a tap on any node, sentinels included
pub(crate) fn add_tap<D: DataType>(
    shared: &Arc<Shared<D>>,
    key: usize,
    generation: u64,
    owner: &str,
    id: &str,
    data: D::Data,
) -> Result<TapRegistration<D>> {
    let uid = shared.mutate(|graph, _| {
        let uid = graph.next_id();
        let node = graph
            .node_mut(key, generation)
            .ok_or_else(|| PipelineError::not_registered(owner))?;
        if node.taps.iter().any(|t| t.id == id) {
            return Err(PipelineError::duplicate_id(
                format!("taps of '{}'", node.state.name),
                id,
            ));
        }
        node.taps.push(Tap {
            uid,
            id: id.to_string(),
            data,
        });
        Ok((uid, Change::Cascade(key)))
    })?;

    debug!(pipeline = %shared.name, node = owner, tap = id, "Tap registered");
    Ok(TapRegistration {
        shared: Arc::clone(shared),
        key,
        generation,
        uid,
        id: id.to_string(),
    })
}

/// Registration returned by `peek`
pub struct TapRegistration<D: DataType> {
    shared: Arc<Shared<D>>,
    key: usize,
    generation: u64,
    uid: u64,
    id: String,
}

impl<D: DataType> fmt::Debug for TapRegistration<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapRegistration")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl<D: DataType> Registration for TapRegistration<D> {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn is_registered(&self) -> bool {
        self.shared.read(|graph| {
            graph
                .node(self.key, self.generation)
                .is_some_and(|n| n.taps.iter().any(|t| t.uid == self.uid))
        })
    }

    fn unregister(&self) -> Result<()> {
        self.shared.mutate(|graph, _| {
            let node = graph
                .node_mut(self.key, self.generation)
                .ok_or_else(|| PipelineError::already_unregistered(&self.id))?;
            let before = node.taps.len();
            node.taps.retain(|t| t.uid != self.uid);
            if node.taps.len() == before {
                return Err(PipelineError::already_unregistered(&self.id));
            }
            Ok(((), Change::Cascade(self.key)))
        })?;
        debug!(pipeline = %self.shared.name, tap = %self.id, "Tap unregistered");
        Ok(())
    }
}
