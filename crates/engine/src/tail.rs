//! Tail sentinel - fan-out side of a pipeline
//!
//! The tail forwards to the wrap of its taps and of every enabled output;
//! each output binds its stage against the wrap of its enabled end points.

use std::fmt;
use std::sync::Arc;

use contracts::{PipelineError, Registration, Result};
use tracing::debug;

use crate::data::DataType;
use crate::graph::{Change, EndSlot, OutputSlot};
use crate::pipeline::Shared;
use crate::processor::{add_tap, TapRegistration};
use crate::stage::{Passthrough, Stage};

/// Fan-out sentinel of a pipeline
pub struct Tail<D: DataType> {
    shared: Arc<Shared<D>>,
}

impl<D: DataType> Tail<D> {
    pub(crate) fn new(shared: Arc<Shared<D>>) -> Self {
        Self { shared }
    }

    pub fn add_output(&self, name: &str) -> Result<Output<D>> {
        self.add_output_with(name, Passthrough)
    }

    /// Register an output transforming everything before it reaches its
    /// end points
    pub fn add_output_with<S: Stage<D>>(&self, name: &str, stage: S) -> Result<Output<D>> {
        self.add_shared_output(name, Arc::new(stage))
    }

    pub fn add_shared_output(&self, name: &str, stage: Arc<dyn Stage<D>>) -> Result<Output<D>> {
        let uid = self.shared.mutate(|graph, binder| {
            if graph.outputs.iter().any(|o| o.name == name) {
                return Err(PipelineError::duplicate_id("tail outputs", name));
            }
            let uid = graph.next_id();
            graph.outputs.push(OutputSlot {
                uid,
                name: name.to_string(),
                enabled: true,
                stage,
                value: binder.data_type.empty(),
                ends: Vec::new(),
            });
            Ok((uid, Change::Outputs))
        })?;

        debug!(pipeline = %self.shared.name, output = name, "Output registered");
        Ok(Output::new(Arc::clone(&self.shared), uid, name))
    }

    pub fn output(&self, name: &str) -> Option<Output<D>> {
        let uid = self
            .shared
            .read(|graph| graph.outputs.iter().find(|o| o.name == name).map(|o| o.uid))?;
        Some(Output::new(Arc::clone(&self.shared), uid, name))
    }

    pub fn outputs(&self) -> Vec<String> {
        self.shared
            .read(|graph| graph.outputs.iter().map(|o| o.name.clone()).collect())
    }

    /// Observe every value leaving the chain
    pub fn peek(&self, id: &str, data: D::Data) -> Result<TapRegistration<D>> {
        let (key, generation) = self
            .shared
            .read(|graph| (graph.tail, graph.nodes[graph.tail].state.generation));
        add_tap(&self.shared, key, generation, "tail", id, data)
    }

    /// Value the last processor forwards to
    pub fn input_data(&self) -> D::Data {
        self.shared
            .read(|graph| graph.nodes[graph.tail].input_data())
    }
}

/// Named group of end points sharing one stage
pub struct Output<D: DataType> {
    shared: Arc<Shared<D>>,
    uid: u64,
    name: String,
}

impl<D: DataType> Clone for Output<D> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.shared), self.uid, &self.name)
    }
}

impl<D: DataType> fmt::Debug for Output<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl<D: DataType> Output<D> {
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

    /// Attach a consumer; ids are unique within this output
    pub fn create_end_point(&self, id: &str, data: D::Data) -> Result<EndPoint<D>> {
        let uid = self.shared.mutate(|graph, _| {
            let uid = graph.next_id();
            let output = graph
                .output_mut(self.uid)
                .ok_or_else(|| PipelineError::not_registered(&self.name))?;
            if output.ends.iter().any(|e| e.id == id) {
                return Err(PipelineError::duplicate_id(
                    format!("output '{}'", self.name),
                    id,
                ));
            }
            output.ends.push(EndSlot {
                uid,
                id: id.to_string(),
                enabled: true,
                data,
            });
            Ok((uid, Change::Outputs))
        })?;

        debug!(pipeline = %self.shared.name, output = %self.name, end_point = id, "End point created");
        Ok(EndPoint {
            shared: Arc::clone(&self.shared),
            output_uid: self.uid,
            uid,
            id: id.to_string(),
        })
    }

    pub fn end_points(&self) -> Vec<String> {
        self.shared.read(|graph| {
            graph
                .output(self.uid)
                .map(|o| o.ends.iter().map(|e| e.id.clone()).collect())
                .unwrap_or_default()
        })
    }

    pub fn enable(&self, enabled: bool) -> Result<&Self> {
        self.shared.mutate(|graph, _| {
            let output = graph
                .output_mut(self.uid)
                .ok_or_else(|| PipelineError::not_registered(&self.name))?;
            if output.enabled == enabled {
                return Ok(((), Change::None));
            }
            output.enabled = enabled;
            Ok(((), Change::Outputs))
        })?;
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared
            .read(|graph| graph.output(self.uid).is_some_and(|o| o.enabled))
    }
}

impl<D: DataType> Registration for Output<D> {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn is_registered(&self) -> bool {
        self.shared.read(|graph| graph.output(self.uid).is_some())
    }

    fn unregister(&self) -> Result<()> {
        self.shared.mutate(|graph, _| {
            let before = graph.outputs.len();
            graph.outputs.retain(|o| o.uid != self.uid);
            if graph.outputs.len() == before {
                return Err(PipelineError::already_unregistered(&self.name));
            }
            Ok(((), Change::Outputs))
        })?;
        debug!(pipeline = %self.shared.name, output = %self.name, "Output unregistered");
        Ok(())
    }
}

/// Consumer attached to an output
pub struct EndPoint<D: DataType> {
    shared: Arc<Shared<D>>,
    output_uid: u64,
    uid: u64,
    id: String,
}

impl<D: DataType> fmt::Debug for EndPoint<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndPoint")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl<D: DataType> EndPoint<D> {
    fn with_slot<R>(&self, f: impl FnOnce(&EndSlot<D>) -> R) -> Option<R> {
        self.shared.read(|graph| {
            graph
                .output(self.output_uid)
                .and_then(|o| o.ends.iter().find(|e| e.uid == self.uid))
                .map(f)
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The consumer this end point was created with
    pub fn data(&self) -> Result<D::Data> {
        self.with_slot(|e| e.data.clone())
            .ok_or_else(|| PipelineError::not_registered(&self.id))
    }

    pub fn enable(&self, enabled: bool) -> Result<&Self> {
        self.shared.mutate(|graph, _| {
            let end = graph
                .output_mut(self.output_uid)
                .and_then(|o| o.ends.iter_mut().find(|e| e.uid == self.uid))
                .ok_or_else(|| PipelineError::not_registered(&self.id))?;
            if end.enabled == enabled {
                return Ok(((), Change::None));
            }
            end.enabled = enabled;
            Ok(((), Change::Outputs))
        })?;
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.with_slot(|e| e.enabled).unwrap_or(false)
    }
}

impl<D: DataType> Registration for EndPoint<D> {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn is_registered(&self) -> bool {
        self.with_slot(|_| ()).is_some()
    }

    fn unregister(&self) -> Result<()> {
        self.shared.mutate(|graph, _| {
            let output = graph
                .output_mut(self.output_uid)
                .ok_or_else(|| PipelineError::already_unregistered(&self.id))?;
            let before = output.ends.len();
            output.ends.retain(|e| e.uid != self.uid);
            if output.ends.len() == before {
                return Err(PipelineError::already_unregistered(&self.id));
            }
            Ok(((), Change::Outputs))
        })?;
        debug!(pipeline = %self.shared.name, end_point = %self.id, "End point unregistered");
        Ok(())
    }
}
