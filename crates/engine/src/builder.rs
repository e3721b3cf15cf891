//! PipelineBuilder - turns a validated blueprint into a live pipeline
//!
//! Stages are resolved through a [`StageRegistry`]; end point consumers
//! cannot be described in a config file, so the caller binds them by id
//! (or supplies a default) before building.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{PipelineBlueprint, PipelineError, Result};
use tracing::{info, instrument};

use crate::data::DataType;
use crate::diagnostics::{TraceTap, TRACE_TAP_NAME};
use crate::error_support::{PipelineListener, ProcessingErrorHandler, RetryHandler};
use crate::head::EntryPoint;
use crate::pipeline::Pipeline;
use crate::processor::ProcessorHandle;
use crate::registry::StageRegistry;
use crate::tail::EndPoint;

/// Builds pipelines from blueprints
pub struct PipelineBuilder<'a, D: DataType> {
    registry: &'a StageRegistry<D>,
    data_type: D,
    end_points: HashMap<String, D::Data>,
    default_end_point: Option<D::Data>,
    handlers: Vec<Arc<dyn ProcessingErrorHandler>>,
    listeners: Vec<Arc<dyn PipelineListener>>,
    retry: Option<Arc<dyn RetryHandler>>,
}

impl<'a, D: DataType> PipelineBuilder<'a, D> {
    pub fn new(registry: &'a StageRegistry<D>, data_type: D) -> Self {
        Self {
            registry,
            data_type,
            end_points: HashMap::new(),
            default_end_point: None,
            handlers: Vec::new(),
            listeners: Vec::new(),
            retry: None,
        }
    }

    /// Consumer for the end point with this id
    pub fn end_point(mut self, id: impl Into<String>, data: D::Data) -> Self {
        self.end_points.insert(id.into(), data);
        self
    }

    /// Consumer for every end point without an explicit binding
    pub fn default_end_point(mut self, data: D::Data) -> Self {
        self.default_end_point = Some(data);
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn ProcessingErrorHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn PipelineListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> Self {
        self.retry = Some(handler);
        self
    }

    /// Create the pipeline, its processors, inputs and outputs
    ///
    /// # Errors
    /// - blueprint payload differs from the registry's
    /// - unknown factory or a factory rejecting its params
    /// - duplicate names / ids, reserved priorities
    /// - an end point with no consumer bound
    #[instrument(
        name = "pipeline_builder_build",
        skip(self, blueprint),
        fields(pipeline = %blueprint.name, stages = blueprint.stages.len())
    )]
    pub fn build(self, blueprint: &PipelineBlueprint) -> Result<BuiltPipeline<D>> {
        if blueprint.data_type != self.registry.payload() {
            return Err(PipelineError::incompatible_data(
                &blueprint.name,
                self.registry.payload(),
                &blueprint.data_type,
            ));
        }

        let pipeline = Pipeline::new(&blueprint.name, self.data_type)?;
        pipeline.set_error_policy(blueprint.errors.policy);
        for handler in self.handlers {
            pipeline.add_error_handler(handler);
        }
        for listener in self.listeners {
            pipeline.add_listener(listener);
        }
        if let Some(retry) = self.retry {
            pipeline.set_retry_handler(retry);
        }

        let mut processors = Vec::with_capacity(blueprint.stages.len());
        for config in &blueprint.stages {
            let stage = self.registry.create(config)?;
            let handle = pipeline.add_shared_processor(&config.name, config.priority, stage)?;
            handle.bypass(config.bypassed)?.enable(config.enabled)?;
            processors.push(handle);
        }

        let trace_tap = if blueprint.diagnostics.trace_tap {
            let tap = TraceTap::new();
            pipeline
                .add_processor(
                    TRACE_TAP_NAME,
                    blueprint.diagnostics.trace_tap_priority,
                    tap.clone(),
                )?
                .bypass(blueprint.diagnostics.trace_tap_bypassed)?
                .enable(true)?;
            Some(tap)
        } else {
            None
        };

        let head = pipeline.head();
        let mut entry_points = Vec::with_capacity(blueprint.entry_point_count());
        for config in &blueprint.inputs {
            let input = head.add_input(&config.name)?;
            for id in &config.entry_points {
                entry_points.push(input.create_entry_point(id)?);
            }
        }

        let tail = pipeline.tail();
        let mut end_points = Vec::with_capacity(blueprint.end_point_count());
        for config in &blueprint.outputs {
            let output = tail.add_output(&config.name)?;
            for id in &config.end_points {
                let data = self
                    .end_points
                    .get(id)
                    .or(self.default_end_point.as_ref())
                    .cloned()
                    .ok_or_else(|| {
                        PipelineError::config_validation(
                            format!("outputs.{}.end_points", config.name),
                            format!("no consumer bound for end point '{id}'"),
                        )
                    })?;
                end_points.push(output.create_end_point(id, data)?);
            }
        }

        info!(
            pipeline = %blueprint.name,
            active = ?pipeline.active_names(),
            entry_points = entry_points.len(),
            end_points = end_points.len(),
            "Pipeline built"
        );

        Ok(BuiltPipeline {
            pipeline,
            processors,
            entry_points,
            end_points,
            trace_tap,
        })
    }
}

/// A pipeline plus the handles created while building it
pub struct BuiltPipeline<D: DataType> {
    pipeline: Pipeline<D>,
    processors: Vec<ProcessorHandle<D>>,
    entry_points: Vec<EntryPoint<D>>,
    end_points: Vec<EndPoint<D>>,
    trace_tap: Option<TraceTap<D>>,
}

impl<D: DataType> BuiltPipeline<D> {
    pub fn pipeline(&self) -> &Pipeline<D> {
        &self.pipeline
    }

    pub fn processors(&self) -> &[ProcessorHandle<D>] {
        &self.processors
    }

    /// Processor by its configured name
    pub fn processor(&self, name: &str) -> Option<&ProcessorHandle<D>> {
        self.processors.iter().find(|p| p.name() == name)
    }

    pub fn entry_points(&self) -> &[EntryPoint<D>] {
        &self.entry_points
    }

    /// First entry point with this id
    pub fn entry_point(&self, id: &str) -> Option<&EntryPoint<D>> {
        self.entry_points.iter().find(|e| e.id() == id)
    }

    pub fn end_points(&self) -> &[EndPoint<D>] {
        &self.end_points
    }

    pub fn trace_tap(&self) -> Option<&TraceTap<D>> {
        self.trace_tap.as_ref()
    }

    pub fn into_pipeline(self) -> Pipeline<D> {
        self.pipeline
    }
}
