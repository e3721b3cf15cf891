//! Pipeline - the coordinator owning the chain, the lock and relinking
//!
//! One `parking_lot::RwLock` guards the whole graph. Dispatch through an
//! entry point holds the read lock for the entire call chain; structural
//! changes take the write lock for the mutation plus the full relink, so a
//! dispatch observes either the old topology or the new one, never a mix.
//!
//! Stages, taps and end points run inside the read scope. They may
//! dispatch into other entry points of the same pipeline (the read lock is
//! taken recursively) but must not perform structural changes on it.
//! Error listeners run after the read scope ends and may reconfigure it.

use std::fmt;
use std::sync::{Arc, Weak};

use contracts::{ErrorPolicy, PipelineError, Result};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, trace, warn};

use crate::data::DataType;
use crate::error_support::{
    DispatchScope, ErrorSupport, PipelineListener, ProcessingErrorHandler, RetryHandler,
};
use crate::graph::{Binder, Change, Graph};
use crate::head::Head;
use crate::node::{ChainSnapshot, NodeRole};
use crate::processor::ProcessorHandle;
use crate::stage::Stage;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::tail::Tail;

/// State shared by the pipeline and every handle into it
pub(crate) struct Shared<D: DataType> {
    pub name: String,
    pub data_type: D,
    pub graph: RwLock<Graph<D>>,
    pub errors: Arc<ErrorSupport>,
    pub stats: Arc<PipelineStats>,
}

impl<D: DataType> Shared<D> {
    pub fn binder(&self) -> Binder<'_, D> {
        Binder {
            data_type: &self.data_type,
            errors: &self.errors,
        }
    }

    /// Run `f` under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&Graph<D>) -> R) -> R {
        let graph = self.graph.read_recursive();
        f(&graph)
    }

    /// Run a structural mutation and its follow-up under the write lock
    ///
    /// Relink listeners are notified after the lock is released.
    pub fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Graph<D>, &Binder<'_, D>) -> Result<(R, Change)>,
    ) -> Result<R> {
        let binder = self.binder();
        let (result, relinked) = {
            let mut graph = self.graph.write();
            let (result, change) = f(&mut graph, &binder)?;
            graph.apply(change, &binder);
            match change {
                Change::None => {}
                Change::Relink => self.stats.inc_relinks(),
                _ => self.stats.inc_cascades(),
            }
            let relinked = (change == Change::Relink).then(|| graph.active_names());
            (result, relinked)
        };

        if let Some(active) = relinked {
            debug!(pipeline = %self.name, active = ?active, "Pipeline relinked");
            self.errors.notify_relink(&active);
        }
        Ok(result)
    }
}

/// Lock-guarded forwarder behind every entry point value
///
/// Each invocation takes the pipeline read lock, resolves the entry point's
/// current target and calls it before releasing the lock. Holds the
/// pipeline weakly: once the pipeline is dropped invocations are no-ops.
pub struct Forward<D: DataType> {
    shared: Weak<Shared<D>>,
    input: u64,
    entry: u64,
    label: Arc<str>,
}

impl<D: DataType> Clone for Forward<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
            input: self.input,
            entry: self.entry,
            label: Arc::clone(&self.label),
        }
    }
}

impl<D: DataType> fmt::Debug for Forward<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forward")
            .field("entry_point", &self.label)
            .finish()
    }
}

impl<D: DataType> Forward<D> {
    pub(crate) fn new(shared: &Arc<Shared<D>>, input: u64, entry: u64, label: &str) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            input,
            entry,
            label: Arc::from(label),
        }
    }

    /// Call `f` with the current target while holding the read lock
    ///
    /// Returns `None` when the value was not delivered: pipeline dropped,
    /// pipeline terminated, or entry point unregistered.
    pub fn with<R>(&self, f: impl FnOnce(&D::Data) -> R) -> Option<R> {
        let shared = self.shared.upgrade()?;

        if shared.errors.is_terminated() {
            shared.stats.inc_dropped();
            warn!(
                pipeline = %shared.name,
                entry_point = %self.label,
                "Pipeline terminated, value dropped"
            );
            return None;
        }

        // dropped after the guard: queued error notifications run unlocked
        let _scope = DispatchScope::enter();
        let graph = shared.graph.read_recursive();
        let Some(entry) = graph.entry(self.input, self.entry) else {
            trace!(entry_point = %self.label, "Entry point unregistered, value dropped");
            return None;
        };

        shared.stats.inc_dispatches();
        observability::record_dispatch(&shared.name, &self.label);
        Some(f(&entry.value))
    }
}

/// Reconfigurable synchronous pipeline
///
/// Cheap to clone; clones share the same chain.
pub struct Pipeline<D: DataType> {
    shared: Arc<Shared<D>>,
}

impl<D: DataType> Clone for Pipeline<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: DataType> fmt::Debug for Pipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.shared.name)
            .field("data_type", &self.shared.data_type.shape())
            .field("active", &self.active_names())
            .finish()
    }
}

impl<D: DataType> Pipeline<D> {
    /// Create an empty pipeline (head forwarding straight to tail)
    ///
    /// # Errors
    /// Returns a configuration error when the data type fails its self check.
    pub fn new(name: impl Into<String>, data_type: D) -> Result<Self> {
        let name = name.into();
        data_type.validate()?;

        let stats = Arc::new(PipelineStats::new());
        let errors = Arc::new(ErrorSupport::new(name.clone(), Arc::clone(&stats)));
        let graph = Graph::new(&Binder {
            data_type: &data_type,
            errors: &errors,
        });

        info!(
            pipeline = %name,
            data_type = %data_type.shape(),
            "Pipeline created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                data_type,
                graph: RwLock::new(graph),
                errors,
                stats,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn data_type(&self) -> &D {
        &self.shared.data_type
    }

    /// Fan-in sentinel
    pub fn head(&self) -> Head<D> {
        Head::new(Arc::clone(&self.shared))
    }

    /// Fan-out sentinel
    pub fn tail(&self) -> Tail<D> {
        Tail::new(Arc::clone(&self.shared))
    }

    /// Register a processor; it starts disabled
    ///
    /// # Errors
    /// - duplicate name or reserved priority
    /// - the stage declares a payload shape this pipeline does not carry
    pub fn add_processor<S: Stage<D>>(
        &self,
        name: &str,
        priority: i64,
        stage: S,
    ) -> Result<ProcessorHandle<D>> {
        self.add_shared_processor(name, priority, Arc::new(stage))
    }

    /// Register a processor from an already shared stage (factory output)
    #[instrument(
        name = "pipeline_add_processor",
        skip(self, stage),
        fields(pipeline = %self.shared.name)
    )]
    pub fn add_shared_processor(
        &self,
        name: &str,
        priority: i64,
        stage: Arc<dyn Stage<D>>,
    ) -> Result<ProcessorHandle<D>> {
        if let Some(shape) = stage.accepts() {
            if !self.shared.data_type.is_compatible_with(&shape) {
                return Err(PipelineError::incompatible_data(
                    name,
                    self.shared.data_type.shape().to_string(),
                    shape.to_string(),
                ));
            }
        }

        let (key, generation) = self.shared.mutate(|graph, binder| {
            let handle = graph.insert_processor(name, priority, stage, binder)?;
            Ok((handle, Change::None))
        })?;

        debug!(pipeline = %self.shared.name, processor = name, priority, "Processor registered");
        Ok(ProcessorHandle::new(
            Arc::clone(&self.shared),
            key,
            generation,
            name,
        ))
    }

    /// Handle to a registered processor by name
    pub fn processor(&self, name: &str) -> Option<ProcessorHandle<D>> {
        let (key, generation) = self.shared.read(|graph| {
            graph
                .find_processor(name)
                .map(|key| (key, graph.nodes[key].state.generation))
        })?;
        Some(ProcessorHandle::new(
            Arc::clone(&self.shared),
            key,
            generation,
            name,
        ))
    }

    /// Force a full relink
    pub fn relink(&self) {
        // infallible closure
        let _ = self.shared.mutate(|_, _| Ok(((), Change::Relink)));
    }

    /// Consistent topology snapshot
    pub fn describe(&self) -> ChainSnapshot {
        self.shared.read(|graph| graph.snapshot(&self.shared.name))
    }

    /// Names of active processors in dispatch order
    pub fn active_names(&self) -> Vec<String> {
        self.shared.read(|graph| graph.active_names())
    }

    /// Names of every registered processor
    pub fn processor_names(&self) -> Vec<String> {
        self.describe()
            .registered
            .into_iter()
            .filter(|n| n.role == NodeRole::Processor)
            .map(|n| n.name)
            .collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.shared.errors.policy()
    }

    pub fn set_error_policy(&self, policy: ErrorPolicy) {
        info!(pipeline = %self.shared.name, policy = ?policy, "Error policy set");
        self.shared.errors.set_policy(policy);
    }

    /// Handlers are tried in registration order
    pub fn add_error_handler(&self, handler: Arc<dyn ProcessingErrorHandler>) {
        self.shared.errors.add_handler(handler);
    }

    pub fn add_listener(&self, listener: Arc<dyn PipelineListener>) {
        self.shared.errors.add_listener(listener);
    }

    pub fn set_retry_handler(&self, handler: Arc<dyn RetryHandler>) {
        self.shared.errors.set_retry_handler(handler);
    }

    /// Whether a fatal error stopped the pipeline
    pub fn is_terminated(&self) -> bool {
        self.shared.errors.is_terminated()
    }

    pub fn error_support(&self) -> &ErrorSupport {
        &self.shared.errors
    }
}
