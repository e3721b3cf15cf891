//! Diagnostic pass-through tap
//!
//! Counts and traces every value passing its slot without changing it.
//! Installed by the builder when `diagnostics.trace_tap` is set; bypassing
//! it removes the interception layer but keeps the slot.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::data::DataType;
use crate::stage::{Stage, StageContext};

pub use contracts::TRACE_TAP_NAME;

/// Pass-through stage counting invocations
pub struct TraceTap<D> {
    invocations: Arc<AtomicU64>,
    _marker: PhantomData<fn(D)>,
}

impl<D> Clone for TraceTap<D> {
    fn clone(&self) -> Self {
        Self {
            invocations: Arc::clone(&self.invocations),
            _marker: PhantomData,
        }
    }
}

impl<D> Default for TraceTap<D> {
    fn default() -> Self {
        Self {
            invocations: Arc::new(AtomicU64::new(0)),
            _marker: PhantomData,
        }
    }
}

impl<D> std::fmt::Debug for TraceTap<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceTap")
            .field("invocations", &self.invocations())
            .finish()
    }
}

impl<D> TraceTap<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values seen so far (shared by all clones)
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl<D: DataType> Stage<D> for TraceTap<D> {
    fn bind(&self, output: D::Data, ctx: &StageContext<'_, D>) -> D::Data {
        let counter = Arc::clone(&self.invocations);
        let processor = ctx.name().to_string();
        ctx.data_type().intercept(
            output,
            Arc::new(move || {
                let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(processor = %processor, invocation = seen, "Trace tap passed");
            }),
        )
    }
}
