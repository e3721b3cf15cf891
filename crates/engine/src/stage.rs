//! Stage trait - the transformation owned by a processor
//!
//! A stage never sees data directly. During relink it receives the value
//! its processor forwards to (the processor's output) and returns the value
//! callers of the processor invoke (the processor's input). Composition
//! therefore happens once per relink, not once per dispatch.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::data::{DataShape, DataType};
use crate::error_support::ErrorReporter;

/// Context handed to [`Stage::bind`]
pub struct StageContext<'a, D: DataType> {
    name: &'a str,
    data_type: &'a D,
    reporter: ErrorReporter,
}

impl<'a, D: DataType> StageContext<'a, D> {
    pub(crate) fn new(name: &'a str, data_type: &'a D, reporter: ErrorReporter) -> Self {
        Self {
            name,
            data_type,
            reporter,
        }
    }

    /// Name of the processor being bound
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn data_type(&self) -> &D {
        self.data_type
    }

    /// Reporter for failures raised while data flows through the stage;
    /// clone it into the returned value
    pub fn reporter(&self) -> ErrorReporter {
        self.reporter.clone()
    }
}

/// Transformation applied by a processor
pub trait Stage<D: DataType>: Send + Sync + 'static {
    /// Build this stage's input value from its downstream output value
    fn bind(&self, output: D::Data, ctx: &StageContext<'_, D>) -> D::Data;

    /// Payload shape this stage was written for, if it declares one
    fn accepts(&self) -> Option<DataShape> {
        None
    }
}

impl<D: DataType, S: Stage<D> + ?Sized> Stage<D> for Arc<S> {
    fn bind(&self, output: D::Data, ctx: &StageContext<'_, D>) -> D::Data {
        (**self).bind(output, ctx)
    }

    fn accepts(&self) -> Option<DataShape> {
        (**self).accepts()
    }
}

/// Identity stage: input is the output
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl<D: DataType> Stage<D> for Passthrough {
    fn bind(&self, output: D::Data, _ctx: &StageContext<'_, D>) -> D::Data {
        output
    }
}

/// Stage backed by a closure
pub struct FnStage<D, F> {
    f: F,
    _marker: PhantomData<fn(D)>,
}

impl<D, F> Stage<D> for FnStage<D, F>
where
    D: DataType,
    F: Fn(D::Data, &StageContext<'_, D>) -> D::Data + Send + Sync + 'static,
{
    fn bind(&self, output: D::Data, ctx: &StageContext<'_, D>) -> D::Data {
        (self.f)(output, ctx)
    }
}

/// Build a stage from a closure
///
/// ```ignore
/// let upper = stage_fn(|out: Arc<dyn Fn(String) + Send + Sync>, _ctx: &StageContext<'_, Consumer<String>>| {
///     Arc::new(move |s: String| out(s.to_uppercase())) as Arc<dyn Fn(String) + Send + Sync>
/// });
/// ```
pub fn stage_fn<D, F>(f: F) -> FnStage<D, F>
where
    D: DataType,
    F: Fn(D::Data, &StageContext<'_, D>) -> D::Data + Send + Sync + 'static,
{
    FnStage {
        f,
        _marker: PhantomData,
    }
}
