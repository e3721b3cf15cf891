//! # Engine
//!
//! Reconfigurable synchronous pipeline.
//!
//! Data enters through entry points, travels Head → active processors (by
//! ascending priority) → Tail, and fans out to every enabled end point, all
//! as one direct call chain on the caller's thread. The chain can be
//! reshaped at any time from any thread; every dispatch observes either
//! the complete old topology or the complete new one.
//!
//! ## Usage
//!
//! ```ignore
//! use engine::{Consumer, Pipeline, stage_fn};
//!
//! let pipeline = Pipeline::new("text", Consumer::<String>::new())?;
//! let upper = pipeline.add_processor("upper", 10, Uppercase)?;
//! upper.enable(true)?;
//!
//! let entry = pipeline.head().add_input("in")?.create_entry_point("main")?;
//! pipeline.tail().add_output("out")?.create_end_point("print", Arc::new(|s: String| println!("{s}")))?;
//!
//! (entry.input())("hello".to_string()); // prints HELLO
//! ```

pub mod builder;
pub mod data;
pub mod diagnostics;
pub mod error_support;
mod graph;
pub mod head;
pub mod node;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod stage;
pub mod stats;
pub mod tail;

pub use builder::{BuiltPipeline, PipelineBuilder};
pub use data::{BiConsumer, Consumer, DataShape, DataType, InvocationHook, TriConsumer};
pub use diagnostics::{TraceTap, TRACE_TAP_NAME};
pub use error_support::{
    Disposition, ErrorReporter, ErrorSupport, PipelineListener, ProcessingErrorHandler,
    RetryHandler,
};
pub use head::{EntryPoint, Head, Input};
pub use node::{ChainSnapshot, NodeInfo, NodeRole, PointGroupInfo};
pub use pipeline::{Forward, Pipeline};
pub use processor::{ProcessorHandle, TapRegistration};
pub use registry::{StageFactory, StageRegistry};
pub use stage::{stage_fn, FnStage, Passthrough, Stage, StageContext};
pub use stats::{PipelineStats, StatsSnapshot};
pub use tail::{EndPoint, Output, Tail};

pub use contracts::{
    ErrorCause, ErrorKind, ErrorPolicy, PipelineError, ProcessingError, Registration, Result,
    Severity,
};
