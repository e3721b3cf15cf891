//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! error taxonomy, processing-error values and policy, the registration
//! handle trait and the pipeline blueprint produced by the config loader.
//! All business crates can only depend on this crate, reverse dependencies
//! are prohibited.
//!
//! ## Priority Model
//! - Lower priority runs earlier in the chain
//! - `i64::MIN` / `i64::MAX` are reserved for the head/tail sentinels

mod blueprint;
mod error;
mod processing;
mod registration;

pub use blueprint::*;
pub use error::{ErrorKind, PipelineError, Result};
pub use processing::*;
pub use registration::Registration;
