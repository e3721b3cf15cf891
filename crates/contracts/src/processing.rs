//! ProcessingError - failures raised while data flows through a stage
//!
//! Immutable values created at the failure site and consumed by error support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared, thread-safe cause of a processing failure
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync>;

/// Severity attached to a processing error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recoverable problem, reported for visibility
    Warning,
    /// Regular processing failure
    #[default]
    Error,
    /// Escalated failure, the pipeline stops accepting data
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// Default strategy applied to an unhandled processing error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Re-raise to pipeline-level listeners
    #[default]
    Propagate,
    /// Log only
    Suppress,
    /// Delegate to the pipeline's retry hook
    Retry,
    /// Escalate as fatal
    Terminate,
}

impl ErrorPolicy {
    /// Stable lowercase name (used for metrics labels)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propagate => "propagate",
            Self::Suppress => "suppress",
            Self::Retry => "retry",
            Self::Terminate => "terminate",
        }
    }
}

/// Failure raised by a stage's own transformation
#[derive(Clone, Error)]
#[error("{severity} in processor '{source_processor}': {cause}")]
pub struct ProcessingError {
    #[source]
    cause: ErrorCause,
    source_processor: String,
    failed_data: Option<String>,
    severity: Severity,
    invocation_args: Vec<String>,
}

impl ProcessingError {
    /// Create an error with `Error` severity
    pub fn new(source_processor: impl Into<String>, cause: ErrorCause) -> Self {
        Self {
            cause,
            source_processor: source_processor.into(),
            failed_data: None,
            severity: Severity::Error,
            invocation_args: Vec::new(),
        }
    }

    /// Attach a rendering of the value that failed
    pub fn with_failed_data(mut self, data: impl Into<String>) -> Self {
        self.failed_data = Some(data.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach renderings of the arguments the stage was invoked with
    pub fn with_invocation_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    pub fn source_processor(&self) -> &str {
        &self.source_processor
    }

    pub fn failed_data(&self) -> Option<&str> {
        self.failed_data.as_deref()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn invocation_args(&self) -> &[String] {
        &self.invocation_args
    }
}

impl fmt::Debug for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingError")
            .field("source_processor", &self.source_processor)
            .field("severity", &self.severity)
            .field("cause", &self.cause.to_string())
            .field("failed_data", &self.failed_data)
            .field("invocation_args", &self.invocation_args)
            .finish()
    }
}

/// Plain message cause, for stages that fail without a typed error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MessageCause(pub String);

impl MessageCause {
    pub fn shared(message: impl Into<String>) -> ErrorCause {
        Arc::new(Self(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_builder() {
        let err = ProcessingError::new("parse", MessageCause::shared("bad digit"))
            .with_failed_data("12x")
            .with_invocation_args(["12x"])
            .with_severity(Severity::Warning);

        assert_eq!(err.source_processor(), "parse");
        assert_eq!(err.failed_data(), Some("12x"));
        assert_eq!(err.invocation_args(), ["12x".to_string()]);
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.to_string(), "warning in processor 'parse': bad digit");
        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("bad digit"));
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: ErrorPolicy = serde_json::from_str("\"suppress\"").unwrap();
        assert_eq!(policy, ErrorPolicy::Suppress);
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Propagate);
        assert_eq!(ErrorPolicy::Terminate.as_str(), "terminate");
    }
}
