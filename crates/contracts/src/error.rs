//! Layered error definitions
//!
//! Categorized by kind: configuration (setup time, fatal) / state (programmer error)

use thiserror::Error;

/// Broad category of a [`PipelineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while building or wiring a pipeline, never retried
    Configuration,
    /// Structural operation issued against a node in the wrong state
    State,
    /// Underlying IO failure (config files)
    Io,
}

/// Unified error type
#[derive(Debug, Error)]
pub enum PipelineError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// A node declared a payload shape the pipeline's data type cannot accept
    #[error("node '{node}' expects data '{found}', pipeline carries '{expected}'")]
    IncompatibleData {
        node: String,
        expected: String,
        found: String,
    },

    /// Id already taken within its owner
    #[error("duplicate id '{id}' in {owner}")]
    DuplicateId { owner: String, id: String },

    /// Data type failed its own self check
    #[error("malformed data type '{data_type}': {message}")]
    MalformedDataType { data_type: String, message: String },

    /// No factory registered under this name
    #[error("unknown stage factory '{factory}'")]
    UnknownFactory { factory: String },

    /// Priority collides with a sentinel slot
    #[error("priority {priority} is reserved for the head/tail sentinels")]
    ReservedPriority { priority: i64 },

    // ===== State Errors =====
    /// Node no longer (or never) belongs to a pipeline
    #[error("node '{node}' is not registered")]
    NotRegistered { node: String },

    /// Unregister attempted on an enabled node
    #[error("node '{node}' must be disabled before it is unregistered")]
    StillEnabled { node: String },

    /// Registration handle used twice
    #[error("'{id}' was already unregistered")]
    AlreadyUnregistered { id: String },

    /// Structural operation on head or tail
    #[error("operation '{operation}' is not allowed on sentinel '{node}'")]
    Sentinel { node: String, operation: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigParse { .. }
            | Self::ConfigValidation { .. }
            | Self::IncompatibleData { .. }
            | Self::DuplicateId { .. }
            | Self::MalformedDataType { .. }
            | Self::UnknownFactory { .. }
            | Self::ReservedPriority { .. } => ErrorKind::Configuration,
            Self::NotRegistered { .. }
            | Self::StillEnabled { .. }
            | Self::AlreadyUnregistered { .. }
            | Self::Sentinel { .. } => ErrorKind::State,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn incompatible_data(
        node: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::IncompatibleData {
            node: node.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn duplicate_id(owner: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            owner: owner.into(),
            id: id.into(),
        }
    }

    pub fn malformed_data_type(data_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDataType {
            data_type: data_type.into(),
            message: message.into(),
        }
    }

    pub fn unknown_factory(factory: impl Into<String>) -> Self {
        Self::UnknownFactory {
            factory: factory.into(),
        }
    }

    pub fn not_registered(node: impl Into<String>) -> Self {
        Self::NotRegistered { node: node.into() }
    }

    pub fn still_enabled(node: impl Into<String>) -> Self {
        Self::StillEnabled { node: node.into() }
    }

    pub fn already_unregistered(id: impl Into<String>) -> Self {
        Self::AlreadyUnregistered { id: id.into() }
    }

    pub fn sentinel(node: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Sentinel {
            node: node.into(),
            operation: operation.into(),
        }
    }
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PipelineError::duplicate_id("input 'a'", "x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PipelineError::still_enabled("upper").kind(),
            ErrorKind::State
        );
        assert_eq!(
            PipelineError::ReservedPriority { priority: i64::MIN }.kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::still_enabled("upper");
        assert_eq!(
            err.to_string(),
            "node 'upper' must be disabled before it is unregistered"
        );

        let err = PipelineError::incompatible_data("p", "Consumer<String>", "Consumer<i32>");
        assert!(err.to_string().contains("Consumer<i32>"));
    }
}
