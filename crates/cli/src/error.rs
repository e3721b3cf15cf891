//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// `--disable`/`--bypass` named a stage the pipeline does not have
    #[error("Pipeline '{pipeline}' has no stage named '{stage}'")]
    UnknownStage { pipeline: String, stage: String },

    /// The configuration declares no entry point to feed
    #[error("Pipeline '{pipeline}' has no entry points")]
    NoEntryPoint { pipeline: String },

    /// `--entry-point` named an id that was not configured
    #[error("Entry point not found: {id}")]
    EntryPointNotFound { id: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn unknown_stage(pipeline: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::UnknownStage {
            pipeline: pipeline.into(),
            stage: stage.into(),
        }
    }

    pub fn no_entry_point(pipeline: impl Into<String>) -> Self {
        Self::NoEntryPoint {
            pipeline: pipeline.into(),
        }
    }

    pub fn entry_point_not_found(id: impl Into<String>) -> Self {
        Self::EntryPointNotFound { id: id.into() }
    }
}
