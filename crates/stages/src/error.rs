//! Stage error types

use contracts::PipelineError;
use thiserror::Error;

/// Errors raised by the text stages
///
/// Parameter errors surface at build time; line errors are reported
/// through the pipeline's error support while data flows.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage '{stage}' requires parameter '{param}'")]
    MissingParam { stage: String, param: String },

    #[error("stage '{stage}' parameter '{param}': {message}")]
    InvalidParam {
        stage: String,
        param: String,
        message: String,
    },

    #[error("empty line rejected")]
    EmptyLine,

    #[error("line of {len} chars exceeds the limit of {limit}")]
    TooLong { len: usize, limit: usize },
}

impl StageError {
    pub fn missing_param(stage: impl Into<String>, param: impl Into<String>) -> Self {
        Self::MissingParam {
            stage: stage.into(),
            param: param.into(),
        }
    }

    pub fn invalid_param(
        stage: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            stage: stage.into(),
            param: param.into(),
            message: message.into(),
        }
    }
}

impl From<StageError> for PipelineError {
    fn from(err: StageError) -> Self {
        match &err {
            StageError::MissingParam { stage, param }
            | StageError::InvalidParam { stage, param, .. } => PipelineError::config_validation(
                format!("stages[{stage}].params.{param}"),
                err.to_string(),
            ),
            _ => PipelineError::config_validation("stages", err.to_string()),
        }
    }
}
