//! PipelineBlueprint - Config Loader output
//!
//! Describes a complete pipeline: payload type, stages, head inputs, tail
//! outputs, error policy and the optional diagnostic tap.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::ErrorPolicy;

/// Priority reserved for the head sentinel
pub const HEAD_PRIORITY: i64 = i64::MIN;

/// Priority reserved for the tail sentinel
pub const TAIL_PRIORITY: i64 = i64::MAX;

/// Processor name the diagnostic tap is installed under
pub const TRACE_TAP_NAME: &str = "trace-tap";

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Pipeline name (logging/metrics label)
    #[validate(length(min = 1, message = "pipeline name cannot be empty"))]
    pub name: String,

    /// Payload shape name, matched against the data type's shape
    #[serde(default = "default_data_type")]
    pub data_type: String,

    /// Error handling
    #[serde(default)]
    pub errors: ErrorConfig,

    /// Diagnostic tap switches
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Processing stages
    #[serde(default)]
    #[validate(nested)]
    pub stages: Vec<StageConfig>,

    /// Head inputs
    #[serde(default)]
    #[validate(nested)]
    pub inputs: Vec<InputConfig>,

    /// Tail outputs
    #[serde(default)]
    #[validate(nested)]
    pub outputs: Vec<OutputConfig>,
}

fn default_data_type() -> String {
    "string".to_string()
}

/// Error handling configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorConfig {
    /// Policy applied when no handler claims an error
    #[serde(default)]
    pub policy: ErrorPolicy,
}

/// Diagnostic pass-through tap
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Install the tap
    #[serde(default)]
    pub trace_tap: bool,

    /// Install it bypassed
    #[serde(default)]
    pub trace_tap_bypassed: bool,

    /// Slot of the tap in the chain
    #[serde(default)]
    pub trace_tap_priority: i64,
}

/// One processing stage
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StageConfig {
    /// Unique stage name
    #[validate(length(min = 1, message = "stage name cannot be empty"))]
    pub name: String,

    /// Registered factory name
    #[validate(length(min = 1, message = "stage factory cannot be empty"))]
    pub factory: String,

    /// Chain position (lower runs earlier)
    pub priority: i64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub bypassed: bool,

    /// Factory parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Head input with its entry points
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InputConfig {
    #[validate(length(min = 1, message = "input name cannot be empty"))]
    pub name: String,

    #[serde(default)]
    pub entry_points: Vec<String>,
}

/// Tail output with its end points
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OutputConfig {
    #[validate(length(min = 1, message = "output name cannot be empty"))]
    pub name: String,

    #[serde(default)]
    pub end_points: Vec<String>,
}

impl PipelineBlueprint {
    /// Stages sorted the way the chain will run them
    pub fn stages_in_chain_order(&self) -> Vec<&StageConfig> {
        let mut stages: Vec<&StageConfig> = self.stages.iter().collect();
        stages.sort_by_key(|s| s.priority);
        stages
    }

    /// Total number of entry points across all inputs
    pub fn entry_point_count(&self) -> usize {
        self.inputs.iter().map(|i| i.entry_points.len()).sum()
    }

    /// Total number of end points across all outputs
    pub fn end_point_count(&self) -> usize {
        self.outputs.iter().map(|o| o.end_points.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blueprint_defaults_from_json() {
        let bp: PipelineBlueprint = serde_json::from_str(
            r#"{
                "name": "text",
                "stages": [
                    { "name": "lower", "factory": "lowercase", "priority": 20 },
                    { "name": "upper", "factory": "uppercase", "priority": 10, "bypassed": true }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(bp.data_type, "string");
        assert_eq!(bp.errors.policy, ErrorPolicy::Propagate);
        assert!(!bp.diagnostics.trace_tap);
        assert!(bp.stages[0].enabled);
        assert!(bp.stages[1].bypassed);

        let order: Vec<&str> = bp
            .stages_in_chain_order()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(order, ["upper", "lower"]);
    }

    #[test]
    fn test_validate_derive_rejects_empty_names() {
        let bp: PipelineBlueprint = serde_json::from_str(
            r#"{ "name": "", "stages": [{ "name": "", "factory": "x", "priority": 1 }] }"#,
        )
        .unwrap();
        let errors = bp.validate().unwrap_err();
        let rendered = errors.to_string();
        assert!(rendered.contains("name"), "got: {rendered}");
    }
}
