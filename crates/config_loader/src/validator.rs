//! Blueprint validation
//!
//! Rules:
//! - field constraints declared on the blueprint types (non-empty names)
//! - stage names unique, not a sentinel name, not clashing with the tap
//! - stage priorities outside the sentinel slots
//! - input names unique, entry point ids unique per input
//! - output names unique, end point ids unique per output

use std::collections::HashSet;

use contracts::{
    PipelineBlueprint, PipelineError, Result, HEAD_PRIORITY, TAIL_PRIORITY, TRACE_TAP_NAME,
};
use ::validator::Validate;

/// Names the engine keeps for itself
const RESERVED_STAGE_NAMES: [&str; 2] = ["head", "tail"];

/// Returns the first rule violation found
pub fn validate(blueprint: &PipelineBlueprint) -> Result<()> {
    blueprint
        .validate()
        .map_err(|e| PipelineError::config_validation("blueprint", e.to_string()))?;
    validate_stages(blueprint)?;
    validate_inputs(blueprint)?;
    validate_outputs(blueprint)?;
    Ok(())
}

fn validate_stages(blueprint: &PipelineBlueprint) -> Result<()> {
    let mut seen = HashSet::new();
    for stage in &blueprint.stages {
        if RESERVED_STAGE_NAMES.contains(&stage.name.as_str()) {
            return Err(PipelineError::config_validation(
                format!("stages[name={}]", stage.name),
                "stage name is reserved",
            ));
        }
        if blueprint.diagnostics.trace_tap && stage.name == TRACE_TAP_NAME {
            return Err(PipelineError::config_validation(
                format!("stages[name={}]", stage.name),
                "stage name clashes with the diagnostic tap",
            ));
        }
        if !seen.insert(&stage.name) {
            return Err(PipelineError::config_validation(
                format!("stages[name={}]", stage.name),
                "duplicate stage name",
            ));
        }
        check_priority(&format!("stages[{}].priority", stage.name), stage.priority)?;
    }

    if blueprint.diagnostics.trace_tap {
        check_priority(
            "diagnostics.trace_tap_priority",
            blueprint.diagnostics.trace_tap_priority,
        )?;
    }
    Ok(())
}

fn check_priority(field: &str, priority: i64) -> Result<()> {
    if priority == HEAD_PRIORITY || priority == TAIL_PRIORITY {
        return Err(PipelineError::config_validation(
            field,
            format!("priority {priority} is reserved"),
        ));
    }
    Ok(())
}

fn validate_inputs(blueprint: &PipelineBlueprint) -> Result<()> {
    let mut names = HashSet::new();
    for input in &blueprint.inputs {
        if !names.insert(&input.name) {
            return Err(PipelineError::config_validation(
                format!("inputs[name={}]", input.name),
                "duplicate input name",
            ));
        }
        unique_points(
            &format!("inputs[{}].entry_points", input.name),
            &input.entry_points,
        )?;
    }
    Ok(())
}

fn validate_outputs(blueprint: &PipelineBlueprint) -> Result<()> {
    let mut names = HashSet::new();
    for output in &blueprint.outputs {
        if !names.insert(&output.name) {
            return Err(PipelineError::config_validation(
                format!("outputs[name={}]", output.name),
                "duplicate output name",
            ));
        }
        unique_points(
            &format!("outputs[{}].end_points", output.name),
            &output.end_points,
        )?;
    }
    Ok(())
}

fn unique_points(field: &str, ids: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() {
            return Err(PipelineError::config_validation(field, "point id cannot be empty"));
        }
        if !seen.insert(id) {
            return Err(PipelineError::config_validation(
                field,
                format!("duplicate point id '{id}'"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, DiagnosticsConfig, ErrorConfig, InputConfig, OutputConfig, StageConfig,
    };

    fn stage(name: &str, priority: i64) -> StageConfig {
        StageConfig {
            name: name.into(),
            factory: "uppercase".into(),
            priority,
            enabled: true,
            bypassed: false,
            params: Default::default(),
        }
    }

    fn minimal_blueprint() -> PipelineBlueprint {
        PipelineBlueprint {
            version: ConfigVersion::V1,
            name: "text".into(),
            data_type: "string".into(),
            errors: ErrorConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            stages: vec![stage("upper", 10), stage("lower", 20)],
            inputs: vec![InputConfig {
                name: "stdin".into(),
                entry_points: vec!["main".into()],
            }],
            outputs: vec![OutputConfig {
                name: "stdout".into(),
                end_points: vec!["console".into()],
            }],
        }
    }

    fn rejection(bp: &PipelineBlueprint) -> String {
        validate(bp).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_empty_pipeline_name() {
        let mut bp = minimal_blueprint();
        bp.name = String::new();
        let err = rejection(&bp);
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_duplicate_stage_name() {
        let mut bp = minimal_blueprint();
        bp.stages.push(stage("upper", 30));
        let err = rejection(&bp);
        assert!(err.contains("duplicate stage name"), "got: {err}");
    }

    #[test]
    fn test_reserved_stage_name() {
        let mut bp = minimal_blueprint();
        bp.stages.push(stage("tail", 30));
        let err = rejection(&bp);
        assert!(err.contains("reserved"), "got: {err}");
    }

    #[test]
    fn test_trace_tap_name_clash_only_when_enabled() {
        let mut bp = minimal_blueprint();
        bp.stages.push(stage(TRACE_TAP_NAME, 30));
        assert!(validate(&bp).is_ok());

        bp.diagnostics.trace_tap = true;
        let err = rejection(&bp);
        assert!(err.contains("diagnostic tap"), "got: {err}");
    }

    #[test]
    fn test_reserved_priority() {
        let mut bp = minimal_blueprint();
        bp.stages[0].priority = i64::MAX;
        let err = rejection(&bp);
        assert!(err.contains("is reserved"), "got: {err}");

        let mut bp = minimal_blueprint();
        bp.diagnostics.trace_tap = true;
        bp.diagnostics.trace_tap_priority = i64::MIN;
        let err = rejection(&bp);
        assert!(err.contains("trace_tap_priority"), "got: {err}");
    }

    #[test]
    fn test_duplicate_input_and_entry_point() {
        let mut bp = minimal_blueprint();
        bp.inputs[0].entry_points.push("main".into());
        let err = rejection(&bp);
        assert!(err.contains("duplicate point id 'main'"), "got: {err}");

        let mut bp = minimal_blueprint();
        bp.inputs.push(bp.inputs[0].clone());
        let err = rejection(&bp);
        assert!(err.contains("duplicate input name"), "got: {err}");
    }

    #[test]
    fn test_same_point_id_in_different_groups() {
        let mut bp = minimal_blueprint();
        bp.inputs.push(InputConfig {
            name: "replay".into(),
            entry_points: vec!["main".into()],
        });
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_duplicate_output_and_end_point() {
        let mut bp = minimal_blueprint();
        bp.outputs[0].end_points.push("console".into());
        let err = rejection(&bp);
        assert!(err.contains("duplicate point id"), "got: {err}");

        let mut bp = minimal_blueprint();
        bp.outputs.push(bp.outputs[0].clone());
        let err = rejection(&bp);
        assert!(err.contains("duplicate output name"), "got: {err}");
    }
}
