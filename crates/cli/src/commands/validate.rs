//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::PipelineBlueprint;

use super::{build_text_pipeline, discard};
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    name: String,
    data_type: String,
    stage_count: usize,
    active_stages: Vec<String>,
    entry_point_count: usize,
    end_point_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();
    let invalid = |error: String| ValidationResult {
        valid: false,
        config_path: config_path.clone(),
        error: Some(error),
        warnings: None,
        summary: None,
    };

    if !args.config.exists() {
        return invalid(format!("File not found: {}", args.config.display()));
    }

    let blueprint = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => blueprint,
        Err(e) => return invalid(e.to_string()),
    };

    // Building catches unknown factories and bad stage params
    let registry = match stages::text_registry() {
        Ok(registry) => registry,
        Err(e) => return invalid(e.to_string()),
    };
    let built = match build_text_pipeline(&registry, &blueprint, discard()) {
        Ok(built) => built,
        Err(e) => return invalid(format!("{e:#}")),
    };

    let warnings = collect_warnings(&blueprint);
    ValidationResult {
        valid: true,
        config_path: config_path.clone(),
        error: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(ConfigSummary {
            name: blueprint.name.clone(),
            data_type: blueprint.data_type.clone(),
            stage_count: blueprint.stages.len(),
            active_stages: built.pipeline().active_names(),
            entry_point_count: blueprint.entry_point_count(),
            end_point_count: blueprint.end_point_count(),
        }),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.entry_point_count() == 0 {
        warnings.push("No entry points configured - nothing can feed the pipeline".to_string());
    }
    if blueprint.end_point_count() == 0 {
        warnings.push("No end points configured - processed data will be dropped".to_string());
    }

    for stage in &blueprint.stages {
        if !stage.enabled {
            warnings.push(format!("Stage '{}' is disabled", stage.name));
        } else if stage.bypassed {
            warnings.push(format!("Stage '{}' is bypassed", stage.name));
        }
    }

    if blueprint.diagnostics.trace_tap_bypassed && !blueprint.diagnostics.trace_tap {
        warnings.push("diagnostics.trace_tap_bypassed has no effect without trace_tap".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Pipeline: {}", summary.name);
            println!("  Data type: {}", summary.data_type);
            println!("  Stages: {}", summary.stage_count);
            println!("  Active chain: {:?}", summary.active_stages);
            println!("  Entry points: {}", summary.entry_point_count);
            println!("  End points: {}", summary.end_point_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEXT_TOML: &str = r#"
name = "text"

[[stages]]
name = "upper"
factory = "uppercase"
priority = 10
enabled = false

[[inputs]]
name = "stdin"
entry_points = ["main"]
"#;

    fn validate_str(content: &str) -> ValidationResult {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        })
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let result = validate_str(TEXT_TOML);
        assert!(result.valid, "error: {:?}", result.error);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No end points")));
        assert!(warnings.iter().any(|w| w.contains("'upper' is disabled")));
        let summary = result.summary.unwrap();
        assert!(summary.active_stages.is_empty());
    }

    #[test]
    fn test_unknown_factory_is_invalid() {
        let result = validate_str(&TEXT_TOML.replace("\"uppercase\"", "\"shout\""));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("unknown stage factory 'shout'"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_config(&ValidateArgs {
            config: dir.path().join("absent.toml"),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().starts_with("File not found"));
    }
}
