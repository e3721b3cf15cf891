//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON pipeline configuration files
//! - Apply environment overrides for the diagnostic tap
//! - Validate configuration legality
//! - Generate `PipelineBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("pipeline.toml")).unwrap();
//! println!("Pipeline: {}", blueprint.name);
//! ```

mod parser;
mod validator;

pub use contracts::PipelineBlueprint;
pub use parser::ConfigFormat;

use contracts::{PipelineError, Result};
use std::path::Path;
use tracing::debug;

/// Enables or disables the diagnostic tap
pub const ENV_TRACE_TAP: &str = "PIPELINE_TRACE_TAP";

/// Installs the diagnostic tap bypassed
pub const ENV_TRACE_TAP_BYPASSED: &str = "PIPELINE_TRACE_TAP_BYPASSED";

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json) and
    /// applies the process environment overrides before validating.
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Malformed override value
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<PipelineBlueprint> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        let mut blueprint = parser::parse(&content, format)?;
        Self::apply_overrides(&mut blueprint, |key| std::env::var(key).ok())?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Load configuration from string (no environment overrides)
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<PipelineBlueprint> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Apply diagnostic tap overrides read through `lookup`
    ///
    /// # Errors
    /// Returns a validation error for values that are not booleans.
    pub fn apply_overrides<F>(blueprint: &mut PipelineBlueprint, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TRACE_TAP) {
            blueprint.diagnostics.trace_tap = parse_flag(ENV_TRACE_TAP, &raw)?;
            debug!(trace_tap = blueprint.diagnostics.trace_tap, "Override applied");
        }
        if let Some(raw) = lookup(ENV_TRACE_TAP_BYPASSED) {
            blueprint.diagnostics.trace_tap_bypassed = parse_flag(ENV_TRACE_TAP_BYPASSED, &raw)?;
            debug!(
                trace_tap_bypassed = blueprint.diagnostics.trace_tap_bypassed,
                "Override applied"
            );
        }
        Ok(())
    }

    /// Serialize PipelineBlueprint to TOML string
    pub fn to_toml(blueprint: &PipelineBlueprint) -> Result<String> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| PipelineError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize PipelineBlueprint to JSON string
    pub fn to_json(blueprint: &PipelineBlueprint) -> Result<String> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| PipelineError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            PipelineError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            PipelineError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(PipelineError::config_validation(
            key,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}
