//! Command implementations.

mod info;
mod run;
mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::PipelineBlueprint;
use engine::{BuiltPipeline, PipelineBuilder, StageRegistry};
use stages::{Text, TextSink};

use crate::error::CliError;

pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

/// Load and validate a configuration file
fn load_blueprint(path: &Path) -> Result<PipelineBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Build a text pipeline whose every end point feeds `sink`
fn build_text_pipeline(
    registry: &StageRegistry<Text>,
    blueprint: &PipelineBlueprint,
    sink: TextSink,
) -> Result<BuiltPipeline<Text>> {
    PipelineBuilder::new(registry, Text::new())
        .default_end_point(sink)
        .build(blueprint)
        .with_context(|| format!("Failed to build pipeline '{}'", blueprint.name))
}

/// End point that discards everything
fn discard() -> TextSink {
    Arc::new(|_line: String| {})
}
