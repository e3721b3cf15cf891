//! Config Pipeline Example
//!
//! Loads a pipeline blueprint (defaults to `demos/text.toml`), builds it
//! from the text stage registry and feeds a few sample lines, printing the
//! chain snapshot and counters afterwards.
//!
//! Run with: cargo run -p demos --bin config_pipeline [-- path/to/pipeline.toml]

use std::path::PathBuf;
use std::sync::Arc;

use config_loader::ConfigLoader;
use engine::PipelineBuilder;
use observability::{LatencyStats, LogFormat, ObservabilityConfig};
use stages::{text_registry, Text, TextSink};

const SAMPLE_LINES: [&str; 4] = ["  hello pipeline  ", "", "Second Line", "ok"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_with_config(ObservabilityConfig {
        log_format: LogFormat::Compact,
        ..Default::default()
    })?;

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/text.toml")));
    tracing::info!(path = %path.display(), "Loading blueprint config");
    let blueprint = ConfigLoader::load_from_path(&path)?;

    let registry = text_registry()?;
    let print: TextSink = Arc::new(|line: String| println!("{line}"));
    let built = PipelineBuilder::new(&registry, Text::new())
        .default_end_point(print)
        .build(&blueprint)?;
    let pipeline = built.pipeline();

    let Some(entry) = built.entry_points().first() else {
        tracing::warn!(pipeline = pipeline.name(), "No entry points configured");
        return Ok(());
    };
    let feed = entry.input();

    let mut latency = LatencyStats::new();
    for line in SAMPLE_LINES {
        let started = std::time::Instant::now();
        feed(line.to_string());
        latency.record(started.elapsed());
    }

    let chain = pipeline.describe();
    tracing::info!(active = ?chain.active_names(), "Chain");
    let stats = pipeline.stats();
    tracing::info!(
        dispatches = stats.dispatches,
        processing_errors = stats.processing_errors,
        latency = %latency.summary(),
        "Done"
    );
    Ok(())
}
