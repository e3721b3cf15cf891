//! `run` command implementation.

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use contracts::ProcessingError;
use engine::{PipelineListener, StatsSnapshot};
use observability::{LatencyStats, LatencySummary};
use stages::TextSink;

use super::{info::print_chain, load_blueprint};
use crate::cli::RunArgs;
use crate::error::CliError;

/// Logs processing errors and relinks of the running pipeline
struct LogListener;

impl PipelineListener for LogListener {
    fn on_error(&self, pipeline: &str, error: &ProcessingError) {
        warn!(
            pipeline,
            processor = error.source_processor(),
            severity = %error.severity(),
            failed_data = ?error.failed_data(),
            cause = %error.cause(),
            "Processing error"
        );
    }

    fn on_relink(&self, pipeline: &str, active: &[String]) {
        debug!(pipeline, ?active, "Chain relinked");
    }
}

/// Outcome of feeding one input stream
struct RunSummary {
    pipeline: String,
    lines: u64,
    interrupted: bool,
    stats: StatsSnapshot,
    latency: LatencySummary,
    tap_invocations: Option<u64>,
}

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;
    if args.trace_tap {
        config_loader::ConfigLoader::apply_overrides(&mut blueprint, |key| {
            (key == config_loader::ENV_TRACE_TAP).then(|| "1".to_string())
        })?;
    }

    info!(
        pipeline = %blueprint.name,
        stages = blueprint.stages.len(),
        inputs = blueprint.inputs.len(),
        outputs = blueprint.outputs.len(),
        trace_tap = blueprint.diagnostics.trace_tap,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let registry = stages::text_registry()?;
    let built = engine::PipelineBuilder::new(&registry, stages::Text::new())
        .default_end_point(stdout_sink())
        .listener(Arc::new(LogListener))
        .build(&blueprint)
        .with_context(|| format!("Failed to build pipeline '{}'", blueprint.name))?;
    let pipeline = built.pipeline();

    for name in &args.disable {
        pipeline
            .processor(name)
            .ok_or_else(|| CliError::unknown_stage(pipeline.name(), name))?
            .enable(false)?;
    }
    for name in &args.bypass {
        pipeline
            .processor(name)
            .ok_or_else(|| CliError::unknown_stage(pipeline.name(), name))?
            .bypass(true)?;
    }

    if args.dry_run {
        info!("Dry run mode - pipeline built, exiting");
        print_chain(&pipeline.describe());
        return Ok(());
    }

    let entry = match &args.entry_point {
        Some(id) => built
            .entry_point(id)
            .ok_or_else(|| CliError::entry_point_not_found(id))?,
        None => built
            .entry_points()
            .first()
            .ok_or_else(|| CliError::no_entry_point(pipeline.name()))?,
    };
    let feed = entry.input();

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = reader.lines();

    info!(
        entry_point = entry.id(),
        active = ?pipeline.active_names(),
        "Feeding pipeline"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut latency = LatencyStats::new();
    let mut fed = 0u64;
    let mut interrupted = false;
    loop {
        let next = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input line")?,
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping feed");
                interrupted = true;
                break;
            }
        };
        let Some(line) = next else { break };

        let started = Instant::now();
        feed(line);
        let elapsed = started.elapsed();
        latency.record(elapsed);
        observability::record_dispatch_latency(pipeline.name(), elapsed);
        fed += 1;

        if pipeline.is_terminated() {
            warn!(lines = fed, "Pipeline terminated by a fatal processing error");
            break;
        }
    }

    let summary = RunSummary {
        pipeline: pipeline.name().to_string(),
        lines: fed,
        interrupted,
        stats: pipeline.stats(),
        latency: latency.summary(),
        tap_invocations: built.trace_tap().map(|tap| tap.invocations()),
    };
    print_summary(&summary);

    info!(
        lines = summary.lines,
        processing_errors = summary.stats.processing_errors,
        "Pipeline finished"
    );
    Ok(())
}

/// End point writing each line to stdout
fn stdout_sink() -> TextSink {
    Arc::new(|line: String| {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            debug!(error = %e, "Failed to write output line");
        }
    })
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Statistics go to stderr so stdout stays pure pipeline output
fn print_summary(summary: &RunSummary) {
    eprintln!("\nPipeline Statistics: {}", summary.pipeline);
    eprintln!("   ├─ Lines fed: {}", summary.lines);
    if summary.interrupted {
        eprintln!("   ├─ Interrupted: yes");
    }
    eprintln!("   ├─ Dispatches: {}", summary.stats.dispatches);
    eprintln!("   ├─ Dropped: {}", summary.stats.dropped);
    eprintln!("   ├─ Processing errors: {}", summary.stats.processing_errors);
    eprintln!(
        "   ├─ Relinks: {} ({} cascades)",
        summary.stats.relinks, summary.stats.cascades
    );
    if let Some(invocations) = summary.tap_invocations {
        eprintln!("   ├─ Trace tap invocations: {}", invocations);
    }
    eprintln!("   └─ Dispatch latency: {}", summary.latency);
}
