//! # Observability
//!
//! Logging and Prometheus metrics shared by the pipeline binaries.
//!
//! Logs always go to stderr so stdout stays free for pipeline output.
//! Without `RUST_LOG` the filter raises only this workspace's crates to the
//! requested level and keeps dependencies at `warn`.
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Pretty,
//!     metrics_port: None,
//!     ..Default::default()
//! })?;
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_dispatch, record_dispatch_latency, record_processing_error, record_relink,
    LatencyStats, LatencySummary,
};

/// Tracing targets of the workspace libraries and binaries
pub const WORKSPACE_TARGETS: [&str; 8] = [
    "contracts",
    "config_loader",
    "engine",
    "stages",
    "observability",
    "pipeline_cli",
    "config_pipeline",
    "upper_lower",
];

/// Level applied to everything outside [`WORKSPACE_TARGETS`]
const DEPENDENCY_LEVEL: &str = "warn";

/// Initialize with defaults (JSON logs, no metrics endpoint)
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Level for workspace crates when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON lines
    #[default]
    Json,
    /// Multi-line human readable
    Pretty,
    /// Single line human readable
    Compact,
}

/// Filter directives used when `RUST_LOG` is unset
///
/// `default_directives("debug")` yields `warn,contracts=debug,...`.
pub fn default_directives(level: &str) -> String {
    WORKSPACE_TARGETS
        .iter()
        .fold(DEPENDENCY_LEVEL.to_string(), |mut directives, target| {
            directives.push_str(&format!(",{target}={level}"));
            directives
        })
}

pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(&config.default_log_level))
            .with_context(|| format!("Invalid log level '{}'", config.default_log_level))?,
    };

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Install only the Prometheus recorder (tracing set up elsewhere)
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
