//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pipeline runner - feed lines through a reconfigurable processor chain
#[derive(Parser, Debug)]
#[command(
    name = "pipeline-cli",
    author,
    version,
    about = "Reconfigurable synchronous text pipeline",
    long_about = "Builds a processor chain from a TOML/JSON configuration, feeds lines \n\
                  from stdin or a file through one of its entry points and prints \n\
                  whatever reaches the tail."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "PIPELINE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "PIPELINE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline over input lines
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the chain a configuration builds
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "pipeline.toml", env = "PIPELINE_CONFIG")]
    pub config: PathBuf,

    /// Read lines from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Entry point to feed (defaults to the first one configured)
    #[arg(short, long)]
    pub entry_point: Option<String>,

    /// Disable a configured stage before feeding (repeatable)
    #[arg(long, value_name = "STAGE")]
    pub disable: Vec<String>,

    /// Bypass a configured stage before feeding (repeatable)
    #[arg(long, value_name = "STAGE")]
    pub bypass: Vec<String>,

    /// Install the diagnostic trace tap regardless of configuration
    #[arg(long)]
    pub trace_tap: bool,

    /// Build the pipeline, print its chain and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "PIPELINE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List the registered stage factories
    #[arg(long)]
    pub factories: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::parse_from([
            "pipeline-cli",
            "run",
            "-c",
            "text.toml",
            "--disable",
            "upper",
            "--bypass",
            "trim",
            "--bypass",
            "lower",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("text.toml"));
                assert_eq!(args.disable, ["upper"]);
                assert_eq!(args.bypass, ["trim", "lower"]);
                assert_eq!(args.metrics_port, 0);
                assert!(args.input.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["pipeline-cli", "-q", "-v", "validate"]);
        assert!(result.is_err());
    }
}
