//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Fanout - broadcast every item of one blocking queue to N sinks
#[derive(Parser, Debug)]
#[command(
    name = "fanout",
    author,
    version,
    about = "Queue fan-out dispatcher",
    long_about = "Pops items from one source list and delivers every item to each \n\
                  configured sink, in order, until SIGINT or SIGTERM arrives."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FANOUT_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FANOUT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default level when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Prometheus port, only meaningful for `run`
    pub fn metrics_port(&self) -> Option<u16> {
        match &self.command {
            Commands::Run(args) => args.metrics_port.filter(|port| *port != 0),
            Commands::Validate(_) => None,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the fan-out and run until a termination signal
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (JSON or TOML)
    #[arg(
        short,
        long,
        default_value = config_loader::DEFAULT_CONFIG_PATH,
        env = "FANOUT_CONFIG"
    )]
    pub config: PathBuf,

    /// Metrics server port (unset or 0 = disabled)
    #[arg(long, env = "FANOUT_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = config_loader::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
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
