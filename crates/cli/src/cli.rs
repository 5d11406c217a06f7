//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// SOS Engine - emergency-alert coordination engine driver
#[derive(Parser, Debug)]
#[command(
    name = "sos-engine",
    author,
    version,
    about = "Emergency alert coordination engine",
    long_about = "Drives the emergency-alert engine against in-process services.\n\n\
                  Detects a triple shake (replayed or synthetic) or a manual press, \n\
                  runs the cancellable countdown and dispatches the alert to the \n\
                  configured contacts through a logging channel."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SOS_ENGINE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SOS_ENGINE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one alert session against mock services
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "SOS_ENGINE_CONFIG"
    )]
    pub config: PathBuf,

    /// Replay an accelerometer recording (JSON lines: t_ms, x, y, z)
    #[arg(long, conflicts_with = "manual")]
    pub replay: Option<PathBuf>,

    /// Replay speed multiplier (1.0 = original speed)
    #[arg(long, default_value = "1.0")]
    pub replay_speed: f64,

    /// Trigger with a manual press instead of shaking
    #[arg(long)]
    pub manual: bool,

    /// Cancel the countdown this many seconds after it starts
    #[arg(long, value_name = "SECONDS")]
    pub cancel_after: Option<f64>,

    /// Account the alert is sent for
    #[arg(long, default_value = "civ-001", env = "SOS_ENGINE_USER")]
    pub user: String,

    /// Directory fixture (JSON: classification, contacts, profile)
    #[arg(long, env = "SOS_ENGINE_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Append emergency reports to this JSON-lines file instead of logging them
    #[arg(long, env = "SOS_ENGINE_REPORTS")]
    pub reports: Option<PathBuf>,

    /// Simulate a device that cannot get a position fix
    #[arg(long)]
    pub no_fix: bool,

    /// Session timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "60", env = "SOS_ENGINE_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SOS_ENGINE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON structured logging
    Json,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
            LogFormat::Json => observability::LogFormat::Json,
        }
    }
}
