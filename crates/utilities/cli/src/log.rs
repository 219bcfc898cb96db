//! Logging flags and the global tracing subscriber.

use crate::{CliError, CliResult};
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-field human readable lines.
    #[default]
    Full,
    /// Single-line condensed output.
    Compact,
    /// Newline-delimited JSON objects.
    Json,
}

/// Logging arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct LogArgs {
    /// Verbosity level (0-5).
    ///
    /// The number of `-v` flags selects the level: error, warn, info, debug, trace.
    /// Defaults to info. `RUST_LOG` directives take precedence for the targets they name.
    #[arg(
        short = 'v',
        long = "verbosity",
        action = clap::ArgAction::Count,
        default_value = "3",
        global = true
    )]
    pub v: u8,
    /// Log line format.
    #[arg(long = "log.format", value_enum, default_value_t = LogFormat::Full, global = true)]
    pub log_format: LogFormat,
}

impl Default for LogArgs {
    fn default() -> Self {
        Self { v: 3, log_format: LogFormat::Full }
    }
}

impl LogArgs {
    /// Installs the global subscriber described by these flags.
    pub fn init_tracing_subscriber(&self, filter: Option<EnvFilter>) -> CliResult<()> {
        init_tracing_subscriber(self.v, self.log_format, filter)
    }
}

/// Maps a `-v` count onto a level filter.
pub const fn verbosity_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs a global fmt subscriber.
///
/// `filter` defaults to the `RUST_LOG` environment variable. The verbosity level is added as
/// the default directive for every target the filter does not name.
pub fn init_tracing_subscriber(
    verbosity: u8,
    format: LogFormat,
    filter: Option<EnvFilter>,
) -> CliResult<()> {
    let filter = filter
        .unwrap_or_else(EnvFilter::from_default_env)
        .add_directive(verbosity_level(verbosity).into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| CliError::TracingInitialization(err.to_string()))
}
