//! Logging infrastructure.
//!
//! Structured logging via `tracing`, printed to stdout in a compact
//! single-line format. The base level applies to everything; the two
//! tracing switches raise individual components to TRACE so message flow
//! or HTTP handling can be watched in isolation.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Log levels accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Off,
}

impl LogLevel {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" => Some(LogLevel::Critical),
            "off" => Some(LogLevel::Off),
            _ => None,
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            // tracing has no level above ERROR.
            LogLevel::Error | LogLevel::Critical => "error",
            LogLevel::Off => "off",
        }
    }
}

/// What to log and how loudly.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Trace message flow through the manager and workers.
    pub message_tracing: bool,
    /// Trace the HTTP adapter.
    pub http_tracing: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            message_tracing: false,
            http_tracing: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

/// Install the global subscriber.
///
/// May be called once per process; a second call fails.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(filter_directives(config))
        .map_err(|err| LoggingError::Init(err.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|err| LoggingError::Init(err.to_string()))
}

fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.level.directive().to_string();
    if config.message_tracing {
        directives.push_str(",shrimp::manager=trace,shrimp::worker=trace");
    }
    if config.http_tracing {
        directives.push_str(",shrimp::http=trace");
    }
    directives
}
