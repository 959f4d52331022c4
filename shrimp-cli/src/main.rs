//! Shrimp CLI - on-the-fly image resizing server.
//!
//! Parses command-line flags and environment overrides, sets up logging,
//! builds the tokio runtime with the configured number of I/O threads,
//! and runs the service until interrupted.

use clap::{Parser, ValueEnum};
use shrimp::config::{AppConfig, HttpServerConfig, IpVersion, RuntimeConfig, StorageConfig};
use shrimp::logging::{init_logging, LogLevel, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Off,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Trace => LogLevel::Trace,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Warning => LogLevel::Warning,
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Critical => LogLevel::Critical,
            LogLevelArg::Off => LogLevel::Off,
        }
    }
}

#[derive(Parser)]
#[command(name = "shrimp")]
#[command(version = shrimp::VERSION)]
#[command(about = "HTTP server for on-the-fly image resizing", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short = 'a', long, default_value = "localhost")]
    address: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = 80)]
    port: u16,

    /// IP version to use (4 or 6)
    #[arg(short = 'P', long = "ip-version", default_value_t = 4)]
    ip_version: u16,

    /// Root directory for searching images
    #[arg(short = 'i', long = "images", default_value = ".")]
    images: PathBuf,

    /// HTTP I/O thread count (default: derived from core count)
    #[arg(long)]
    io_threads: Option<usize>,

    /// Transformer worker thread count (default: derived from core count)
    #[arg(long)]
    worker_threads: Option<usize>,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value_t = LogLevelArg::Info)]
    log_level: LogLevelArg,

    /// Trace message flow through the manager and workers
    #[arg(long)]
    message_tracing: bool,

    /// Trace the HTTP layer
    #[arg(long)]
    http_tracing: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LoggingConfig {
        level: cli.log_level.into(),
        message_tracing: cli.message_tracing,
        http_tracing: cli.http_tracing,
    })?;

    let config = AppConfig {
        http: HttpServerConfig {
            address: cli.address,
            port: cli.port,
            ip_version: IpVersion::from_number(cli.ip_version)?,
        },
        storage: StorageConfig {
            root_dir: cli.images,
        },
        runtime: RuntimeConfig::resolve(cli.io_threads, cli.worker_threads)?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.io_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let shutdown = CancellationToken::new();

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                signal_token.cancel();
            }
        });

        shrimp::service::run(config, shutdown).await
    })?;

    Ok(())
}
