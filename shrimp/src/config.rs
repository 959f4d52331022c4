//! Service configuration.
//!
//! Thread counts resolve in three layers: CLI flag, then environment
//! variable, then a default derived from the core count. Everything else
//! comes straight from flags with compiled-in defaults.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use thiserror::Error;

/// Environment override for the HTTP I/O thread count.
pub const IO_THREADS_ENV: &str = "SHRIMP_IO_THREADS";

/// Environment override for the transformer worker count.
pub const WORKER_THREADS_ENV: &str = "SHRIMP_WORKER_THREADS";

/// Configuration errors. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for IP version: {0} (expected 4 or 6)")]
    InvalidIpVersion(u16),

    #[error("cannot resolve listen address '{address}': {source}")]
    AddressResolution {
        address: String,
        source: std::io::Error,
    },

    #[error("no IPv{version} address found for '{address}'")]
    NoMatchingAddress { address: String, version: u16 },

    #[error("invalid thread count from {origin}: '{value}'")]
    InvalidThreadCount {
        origin: &'static str,
        value: String,
    },

    #[error("images root '{0}' is not a directory")]
    BadImagesRoot(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn from_number(version: u16) -> Result<Self, ConfigError> {
        match version {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            other => Err(ConfigError::InvalidIpVersion(other)),
        }
    }

    pub fn number(&self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

/// Listen parameters for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub address: String,
    pub port: u16,
    pub ip_version: IpVersion,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 80,
            ip_version: IpVersion::V4,
        }
    }
}

/// Where the original images live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
        }
    }
}

/// Thread pool sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Tokio runtime workers serving HTTP I/O and the manager.
    pub io_threads: usize,
    /// Dedicated transformer worker threads.
    pub worker_threads: usize,
}

impl RuntimeConfig {
    /// Resolve thread counts from flags, environment, and defaults.
    ///
    /// A flag beats the environment variable, which beats the default.
    /// Zero is rejected from any source.
    pub fn resolve(
        io_flag: Option<usize>,
        worker_flag: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let (default_io, default_workers) = default_thread_counts();

        let io_threads = pick_thread_count(io_flag, IO_THREADS_ENV)?.unwrap_or(default_io);
        let worker_threads =
            pick_thread_count(worker_flag, WORKER_THREADS_ENV)?.unwrap_or(default_workers);

        Ok(Self {
            io_threads,
            worker_threads,
        })
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let (io_threads, worker_threads) = default_thread_counts();
        Self {
            io_threads,
            worker_threads,
        }
    }
}

fn pick_thread_count(
    flag: Option<usize>,
    env_var: &'static str,
) -> Result<Option<usize>, ConfigError> {
    if let Some(value) = flag {
        if value == 0 {
            return Err(ConfigError::InvalidThreadCount {
                origin: "command line",
                value: value.to_string(),
            });
        }
        return Ok(Some(value));
    }

    match std::env::var(env_var) {
        Ok(text) => match text.parse::<usize>() {
            Ok(value) if value > 0 => Ok(Some(value)),
            _ => Err(ConfigError::InvalidThreadCount {
                origin: env_var,
                value: text,
            }),
        },
        Err(_) => Ok(None),
    }
}

/// Default split of available cores between HTTP I/O and transformers.
pub fn default_thread_counts() -> (usize, usize) {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    thread_counts_for(cores)
}

fn thread_counts_for(cores: usize) -> (usize, usize) {
    let io_threads = usize::min(2, cores.div_ceil(3));
    let worker_threads = usize::max(2, cores.saturating_sub(io_threads));
    (io_threads, worker_threads)
}

/// Parameters for the whole application.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub http: HttpServerConfig,
    pub storage: StorageConfig,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Resolve the listen address honoring the configured IP version.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let address = self.http.address.as_str();
        let candidates = (address, self.http.port)
            .to_socket_addrs()
            .map_err(|source| ConfigError::AddressResolution {
                address: address.to_string(),
                source,
            })?;

        let want_v4 = self.http.ip_version == IpVersion::V4;
        candidates
            .into_iter()
            .find(|candidate| candidate.is_ipv4() == want_v4)
            .ok_or_else(|| ConfigError::NoMatchingAddress {
                address: address.to_string(),
                version: self.http.ip_version.number(),
            })
    }

    /// Fail early on an unusable images root.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.storage.root_dir.is_dir() {
            return Err(ConfigError::BadImagesRoot(self.storage.root_dir.clone()));
        }
        Ok(())
    }
}
