//! Bounds and periods for the transform manager.

use std::time::Duration;

/// Configuration for the transform manager.
///
/// The defaults are the production values; tests shrink them to drive
/// eviction and timeout paths quickly.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Ceiling for the total size of cached blobs. A single entry may
    /// exceed it on its own.
    pub max_cache_bytes: u64,
    /// Max number of distinct keys waiting for a worker.
    pub max_pending: usize,
    /// Entries untouched for longer than this are swept out.
    pub max_cache_age: Duration,
    /// How often the age sweep runs.
    pub clear_cache_period: Duration,
    /// How long a request may sit in the pending queue before a 504.
    pub max_pending_time: Duration,
    /// How often the pending sweep runs.
    pub check_pending_period: Duration,
    /// Fixed cost charged to every failed purge authentication.
    pub negative_auth_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: 100 * 1024 * 1024,
            max_pending: 64,
            max_cache_age: Duration::from_secs(60 * 60),
            clear_cache_period: Duration::from_secs(60),
            max_pending_time: Duration::from_secs(20),
            check_pending_period: Duration::from_secs(5),
            negative_auth_delay: Duration::from_secs(7),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_cache_bytes, 100 * 1024 * 1024);
        assert_eq!(config.max_pending, 64);
        assert_eq!(config.max_cache_age, Duration::from_secs(3600));
        assert_eq!(config.clear_cache_period, Duration::from_secs(60));
        assert_eq!(config.max_pending_time, Duration::from_secs(20));
        assert_eq!(config.check_pending_period, Duration::from_secs(5));
        assert_eq!(config.negative_auth_delay, Duration::from_secs(7));
    }
}
