//! Runtime configuration for the page recorder.
//!
//! Controls mutation debouncing, the pre-snapshot quiet window, asset
//! fetch concurrency, and output chunking. Configuration can be loaded
//! from environment variables or constructed programmatically.

use core::time::Duration;
use std::env;

/// Runtime configuration for a [`crate::recorder::PageRecorder`].
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    /// How long to let mutations settle before reconciling a batch.
    pub debounce_ms: u64,
    /// How long the document must stay mutation-free before a snapshot.
    pub quiet_window_ms: u64,
    /// Maximum number of asset fetches in flight.
    pub fetch_concurrency: usize,
    /// Writer chunk size in bytes.
    pub chunk_size: usize,
    /// Suppress animations and transitions while snapshotting.
    pub freeze_animations: bool,
    /// Allow fetching assets from origins other than the page's.
    pub allow_cross_origin: bool,
    /// Interval between heartbeat frames.
    pub heartbeat_interval_secs: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            quiet_window_ms: 200,
            fetch_concurrency: 6,
            chunk_size: protocol::DEFAULT_CHUNK_SIZE,
            freeze_animations: false,
            allow_cross_origin: false,
            heartbeat_interval_secs: 30,
        }
    }
}

impl RecorderConfig {
    /// Construct a new `RecorderConfig` with explicit values.
    ///
    /// # Arguments
    ///
    /// * `debounce_ms` - Mutation debounce in milliseconds
    /// * `quiet_window_ms` - Pre-snapshot quiet window in milliseconds
    /// * `fetch_concurrency` - Concurrent asset fetches (minimum 1)
    /// * `chunk_size` - Writer chunk size in bytes (minimum 1)
    /// * `freeze_animations` - Whether to freeze animations while snapshotting
    /// * `allow_cross_origin` - Whether to fetch cross-origin assets
    /// * `heartbeat_interval_secs` - Heartbeat interval, 0 to disable
    ///
    /// # Returns
    ///
    /// A new `RecorderConfig` instance with the specified settings
    #[inline]
    #[must_use]
    pub const fn new(
        debounce_ms: u64,
        quiet_window_ms: u64,
        fetch_concurrency: usize,
        chunk_size: usize,
        freeze_animations: bool,
        allow_cross_origin: bool,
        heartbeat_interval_secs: u32,
    ) -> Self {
        let fetch_concurrency = if fetch_concurrency < 1 {
            1
        } else {
            fetch_concurrency
        };
        let chunk_size = if chunk_size < 1 { 1 } else { chunk_size };
        Self {
            debounce_ms,
            quiet_window_ms,
            fetch_concurrency,
            chunk_size,
            freeze_animations,
            allow_cross_origin,
            heartbeat_interval_secs,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables, falling back to the
    /// defaults for anything unset or unparsable:
    /// - `DCRR_DEBOUNCE_MS`: mutation debounce in milliseconds (default: 500)
    /// - `DCRR_QUIET_WINDOW_MS`: pre-snapshot quiet window (default: 200)
    /// - `DCRR_FETCH_CONCURRENCY`: concurrent asset fetches (default: 6)
    /// - `DCRR_CHUNK_SIZE`: writer chunk size in bytes (default: 65536)
    /// - `DCRR_FREEZE_ANIMATIONS`: set to "1" to freeze animations
    /// - `DCRR_ALLOW_CROSS_ORIGIN`: set to "1" to fetch cross-origin assets
    /// - `DCRR_HEARTBEAT_SECS`: heartbeat interval (default: 30)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let debounce_ms = env::var("DCRR_DEBOUNCE_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.debounce_ms);
        let quiet_window_ms = env::var("DCRR_QUIET_WINDOW_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.quiet_window_ms);
        let fetch_concurrency = env::var("DCRR_FETCH_CONCURRENCY")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.fetch_concurrency)
            .max(1);
        let chunk_size = env::var("DCRR_CHUNK_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.chunk_size)
            .max(1);
        let freeze_animations = env::var("DCRR_FREEZE_ANIMATIONS").ok().as_deref() == Some("1");
        let allow_cross_origin = env::var("DCRR_ALLOW_CROSS_ORIGIN").ok().as_deref() == Some("1");
        let heartbeat_interval_secs = env::var("DCRR_HEARTBEAT_SECS")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(defaults.heartbeat_interval_secs);
        Self {
            debounce_ms,
            quiet_window_ms,
            fetch_concurrency,
            chunk_size,
            freeze_animations,
            allow_cross_origin,
            heartbeat_interval_secs,
        }
    }

    /// The mutation debounce as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The quiet window as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    /// The heartbeat interval as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_degenerate_values() {
        let config = RecorderConfig::new(0, 0, 0, 0, true, false, 0);
        assert_eq!(config.fetch_concurrency, 1);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.debounce_ms, 0);
        assert!(config.freeze_animations);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(0));
    }

    #[test]
    fn new_keeps_explicit_values() {
        let config = RecorderConfig::new(250, 100, 4, 4096, false, true, 15);
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.quiet_window(), Duration::from_millis(100));
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.chunk_size, 4096);
        assert!(config.allow_cross_origin);
    }
}
