//! Runtime limits for dispatch and file transfers.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically.

use core::str::FromStr;
use core::time::Duration;
use std::env;

/// Limits shared by every session of an app.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Payload size of outbound file chunks
    pub chunk_size: usize,
    /// Upper bound on uploaded-file placeholders buffered per session
    pub max_pending_files: usize,
    /// Upper bound on the assembled size of one transfer
    pub max_transfer_bytes: usize,
    /// Age after which unconsumed uploaded-file placeholders are discarded
    pub pending_ttl_ms: u64,
    /// Idle time after which an unfinished save transfer is abandoned
    pub transfer_ttl_ms: u64,
    /// Whether each dispatch cycle logs its duration
    pub log_timings: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16_000,
            max_pending_files: 64,
            max_transfer_bytes: 64 * 1024 * 1024,
            pending_ttl_ms: 60_000,
            transfer_ttl_ms: 300_000,
            log_timings: false,
        }
    }
}

fn env_number<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables, falling back to the defaults:
    /// - `PAGEWIRE_CHUNK_SIZE`: outbound chunk size (default: 16000, minimum 1)
    /// - `PAGEWIRE_MAX_PENDING_FILES`: buffered file placeholders (default: 64)
    /// - `PAGEWIRE_MAX_TRANSFER_BYTES`: bytes per transfer (default: 64 MiB)
    /// - `PAGEWIRE_PENDING_TTL_MS`: placeholder lifetime (default: 60000)
    /// - `PAGEWIRE_TRANSFER_TTL_MS`: idle save transfer lifetime (default: 300000)
    /// - `PAGEWIRE_LOG_TIMINGS`: set to "1" to log cycle durations
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chunk_size: env_number("PAGEWIRE_CHUNK_SIZE")
                .unwrap_or(defaults.chunk_size)
                .max(1),
            max_pending_files: env_number("PAGEWIRE_MAX_PENDING_FILES")
                .unwrap_or(defaults.max_pending_files),
            max_transfer_bytes: env_number("PAGEWIRE_MAX_TRANSFER_BYTES")
                .unwrap_or(defaults.max_transfer_bytes),
            pending_ttl_ms: env_number("PAGEWIRE_PENDING_TTL_MS")
                .unwrap_or(defaults.pending_ttl_ms),
            transfer_ttl_ms: env_number("PAGEWIRE_TRANSFER_TTL_MS")
                .unwrap_or(defaults.transfer_ttl_ms),
            log_timings: env::var("PAGEWIRE_LOG_TIMINGS").ok().as_deref() == Some("1"),
        }
    }

    #[inline]
    #[must_use]
    pub const fn pending_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_ttl_ms)
    }

    #[inline]
    #[must_use]
    pub const fn transfer_ttl(&self) -> Duration {
        Duration::from_millis(self.transfer_ttl_ms)
    }
}
