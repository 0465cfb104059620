//! Bridge configuration.
//!
//! Sizes count whole shared-buffer bytes, i.e. the 4-byte header word plus
//! the payload area. Defaults can be overridden per process through the
//! `SYNCLET_*` environment variables; explicit [`BridgeConfig`] fields always
//! win over the environment.

use std::time::Duration;

/// Default initial shared buffer capacity (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default growth ceiling for the shared buffer (16 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Environment override for [`BridgeConfig::buffer_size`], in bytes.
pub const BUFFER_SIZE_ENV: &str = "SYNCLET_BUFFER_SIZE";

/// Environment override for [`BridgeConfig::max_buffer_size`], in bytes.
pub const MAX_BUFFER_SIZE_ENV: &str = "SYNCLET_MAX_BUFFER_SIZE";

/// Environment override for [`BridgeConfig::timeout`], in milliseconds.
pub const TIMEOUT_MS_ENV: &str = "SYNCLET_TIMEOUT_MS";

/// Tuning knobs for a bridge instance. Immutable after construction.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Initial shared buffer capacity in bytes (header word included).
    pub buffer_size: usize,
    /// Ceiling the buffer may grow to within a worker generation. Must be at
    /// least `buffer_size`.
    pub max_buffer_size: usize,
    /// Bound on how long a call blocks for its result. `None` blocks
    /// indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            buffer_size: env_usize(BUFFER_SIZE_ENV).unwrap_or(DEFAULT_BUFFER_SIZE),
            max_buffer_size: env_usize(MAX_BUFFER_SIZE_ENV).unwrap_or(DEFAULT_MAX_BUFFER_SIZE),
            timeout: env_usize(TIMEOUT_MS_ENV).map(|ms| Duration::from_millis(ms as u64)),
        }
    }
}

impl BridgeConfig {
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Malformed values are ignored rather than reported; the built-in default
/// applies instead.
fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test for all environment handling: the process environment is
    // shared across test threads, so the SYNCLET_* variables are only ever
    // touched here.
    #[test]
    fn environment_overrides() {
        std::env::remove_var(BUFFER_SIZE_ENV);
        std::env::remove_var(MAX_BUFFER_SIZE_ENV);
        std::env::remove_var(TIMEOUT_MS_ENV);

        let config = BridgeConfig::default();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.max_buffer_size, DEFAULT_MAX_BUFFER_SIZE);
        assert_eq!(config.timeout, None);

        std::env::set_var(MAX_BUFFER_SIZE_ENV, "12345");
        std::env::set_var(TIMEOUT_MS_ENV, "250");
        std::env::set_var(BUFFER_SIZE_ENV, "not-a-number");

        let config = BridgeConfig::default();
        assert_eq!(config.max_buffer_size, 12345);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        // Malformed override falls back to the built-in default.
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);

        std::env::remove_var(BUFFER_SIZE_ENV);
        std::env::remove_var(MAX_BUFFER_SIZE_ENV);
        std::env::remove_var(TIMEOUT_MS_ENV);
    }

    #[test]
    fn builder_helpers() {
        let config = BridgeConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            timeout: None,
        }
        .with_buffer_size(1024)
        .with_max_buffer_size(2048)
        .with_timeout(Duration::from_millis(10));
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.max_buffer_size, 2048);
        assert_eq!(config.timeout, Some(Duration::from_millis(10)));
    }
}
