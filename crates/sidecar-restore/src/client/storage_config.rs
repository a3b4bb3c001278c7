//! Storage client configuration.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::gateway::S3GatewayConfig;

/// Default download rate: unlimited.
pub const DEFAULT_DOWNLOAD_RATE: i64 = -1;

/// Configuration for [`StorageClient`](super::StorageClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct StorageClientConfig {
    /// Aggregate download rate in bytes per second (non-positive means unlimited)
    #[cfg_attr(
        feature = "config",
        arg(
            long = "restore-download-rate",
            env = "RESTORE_DOWNLOAD_RATE_BYTES_PER_SEC",
            default_value_t = DEFAULT_DOWNLOAD_RATE,
            allow_negative_numbers = true
        )
    )]
    #[serde(default = "default_download_rate")]
    pub download_rate_bytes_per_sec: i64,

    /// Object storage gateway settings
    #[cfg_attr(feature = "config", command(flatten))]
    #[serde(default)]
    pub gateway: S3GatewayConfig,
}

fn default_download_rate() -> i64 {
    DEFAULT_DOWNLOAD_RATE
}

impl Default for StorageClientConfig {
    fn default() -> Self {
        Self {
            download_rate_bytes_per_sec: DEFAULT_DOWNLOAD_RATE,
            gateway: S3GatewayConfig::default(),
        }
    }
}

impl StorageClientConfig {
    /// Create a configuration with the given gateway settings.
    pub fn new(gateway: S3GatewayConfig) -> Self {
        Self {
            gateway,
            ..Self::default()
        }
    }

    /// Set the aggregate download rate.
    #[must_use]
    pub fn with_download_rate(mut self, bytes_per_sec: i64) -> Self {
        self.download_rate_bytes_per_sec = bytes_per_sec;
        self
    }

    /// Returns whether downloads are throttled.
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        self.download_rate_bytes_per_sec > 0
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.gateway.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let config = StorageClientConfig::default();
        assert_eq!(config.download_rate_bytes_per_sec, -1);
        assert!(!config.is_rate_limited());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_download_rate() {
        let config = StorageClientConfig::default().with_download_rate(1 << 20);
        assert!(config.is_rate_limited());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StorageClientConfig =
            serde_json::from_str(r#"{"download_rate_bytes_per_sec": 2048}"#).unwrap();
        assert_eq!(config.download_rate_bytes_per_sec, 2048);
        assert_eq!(config.gateway, S3GatewayConfig::default());
    }

    #[test]
    fn test_validate_delegates_to_gateway() {
        let config = StorageClientConfig::new(S3GatewayConfig::new(""));
        assert!(config.validate().is_err());
    }
}
