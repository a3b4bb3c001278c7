//! S3 gateway configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for the S3-compatible object storage gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct S3GatewayConfig {
    /// AWS region of the restore buckets
    #[cfg_attr(
        feature = "config",
        arg(long = "restore-s3-region", env = "RESTORE_S3_REGION", default_value = DEFAULT_REGION)
    )]
    #[serde(default = "default_region")]
    pub s3_region: String,

    /// Endpoint URL for non-AWS S3-compatible services (e.g. MinIO)
    #[cfg_attr(
        feature = "config",
        arg(long = "restore-s3-endpoint", env = "RESTORE_S3_ENDPOINT")
    )]
    #[serde(default)]
    pub s3_endpoint: Option<String>,

    /// Allow plain HTTP endpoints
    #[cfg_attr(
        feature = "config",
        arg(long = "restore-s3-allow-http", env = "RESTORE_S3_ALLOW_HTTP")
    )]
    #[serde(default)]
    pub s3_allow_http: bool,

    /// Per-request timeout in seconds (optional)
    #[cfg_attr(
        feature = "config",
        arg(
            long = "restore-s3-request-timeout",
            env = "RESTORE_S3_REQUEST_TIMEOUT_SECS"
        )
    )]
    #[serde(default)]
    pub s3_request_timeout_secs: Option<u64>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for S3GatewayConfig {
    fn default() -> Self {
        Self {
            s3_region: default_region(),
            s3_endpoint: None,
            s3_allow_http: false,
            s3_request_timeout_secs: None,
        }
    }
}

impl S3GatewayConfig {
    /// Create a configuration for the given region.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            s3_region: region.into(),
            ..Self::default()
        }
    }

    /// Set a custom endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self
    }

    /// Allow plain HTTP endpoints.
    #[must_use]
    pub fn with_allow_http(mut self, allow_http: bool) -> Self {
        self.s3_allow_http = allow_http;
        self
    }

    /// Set the per-request timeout in seconds.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.s3_request_timeout_secs = Some(secs);
        self
    }

    /// Returns the request timeout as a Duration, if set.
    #[inline]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.s3_request_timeout_secs.map(Duration::from_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.s3_region.trim().is_empty() {
            return Err(Error::configuration("S3 region cannot be empty"));
        }

        if let Some(endpoint) = &self.s3_endpoint {
            if endpoint.trim().is_empty() {
                return Err(Error::configuration("S3 endpoint cannot be empty"));
            }
            if endpoint.starts_with("http://") && !self.s3_allow_http {
                return Err(Error::configuration(
                    "Plain HTTP endpoint requires s3_allow_http",
                ));
            }
        }

        if self.s3_request_timeout_secs == Some(0) {
            return Err(Error::configuration("S3 request timeout must be positive"));
        }

        Ok(())
    }
}
