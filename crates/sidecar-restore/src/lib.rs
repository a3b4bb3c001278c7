#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod credentials;
mod error;

pub mod client;
pub mod gateway;
pub mod job;
pub mod rate;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

#[doc(hidden)]
pub mod prelude;

pub use client::{DownloadOutcome, SkipReason, StorageClient, StorageClientConfig};
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use gateway::{ObjectStorageGateway, S3Gateway, S3GatewayConfig};
pub use job::{RestoreJob, RestoreJobSecrets, RestoreJobStatus, RestoreRange, StorageCredentials};
pub use rate::RateLimiter;

/// Tracing target for storage client operations.
pub const TRACING_TARGET_CLIENT: &str = "sidecar_restore::client";

/// Tracing target for credential lifecycle events.
pub const TRACING_TARGET_CREDENTIALS: &str = "sidecar_restore::credentials";

/// Tracing target for the download pipeline and rate limiting.
pub const TRACING_TARGET_DOWNLOAD: &str = "sidecar_restore::download";

/// Tracing target for object storage gateway operations.
pub const TRACING_TARGET_GATEWAY: &str = "sidecar_restore::gateway";
