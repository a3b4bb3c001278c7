//! Convenience re-exports.

pub use crate::client::{DownloadOutcome, SkipReason, StorageClient, StorageClientConfig};
pub use crate::gateway::{
    ByteStream, GetObjectRequest, HeadObjectOutput, HeadObjectRequest, ObjectStorageGateway,
    S3Gateway, S3GatewayConfig,
};
pub use crate::job::{
    RestoreJob, RestoreJobSecrets, RestoreJobStatus, RestoreRange, StorageCredentials,
};
pub use crate::rate::RateLimiter;
pub use crate::{Error, ErrorKind, Result};
