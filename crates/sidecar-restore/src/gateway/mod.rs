//! Object storage boundary used by the storage client.
//!
//! [`ObjectStorageGateway`] is the seam between the download engine and
//! the S3-compatible service. [`S3Gateway`] implements it on top of
//! [`object_store`]; tests substitute the in-memory
//! [`MockGateway`](crate::mock::MockGateway).

use std::fmt;

use bytes::Bytes;
use futures::stream::BoxStream;
use jiff::Timestamp;
use object_store::ObjectMeta;
use object_store::aws::AwsCredentialProvider;

use crate::Result;

mod s3_config;
mod s3_gateway;

pub use s3_config::S3GatewayConfig;
pub use s3_gateway::S3Gateway;

/// Stream of object body chunks, in the order the service sends them.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Existence check for one object.
#[derive(Clone)]
pub struct HeadObjectRequest {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Quoted ETag the object must match.
    pub if_match: Option<String>,
    /// Credentials to sign the request with.
    pub credentials: AwsCredentialProvider,
}

/// Streamed download of one object.
#[derive(Clone)]
pub struct GetObjectRequest {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Credentials to sign the request with.
    pub credentials: AwsCredentialProvider,
}

impl fmt::Debug for HeadObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadObjectRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("if_match", &self.if_match)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for GetObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObjectRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Metadata returned by a successful existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadObjectOutput {
    /// ETag reported by the service.
    pub e_tag: Option<String>,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time, if reported.
    pub last_modified: Option<Timestamp>,
}

impl From<ObjectMeta> for HeadObjectOutput {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            e_tag: meta.e_tag,
            size: meta.size,
            last_modified: Timestamp::from_millisecond(meta.last_modified.timestamp_millis()).ok(),
        }
    }
}

/// S3-compatible operations the download engine relies on.
#[async_trait::async_trait]
pub trait ObjectStorageGateway: Send + Sync {
    /// Checks that the object exists and matches `if_match`.
    async fn head_object(&self, request: HeadObjectRequest) -> Result<HeadObjectOutput>;

    /// Starts a streamed download of the object body.
    async fn get_object(&self, request: GetObjectRequest) -> Result<ByteStream>;

    /// Releases connection resources. Must be idempotent.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Wraps `input` in double quotes unless it is already quoted.
pub(crate) fn quote_if_needed(input: &str) -> String {
    if input.len() >= 2 && input.starts_with('"') && input.ends_with('"') {
        input.to_string()
    } else {
        format!("\"{input}\"")
    }
}
