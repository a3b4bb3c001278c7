//! In-memory object storage gateway for testing.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! sidecar-restore = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sidecar_restore::mock::MockGateway;
//!
//! let gateway = MockGateway::new().with_chunk_size(4);
//! gateway.put_object("bucket", "ks/tbl/s1.zip", "abc123", "payload");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::stream;
use object_store::aws::AwsCredentialProvider;

use crate::gateway::{
    ByteStream, GetObjectRequest, HeadObjectOutput, HeadObjectRequest, ObjectStorageGateway,
};
use crate::{Error, ErrorKind, Result};

/// Default chunk size of served object bodies.
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// One request observed by the [`MockGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// Existence check.
    Head {
        /// Requested bucket.
        bucket: String,
        /// Requested key.
        key: String,
        /// Expected quoted ETag.
        if_match: Option<String>,
        /// Access key the request was signed with.
        access_key_id: String,
        /// Session token the request was signed with.
        session_token: Option<String>,
    },
    /// Streamed download.
    Get {
        /// Requested bucket.
        bucket: String,
        /// Requested key.
        key: String,
        /// Access key the request was signed with.
        access_key_id: String,
        /// Session token the request was signed with.
        session_token: Option<String>,
    },
}

impl GatewayCall {
    /// Access key the request was signed with.
    pub fn access_key_id(&self) -> &str {
        match self {
            Self::Head { access_key_id, .. } | Self::Get { access_key_id, .. } => access_key_id,
        }
    }

    /// Session token the request was signed with.
    pub fn session_token(&self) -> Option<&str> {
        match self {
            Self::Head { session_token, .. } | Self::Get { session_token, .. } => {
                session_token.as_deref()
            }
        }
    }
}

/// Failure injected for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The request fails before any byte is sent.
    Request(ErrorKind),
    /// The stream fails after the given number of chunks.
    MidStream {
        /// Chunks delivered before the failure.
        after_chunks: usize,
    },
}

#[derive(Debug, Clone)]
struct MockObject {
    data: Bytes,
    e_tag: String,
}

#[derive(Debug, Default)]
struct MockState {
    objects: HashMap<(String, String), MockObject>,
    failures: HashMap<String, MockFailure>,
    calls: Vec<GatewayCall>,
}

/// Gateway serving objects from memory and recording every request.
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
    chunk_size: usize,
    closed: AtomicBool,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Creates an empty gateway.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            closed: AtomicBool::new(false),
        }
    }

    /// Sets the size of served body chunks.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Stores an object. The ETag is stored quoted.
    pub fn put_object(
        &self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        e_tag: &str,
        data: impl Into<Bytes>,
    ) {
        let object = MockObject {
            data: data.into(),
            e_tag: crate::gateway::quote_if_needed(e_tag),
        };
        self.state()
            .objects
            .insert((bucket.into(), key.into()), object);
    }

    /// Makes every request for `key` fail as described.
    pub fn fail_key(&self, key: impl Into<String>, failure: MockFailure) {
        self.state().failures.insert(key.into(), failure);
    }

    /// Returns all recorded requests in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    /// Number of existence checks received.
    pub fn head_count(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::Head { .. }))
    }

    /// Number of downloads received.
    pub fn get_count(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::Get { .. }))
    }

    /// Returns whether [`close`](ObjectStorageGateway::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn count(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn signer(credentials: &AwsCredentialProvider) -> Result<(String, Option<String>)> {
        let credential = credentials.get_credential().await?;
        Ok((credential.key_id.clone(), credential.token.clone()))
    }

    fn lookup(&self, bucket: &str, key: &str) -> Result<(MockObject, Option<MockFailure>)> {
        let state = self.state();
        if let Some(MockFailure::Request(kind)) = state.failures.get(key) {
            return Err(Error::new(*kind).with_message(format!("Injected failure for {key}")));
        }

        let object = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound).with_message(format!("Object {bucket}/{key} not found"))
            })?;
        Ok((object, state.failures.get(key).copied()))
    }
}

#[async_trait::async_trait]
impl ObjectStorageGateway for MockGateway {
    async fn head_object(&self, request: HeadObjectRequest) -> Result<HeadObjectOutput> {
        if self.is_closed() {
            return Err(Error::client_closed());
        }

        let (access_key_id, session_token) = Self::signer(&request.credentials).await?;
        self.state().calls.push(GatewayCall::Head {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            if_match: request.if_match.clone(),
            access_key_id,
            session_token,
        });

        let (object, _) = self.lookup(&request.bucket, &request.key)?;
        if let Some(expected) = &request.if_match
            && expected != "*"
            && *expected != object.e_tag
        {
            return Err(Error::new(ErrorKind::PreconditionFailed)
                .with_message(format!("ETag {} does not match {expected}", object.e_tag)));
        }

        Ok(HeadObjectOutput {
            e_tag: Some(object.e_tag),
            size: object.data.len() as u64,
            last_modified: None,
        })
    }

    async fn get_object(&self, request: GetObjectRequest) -> Result<ByteStream> {
        if self.is_closed() {
            return Err(Error::client_closed());
        }

        let (access_key_id, session_token) = Self::signer(&request.credentials).await?;
        self.state().calls.push(GatewayCall::Get {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            access_key_id,
            session_token,
        });

        let (object, failure) = self.lookup(&request.bucket, &request.key)?;
        let mut chunks: Vec<Result<Bytes>> = (0..object.data.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(object.data.len());
                Ok(object.data.slice(start..end))
            })
            .collect();

        if let Some(MockFailure::MidStream { after_chunks }) = failure {
            chunks.truncate(after_chunks);
            chunks.push(Err(Error::new(ErrorKind::Network)
                .with_message(format!("Connection reset while streaming {}", request.key))));
        }

        Ok(Box::pin(stream::iter(chunks)))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
