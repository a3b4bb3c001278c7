//! S3-compatible gateway built on [`object_store::aws::AmazonS3Builder`].
//!
//! Works with AWS S3, MinIO, and any S3-compatible service. Bucket and
//! credentials come from the restore range and the job's current
//! credentials, so built stores are cached per bucket and credential
//! provider and reuse their connection pool across requests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder, AwsCredentialProvider};
use object_store::path::Path;
use object_store::{ClientOptions, GetOptions, ObjectStore};

use super::{
    ByteStream, GetObjectRequest, HeadObjectOutput, HeadObjectRequest, ObjectStorageGateway,
    S3GatewayConfig,
};
use crate::{Error, Result, TRACING_TARGET_GATEWAY};

/// Store built for one bucket and one credential provider.
struct CachedStore {
    credentials: AwsCredentialProvider,
    store: AmazonS3,
}

impl CachedStore {
    fn signed_with(&self, credentials: &AwsCredentialProvider) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.credentials), Arc::as_ptr(credentials))
    }

    /// Only the cache still holds the provider: the credentials were
    /// rotated or revoked and no request is using them.
    fn is_stale(&self) -> bool {
        Arc::strong_count(&self.credentials) == 1
    }
}

type StoreCache = HashMap<String, Vec<CachedStore>>;

/// Object storage gateway for S3-compatible services.
pub struct S3Gateway {
    config: S3GatewayConfig,
    stores: Mutex<StoreCache>,
    closed: AtomicBool,
}

impl S3Gateway {
    /// Creates a gateway from a validated configuration.
    pub fn new(config: S3GatewayConfig) -> Result<Self> {
        config.validate().inspect_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_GATEWAY,
                error = %e,
                "S3 gateway configuration validation failed"
            );
        })?;

        tracing::info!(
            target: TRACING_TARGET_GATEWAY,
            region = %config.s3_region,
            endpoint = config.s3_endpoint.as_deref().unwrap_or("aws"),
            "S3 gateway initialized"
        );

        Ok(Self {
            config,
            stores: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the gateway configuration.
    pub fn config(&self) -> &S3GatewayConfig {
        &self.config
    }

    /// Returns whether [`close`](ObjectStorageGateway::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of stores currently cached.
    pub fn cached_stores(&self) -> usize {
        self.stores().values().map(Vec::len).sum()
    }

    /// Returns the cached store for `bucket` and `credentials`, building it on first use.
    ///
    /// Building a new store first evicts stores whose credentials are no
    /// longer referenced outside the cache.
    fn store(&self, bucket: &str, credentials: AwsCredentialProvider) -> Result<AmazonS3> {
        let mut stores = self.stores();
        if self.is_closed() {
            return Err(Error::client_closed());
        }

        let cached = stores
            .get(bucket)
            .and_then(|entries| entries.iter().find(|entry| entry.signed_with(&credentials)));
        if let Some(entry) = cached {
            return Ok(entry.store.clone());
        }

        evict_stale(&mut stores);

        let store = self.build(bucket, Arc::clone(&credentials))?;
        stores
            .entry(bucket.to_string())
            .or_default()
            .push(CachedStore {
                credentials,
                store: store.clone(),
            });

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            bucket,
            "S3 store built"
        );

        Ok(store)
    }

    fn build(&self, bucket: &str, credentials: AwsCredentialProvider) -> Result<AmazonS3> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.config.s3_region)
            .with_credentials(credentials);

        if let Some(endpoint) = &self.config.s3_endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(self.config.s3_allow_http);
        }

        if let Some(timeout) = self.config.request_timeout() {
            builder = builder.with_client_options(ClientOptions::new().with_timeout(timeout));
        }

        builder.build().map_err(|e| {
            Error::configuration(format!("Failed to build S3 client for bucket {bucket}"))
                .with_source(e)
        })
    }

    fn stores(&self) -> MutexGuard<'_, StoreCache> {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn evict_stale(stores: &mut StoreCache) {
    stores.retain(|_, entries| {
        entries.retain(|entry| !entry.is_stale());
        !entries.is_empty()
    });
}

impl fmt::Debug for S3Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Gateway")
            .field("config", &self.config)
            .field("cached_stores", &self.cached_stores())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait::async_trait]
impl ObjectStorageGateway for S3Gateway {
    #[tracing::instrument(
        name = "gateway.head_object",
        skip_all,
        fields(bucket = %request.bucket, key = %request.key)
    )]
    async fn head_object(&self, request: HeadObjectRequest) -> Result<HeadObjectOutput> {
        let store = self.store(&request.bucket, request.credentials)?;
        let options = GetOptions {
            if_match: request.if_match,
            head: true,
            ..Default::default()
        };

        let result = store.get_opts(&Path::from(request.key), options).await?;
        Ok(HeadObjectOutput::from(result.meta))
    }

    #[tracing::instrument(
        name = "gateway.get_object",
        skip_all,
        fields(bucket = %request.bucket, key = %request.key)
    )]
    async fn get_object(&self, request: GetObjectRequest) -> Result<ByteStream> {
        let store = self.store(&request.bucket, request.credentials)?;
        let result = store.get(&Path::from(request.key)).await?;

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            size = result.meta.size,
            "Object stream opened"
        );

        Ok(Box::pin(result.into_stream().map_err(Error::from)))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut stores = self.stores();
        let released: usize = stores.values().map(Vec::len).sum();
        stores.clear();

        tracing::info!(
            target: TRACING_TARGET_GATEWAY,
            released_stores = released,
            "S3 gateway closed"
        );
        Ok(())
    }
}
