//! Credential-aware storage client for restore slices.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use super::{DownloadOutcome, StorageClientConfig, download};
use crate::credentials::{CredentialStore, Credentials, Upsert};
use crate::gateway::{
    HeadObjectOutput, HeadObjectRequest, ObjectStorageGateway, S3Gateway, quote_if_needed,
};
use crate::job::{RestoreJob, RestoreRange};
use crate::rate::RateLimiter;
use crate::{Error, Result, TRACING_TARGET_CLIENT, TRACING_TARGET_CREDENTIALS};

/// Downloads restore slices from object storage using per-job credentials.
///
/// The client is cheap to clone; clones share the credential store, the
/// gateway and the rate limiter. Every operation performs exactly one
/// attempt and never retries on its own.
///
/// # Examples
///
/// ```rust,ignore
/// use sidecar_restore::{StorageClient, StorageClientConfig};
///
/// let client = StorageClient::from_config(&StorageClientConfig::default())?;
/// client.authenticate(&job)?;
/// let outcome = client.download_object_if_absent(&range).await?;
/// println!("staged at {}", outcome.path().display());
/// ```
#[derive(Clone)]
pub struct StorageClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    gateway: Arc<dyn ObjectStorageGateway>,
    rate_limiter: Arc<RateLimiter>,
    credentials: CredentialStore,
    closed: AtomicBool,
}

impl StorageClient {
    /// Creates a client with unlimited download throughput.
    pub fn new(gateway: Arc<dyn ObjectStorageGateway>) -> Self {
        Self::with_rate_limiter(gateway, Arc::new(RateLimiter::unlimited()))
    }

    /// Creates a client sharing `rate_limiter` across all of its downloads.
    pub fn with_rate_limiter(
        gateway: Arc<dyn ObjectStorageGateway>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        let inner = ClientInner {
            gateway,
            rate_limiter,
            credentials: CredentialStore::new(),
            closed: AtomicBool::new(false),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a client backed by an [`S3Gateway`].
    ///
    /// # Errors
    ///
    /// Returns a [`Configuration`](crate::ErrorKind::Configuration) error if
    /// the gateway settings are invalid.
    pub fn from_config(config: &StorageClientConfig) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            download_rate = config.download_rate_bytes_per_sec,
            region = %config.gateway.s3_region,
            "Building storage client from configuration"
        );

        let gateway = S3Gateway::new(config.gateway.clone())?;
        let rate_limiter = RateLimiter::new(config.download_rate_bytes_per_sec);
        Ok(Self::with_rate_limiter(
            Arc::new(gateway),
            Arc::new(rate_limiter),
        ))
    }

    /// Installs or rotates the read credentials of `job`.
    ///
    /// Unchanged credentials keep the existing entry untouched. Safe to call
    /// concurrently for the same job.
    ///
    /// # Errors
    ///
    /// Returns a [`MissingSecrets`](crate::ErrorKind::MissingSecrets) error,
    /// without touching the store, if the job carries no secrets.
    pub fn authenticate(&self, job: &RestoreJob) -> Result<&Self> {
        let candidate = Credentials::from_job(job).inspect_err(|error| {
            tracing::error!(
                target: TRACING_TARGET_CREDENTIALS,
                job_id = %job.job_id,
                error = %error,
                "Cannot authenticate restore job"
            );
        })?;

        let (active, outcome) = self.inner.credentials.upsert(candidate);
        let access_key = active.read_credentials().access_key_masked();
        match outcome {
            Upsert::Installed => tracing::info!(
                target: TRACING_TARGET_CREDENTIALS,
                job_id = %job.job_id,
                access_key = %access_key,
                "Credentials installed"
            ),
            Upsert::Rotated => tracing::info!(
                target: TRACING_TARGET_CREDENTIALS,
                job_id = %job.job_id,
                access_key = %access_key,
                "Credentials rotated"
            ),
            Upsert::Unchanged => tracing::trace!(
                target: TRACING_TARGET_CREDENTIALS,
                job_id = %job.job_id,
                "Credentials unchanged"
            ),
        }

        Ok(self)
    }

    /// Drops the credentials of the job. No-op for unknown jobs.
    ///
    /// Downloads already in flight keep the credentials they captured.
    pub fn revoke_credentials(&self, job_id: Uuid) {
        if self.inner.credentials.remove(&job_id).is_some() {
            tracing::info!(
                target: TRACING_TARGET_CREDENTIALS,
                job_id = %job_id,
                "Credentials revoked"
            );
        }
    }

    /// Applies a job update: revokes on a final status, authenticates otherwise.
    pub fn sync_job(&self, job: &RestoreJob) -> Result<()> {
        if job.status.is_final() {
            self.revoke_credentials(job.job_id);
            return Ok(());
        }

        self.authenticate(job).map(|_| ())
    }

    /// Returns whether the job has active credentials.
    pub fn has_credentials(&self, job_id: Uuid) -> bool {
        self.inner.credentials.contains(&job_id)
    }

    /// Identifiers of all jobs with active credentials.
    pub fn active_jobs(&self) -> Vec<Uuid> {
        self.inner.credentials.job_ids()
    }

    /// Returns the rate limiter shared by all downloads.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.rate_limiter
    }

    /// Returns whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Checks that the slice object exists and matches the slice checksum.
    ///
    /// # Errors
    ///
    /// - [`CredentialsNotFound`](crate::ErrorKind::CredentialsNotFound)
    ///   before any request when the job has no active credentials.
    /// - [`PreconditionFailed`](crate::ErrorKind::PreconditionFailed) when
    ///   the remote ETag differs from the checksum.
    /// - [`NotFound`](crate::ErrorKind::NotFound) when the object is missing.
    #[tracing::instrument(
        name = "client.object_exists",
        skip_all,
        fields(job_id = %range.job_id, slice_id = %range.slice_id)
    )]
    pub async fn object_exists(&self, range: &RestoreRange) -> Result<HeadObjectOutput> {
        let credentials = self.resolve(range)?;
        let request = HeadObjectRequest {
            bucket: range.slice_bucket.clone(),
            key: range.slice_key.clone(),
            if_match: Some(quote_if_needed(&range.slice_checksum)),
            credentials: credentials.provider(),
        };

        self.inner
            .gateway
            .head_object(request)
            .await
            .inspect_err(|error| log_failure("object_exists", range, &credentials, error))
    }

    /// Streams the slice object to its staged path unless a file is already there.
    ///
    /// An existing local file is returned as is, without comparing it to the
    /// remote checksum. Each chunk acquires one rate-limiter permit per byte
    /// before being written.
    ///
    /// # Errors
    ///
    /// - [`CredentialsNotFound`](crate::ErrorKind::CredentialsNotFound)
    ///   before any request when the job has no active credentials.
    /// - [`Network`](crate::ErrorKind::Network) or
    ///   [`Io`](crate::ErrorKind::Io) for transfer failures. A partially
    ///   written file is left in place.
    #[tracing::instrument(
        name = "client.download_object_if_absent",
        skip_all,
        fields(job_id = %range.job_id, slice_id = %range.slice_id)
    )]
    pub async fn download_object_if_absent(&self, range: &RestoreRange) -> Result<DownloadOutcome> {
        let credentials = self.resolve(range)?;

        download::stage_object(
            self.inner.gateway.as_ref(),
            &self.inner.rate_limiter,
            range,
            credentials.provider(),
        )
        .await
        .inspect_err(|error| {
            log_failure("download_object_if_absent", range, &credentials, error)
        })
    }

    /// Releases the gateway and drops all credentials. Idempotent.
    ///
    /// Gateway close failures are logged, not returned.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.credentials.clear();
        match self.inner.gateway.close() {
            Ok(()) => tracing::info!(target: TRACING_TARGET_CLIENT, "Storage client closed"),
            Err(error) => tracing::warn!(
                target: TRACING_TARGET_CLIENT,
                error = %error,
                "Failed to close object storage gateway"
            ),
        }
    }

    /// Fails if the client is closed or the range's job has no credentials.
    fn resolve(&self, range: &RestoreRange) -> Result<Arc<Credentials>> {
        if self.is_closed() {
            return Err(Error::client_closed());
        }

        self.inner.credentials.get(&range.job_id).ok_or_else(|| {
            tracing::warn!(
                target: TRACING_TARGET_CLIENT,
                job_id = %range.job_id,
                slice_key = %range.slice_key,
                "No credentials for restore job"
            );
            Error::credentials_not_found(range.job_id)
        })
    }
}

fn log_failure(operation: &str, range: &RestoreRange, credentials: &Credentials, error: &Error) {
    tracing::error!(
        target: TRACING_TARGET_CLIENT,
        operation,
        job_id = %range.job_id,
        slice_bucket = %range.slice_bucket,
        slice_key = %range.slice_key,
        access_key = %credentials.read_credentials().access_key_masked(),
        retryable = error.is_retryable(),
        error = %error,
        "Restore object request failed"
    );
}

impl fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageClient")
            .field("rate_limiter", &self.inner.rate_limiter)
            .field("active_jobs", &self.inner.credentials.job_ids().len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
