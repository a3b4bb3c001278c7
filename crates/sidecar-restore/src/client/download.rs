//! Streaming a remote object into its staged path.

use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::Instant;

use futures::StreamExt;
use object_store::aws::AwsCredentialProvider;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{DownloadOutcome, SkipReason};
use crate::gateway::{ByteStream, GetObjectRequest, ObjectStorageGateway};
use crate::job::RestoreRange;
use crate::rate::RateLimiter;
use crate::{Result, TRACING_TARGET_DOWNLOAD};

/// Stages the object of `range` unless a local file is already in place.
///
/// The partial file is kept when the body stream fails mid-transfer. An
/// empty file is removed when the request fails before any byte arrives.
pub(crate) async fn stage_object(
    gateway: &dyn ObjectStorageGateway,
    rate_limiter: &RateLimiter,
    range: &RestoreRange,
    credentials: AwsCredentialProvider,
) -> Result<DownloadOutcome> {
    let path = range.staged_object_path();

    // Local content is trusted as is; it is never compared with the remote checksum.
    if fs::try_exists(path).await? {
        tracing::debug!(
            target: TRACING_TARGET_DOWNLOAD,
            job_id = %range.job_id,
            path = %path.display(),
            "Object already staged, skipping download"
        );
        return Ok(skipped(path, SkipReason::AlreadyStaged));
    }

    download_absent(gateway, rate_limiter, range, credentials).await
}

/// Downloads into a staged path that was absent when last checked.
///
/// A file created by another writer since that check makes this a
/// `CreatedConcurrently` skip without any request to the gateway.
async fn download_absent(
    gateway: &dyn ObjectStorageGateway,
    rate_limiter: &RateLimiter,
    range: &RestoreRange,
    credentials: AwsCredentialProvider,
) -> Result<DownloadOutcome> {
    let path = range.staged_object_path();
    ensure_parent_dir(path).await;

    let Some(mut file) = create_exclusive(path).await? else {
        tracing::debug!(
            target: TRACING_TARGET_DOWNLOAD,
            job_id = %range.job_id,
            path = %path.display(),
            "Object staged concurrently, skipping download"
        );
        return Ok(skipped(path, SkipReason::CreatedConcurrently));
    };

    let request = GetObjectRequest {
        bucket: range.slice_bucket.clone(),
        key: range.slice_key.clone(),
        credentials,
    };

    let body = match gateway.get_object(request).await {
        Ok(body) => body,
        Err(error) => {
            drop(file);
            if let Err(remove_error) = fs::remove_file(path).await {
                tracing::warn!(
                    target: TRACING_TARGET_DOWNLOAD,
                    path = %path.display(),
                    error = %remove_error,
                    "Failed to remove empty staged file"
                );
            }
            return Err(error);
        }
    };

    let started = Instant::now();
    let written = write_rate_limited(&mut file, body, rate_limiter).await;

    if let Err(error) = file.shutdown().await {
        tracing::warn!(
            target: TRACING_TARGET_DOWNLOAD,
            path = %path.display(),
            error = %error,
            "Failed to close staged file"
        );
    }

    let bytes = written?;
    tracing::debug!(
        target: TRACING_TARGET_DOWNLOAD,
        job_id = %range.job_id,
        slice_id = %range.slice_id,
        bytes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Object staged"
    );

    Ok(DownloadOutcome::Downloaded {
        path: path.to_path_buf(),
        bytes,
    })
}

/// Copies `body` into `writer`, acquiring one permit per byte before each chunk.
///
/// Chunks are written in the order received. Returns the number of bytes
/// written; on failure everything before the failing chunk stays written.
pub(crate) async fn write_rate_limited<W>(
    writer: &mut W,
    mut body: ByteStream,
    rate_limiter: &RateLimiter,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        rate_limiter.acquire(chunk.len()).await;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}

/// Opens `path` for exclusive creation. `None` if the file already exists.
pub(crate) async fn create_exclusive(path: &Path) -> Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => Ok(Some(file)),
        Err(error) if error.kind() == IoErrorKind::AlreadyExists => Ok(None),
        Err(error) => Err(error.into()),
    }
}

async fn ensure_parent_dir(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };

    if let Err(error) = fs::create_dir_all(parent).await {
        tracing::warn!(
            target: TRACING_TARGET_DOWNLOAD,
            dir = %parent.display(),
            error = %error,
            "Failed to create staging directory"
        );
    }
}

fn skipped(path: &Path, reason: SkipReason) -> DownloadOutcome {
    DownloadOutcome::Skipped {
        path: path.to_path_buf(),
        reason,
    }
}
