//! Integration tests for the storage client.
//!
//! These tests drive the client against the in-memory gateway and a
//! temporary staging directory, without requiring S3 access.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sidecar_restore::mock::{GatewayCall, MockFailure, MockGateway};
use sidecar_restore::prelude::*;
use tempfile::TempDir;
use uuid::Uuid;

const BUCKET: &str = "restore-bucket";

fn job(job_id: Uuid, access_key: &str, token: &str) -> RestoreJob {
    let read = StorageCredentials::new(access_key, "secret", token);
    let write = StorageCredentials::new("AKIAWRITE", "write-secret", token);
    RestoreJob::new(job_id).with_secrets(RestoreJobSecrets::new(read, write))
}

fn range(job_id: Uuid, slice_id: &str, key: &str, staging: &Path) -> RestoreRange {
    RestoreRange::new(job_id, slice_id, BUCKET, key, "abc123", staging).unwrap()
}

struct Fixture {
    gateway: Arc<MockGateway>,
    client: StorageClient,
    staging: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self::with_limiter(RateLimiter::unlimited(), 1024)
    }

    fn with_limiter(rate_limiter: RateLimiter, chunk_size: usize) -> Self {
        let gateway = Arc::new(MockGateway::new().with_chunk_size(chunk_size));
        let client = StorageClient::with_rate_limiter(gateway.clone(), Arc::new(rate_limiter));
        Self {
            gateway,
            client,
            staging: tempfile::tempdir().unwrap(),
        }
    }

    fn staging(&self) -> &Path {
        self.staging.path()
    }
}

#[tokio::test]
async fn test_stage_then_revoke_scenario() {
    let fx = Fixture::new();
    let j1 = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "sstable-bytes");
    fx.client.authenticate(&job(j1, "AKIAREAD", "tok")).unwrap();

    let r1 = range(j1, "R1", "k", fx.staging())
        .with_staged_object_path(fx.staging().join("J1").join("R1.zip"));

    let head = fx.client.object_exists(&r1).await.unwrap();
    assert_eq!(head.size, 13);

    let outcome = fx.client.download_object_if_absent(&r1).await.unwrap();
    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            path: fx.staging().join("J1").join("R1.zip"),
            bytes: 13,
        }
    );
    assert_eq!(std::fs::read(outcome.path()).unwrap(), b"sstable-bytes");

    let calls = fx.gateway.calls();
    assert_eq!(
        calls[0],
        GatewayCall::Head {
            bucket: BUCKET.to_string(),
            key: "k".to_string(),
            if_match: Some("\"abc123\"".to_string()),
            access_key_id: "AKIAREAD".to_string(),
            session_token: Some("tok".to_string()),
        }
    );
    assert!(matches!(calls[1], GatewayCall::Get { .. }));

    fx.client.revoke_credentials(j1);

    let r2 = range(j1, "R2", "k", fx.staging());
    let err = fx.client.download_object_if_absent(&r2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CredentialsNotFound);
    assert_eq!(fx.gateway.calls().len(), 2);
}

#[tokio::test]
async fn test_authenticate_twice_keeps_single_entry() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    let snapshot = job(job_id, "AKIAREAD", "tok");

    fx.client.authenticate(&snapshot).unwrap();
    fx.client.authenticate(&snapshot).unwrap();

    assert_eq!(fx.client.active_jobs(), vec![job_id]);
}

#[tokio::test]
async fn test_rotation_applies_to_later_downloads() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "ks/tbl/a.zip", "abc123", "a");
    fx.gateway.put_object(BUCKET, "ks/tbl/b.zip", "abc123", "b");

    fx.client.authenticate(&job(job_id, "AKIAFIRST", "tok1")).unwrap();
    fx.client
        .download_object_if_absent(&range(job_id, "a", "ks/tbl/a.zip", fx.staging()))
        .await
        .unwrap();

    fx.client.authenticate(&job(job_id, "AKIASECOND", "tok2")).unwrap();
    fx.client
        .download_object_if_absent(&range(job_id, "b", "ks/tbl/b.zip", fx.staging()))
        .await
        .unwrap();

    let calls = fx.gateway.calls();
    assert_eq!(calls[0].access_key_id(), "AKIAFIRST");
    assert_eq!(calls[1].access_key_id(), "AKIASECOND");
    assert_eq!(calls[1].session_token(), Some("tok2"));
}

#[tokio::test]
async fn test_revoked_job_fails_without_network_call() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "data");
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();
    fx.client.revoke_credentials(job_id);
    fx.client.revoke_credentials(job_id);

    let slice = range(job_id, "s1", "k", fx.staging());
    let exists = fx.client.object_exists(&slice).await.unwrap_err();
    let download = fx.client.download_object_if_absent(&slice).await.unwrap_err();

    assert_eq!(exists.kind(), ErrorKind::CredentialsNotFound);
    assert_eq!(download.kind(), ErrorKind::CredentialsNotFound);
    assert!(!download.is_retryable());
    assert!(fx.gateway.calls().is_empty());
    assert!(!slice.staged_object_path().exists());
}

#[tokio::test]
async fn test_never_authenticated_job_fails() {
    let fx = Fixture::new();
    let slice = range(Uuid::now_v7(), "s1", "k", fx.staging());

    let err = fx.client.download_object_if_absent(&slice).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CredentialsNotFound);
    assert!(err.to_string().contains(&slice.job_id.to_string()));
}

#[tokio::test]
async fn test_existing_staged_file_skips_download() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "remote");
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let slice = range(job_id, "s1", "k", fx.staging());
    let first = fx.client.download_object_if_absent(&slice).await.unwrap();
    let second = fx.client.download_object_if_absent(&slice).await.unwrap();

    assert!(!first.is_skipped());
    assert_eq!(second.skip_reason(), Some(SkipReason::AlreadyStaged));
    assert_eq!(second.path(), first.path());
    assert_eq!(fx.gateway.get_count(), 1);
}

/// A staged file is trusted by name; its content is never compared with
/// the remote object.
#[tokio::test]
async fn test_staged_file_is_not_reverified_against_remote() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "remote-content");
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let slice = range(job_id, "s1", "k", fx.staging());
    let path = slice.staged_object_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "stale-local").unwrap();

    let outcome = fx.client.download_object_if_absent(&slice).await.unwrap();

    assert_eq!(outcome.skip_reason(), Some(SkipReason::AlreadyStaged));
    assert_eq!(std::fs::read(path).unwrap(), b"stale-local");
    assert!(fx.gateway.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_downloads_of_same_slice_write_once() {
    let fx = Fixture::with_limiter(RateLimiter::unlimited(), 16);
    let job_id = Uuid::now_v7();
    let body = vec![7u8; 4096];
    fx.gateway.put_object(BUCKET, "k", "abc123", body.clone());
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let slice = range(job_id, "s1", "k", fx.staging());
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = fx.client.clone();
            let slice = slice.clone();
            tokio::spawn(async move { client.download_object_if_absent(&slice).await })
        })
        .collect();

    let mut downloaded = 0;
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        if !outcome.is_skipped() {
            downloaded += 1;
        }
    }

    assert_eq!(downloaded, 1);
    assert_eq!(fx.gateway.get_count(), 1);
    assert_eq!(std::fs::read(slice.staged_object_path()).unwrap(), body);
}

async fn timed_download(rate: i64, size: usize, chunk_size: usize) -> (u64, Duration) {
    let fx = Fixture::with_limiter(RateLimiter::new(rate), chunk_size);
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", vec![1u8; size]);
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let start = Instant::now();
    let outcome = fx
        .client
        .download_object_if_absent(&range(job_id, "s1", "k", fx.staging()))
        .await
        .unwrap();
    (outcome.bytes(), start.elapsed())
}

#[tokio::test]
async fn test_download_of_one_second_worth_is_throttled() {
    let (bytes, elapsed) = timed_download(1000, 1000, 100).await;

    assert_eq!(bytes, 1000);
    assert!(elapsed >= Duration::from_millis(950), "took {elapsed:?}");
}

#[tokio::test]
async fn test_download_respects_rate_limit() {
    let (bytes, elapsed) = timed_download(1000, 3000, 256).await;

    assert_eq!(bytes, 3000);
    assert!(elapsed >= Duration::from_millis(2950), "took {elapsed:?}");
}

#[tokio::test]
async fn test_rate_limit_is_shared_across_jobs() {
    let fx = Fixture::with_limiter(RateLimiter::new(1000), 250);
    let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
    fx.gateway.put_object(BUCKET, "a", "abc123", vec![0u8; 1000]);
    fx.gateway.put_object(BUCKET, "b", "abc123", vec![0u8; 1000]);
    fx.client.authenticate(&job(a, "AKIAAAAA", "tok")).unwrap();
    fx.client.authenticate(&job(b, "AKIABBBB", "tok")).unwrap();

    let ra = range(a, "s1", "a", fx.staging());
    let rb = range(b, "s1", "b", fx.staging());

    let start = Instant::now();
    let (first, second) = tokio::join!(
        fx.client.download_object_if_absent(&ra),
        fx.client.download_object_if_absent(&rb),
    );
    first.unwrap();
    second.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(1950));
}

#[tokio::test]
async fn test_missing_secrets_is_fatal() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();

    let err = fx.client.authenticate(&RestoreJob::new(job_id)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingSecrets);
    assert!(err.is_fatal());
    assert!(!fx.client.has_credentials(job_id));
}

#[tokio::test]
async fn test_request_failure_removes_empty_file() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "data");
    fx.gateway.fail_key("k", MockFailure::Request(ErrorKind::Network));
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let slice = range(job_id, "s1", "k", fx.staging());
    let err = fx.client.download_object_if_absent(&slice).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.is_retryable());
    assert!(!slice.staged_object_path().exists());
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let slice = range(job_id, "s1", "missing", fx.staging());
    let exists = fx.client.object_exists(&slice).await.unwrap_err();
    let download = fx.client.download_object_if_absent(&slice).await.unwrap_err();

    assert_eq!(exists.kind(), ErrorKind::NotFound);
    assert_eq!(download.kind(), ErrorKind::NotFound);
    assert!(!slice.staged_object_path().exists());
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_partial_file() {
    let fx = Fixture::with_limiter(RateLimiter::unlimited(), 4);
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "0123456789");
    fx.gateway
        .fail_key("k", MockFailure::MidStream { after_chunks: 2 });
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let slice = range(job_id, "s1", "k", fx.staging());
    let err = fx.client.download_object_if_absent(&slice).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(std::fs::read(slice.staged_object_path()).unwrap(), b"01234567");
}

#[tokio::test]
async fn test_checksum_mismatch_fails_precondition() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "other-etag", "data");
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let err = fx
        .client
        .object_exists(&range(job_id, "s1", "k", fx.staging()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_quoted_checksum_is_sent_as_is() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "data");
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let mut slice = range(job_id, "s1", "k", fx.staging());
    slice.slice_checksum = "\"abc123\"".to_string();
    fx.client.object_exists(&slice).await.unwrap();

    let GatewayCall::Head { if_match, .. } = &fx.gateway.calls()[0] else {
        panic!("expected a HEAD request");
    };
    assert_eq!(if_match.as_deref(), Some("\"abc123\""));
}

#[tokio::test]
async fn test_nested_staging_directories_are_created() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "data");
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    let slice = range(job_id, "s1", "k", fx.staging())
        .with_staged_object_path(fx.staging().join("a").join("b").join("c").join("s1.zip"));
    let outcome = fx.client.download_object_if_absent(&slice).await.unwrap();

    assert_eq!(outcome.bytes(), 4);
    assert!(slice.staged_object_path().is_file());
}

#[tokio::test]
async fn test_closed_client_rejects_requests() {
    let fx = Fixture::new();
    let job_id = Uuid::now_v7();
    fx.gateway.put_object(BUCKET, "k", "abc123", "data");
    fx.client.authenticate(&job(job_id, "AKIAREAD", "tok")).unwrap();

    fx.client.close();
    fx.client.close();

    let slice = range(job_id, "s1", "k", fx.staging());
    let err = fx.client.download_object_if_absent(&slice).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClientClosed);
    assert!(fx.gateway.is_closed());
    assert!(fx.gateway.calls().is_empty());
}
