//! Restore job and slice contracts consumed by the download engine.
//!
//! These are immutable snapshots handed in by the job persistence layer;
//! the engine never mutates them.

mod restore_job;
mod restore_range;
mod storage_credentials;

pub use restore_job::{RestoreJob, RestoreJobSecrets, RestoreJobStatus};
pub use restore_range::RestoreRange;
pub use storage_credentials::StorageCredentials;
