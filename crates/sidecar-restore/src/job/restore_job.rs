//! Restore job snapshot.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::StorageCredentials;

/// Lifecycle state of a restore job, owned by the job manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreJobStatus {
    /// Job created, slices may still be added.
    #[default]
    Created,
    /// All slices are staged on the instances.
    Staged,
    /// Job completed successfully.
    Succeeded,
    /// Job failed.
    Failed,
    /// Job was aborted by the user.
    Aborted,
}

impl RestoreJobStatus {
    /// Returns whether the job reached a terminal state.
    ///
    /// Credentials of a job in a terminal state must be revoked.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// Secrets attached to a restore job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreJobSecrets {
    read_credentials: StorageCredentials,
    write_credentials: StorageCredentials,
}

impl RestoreJobSecrets {
    /// Creates job secrets from read and write credentials.
    pub fn new(read_credentials: StorageCredentials, write_credentials: StorageCredentials) -> Self {
        Self {
            read_credentials,
            write_credentials,
        }
    }

    /// Credentials used to download slices.
    #[inline]
    pub fn read_credentials(&self) -> &StorageCredentials {
        &self.read_credentials
    }

    /// Credentials used by the bulk writer that uploaded the slices.
    #[inline]
    pub fn write_credentials(&self) -> &StorageCredentials {
        &self.write_credentials
    }
}

/// One logical restore operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreJob {
    /// Unique, immutable job identifier.
    pub job_id: Uuid,
    /// Credential material, absent until provisioned.
    #[serde(default)]
    pub secrets: Option<RestoreJobSecrets>,
    /// Current lifecycle state.
    #[serde(default)]
    pub status: RestoreJobStatus,
}

impl RestoreJob {
    /// Creates a job in the `Created` state without secrets.
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            secrets: None,
            status: RestoreJobStatus::Created,
        }
    }

    /// Attaches secrets to the job.
    #[must_use]
    pub fn with_secrets(mut self, secrets: RestoreJobSecrets) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Sets the lifecycle state.
    #[must_use]
    pub fn with_status(mut self, status: RestoreJobStatus) -> Self {
        self.status = status;
        self
    }
}
