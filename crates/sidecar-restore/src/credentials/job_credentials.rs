//! Credentials derived from a restore job snapshot.

use std::sync::{Arc, OnceLock};

use object_store::StaticCredentialProvider;
use object_store::aws::{AwsCredential, AwsCredentialProvider};
use uuid::Uuid;

use crate::job::{RestoreJob, StorageCredentials};
use crate::{Error, Result};

/// Read credentials of one job plus the provider derived from them.
///
/// The provider is derived once by [`init`](Self::init). Equality only
/// looks at the raw read credentials.
pub(crate) struct Credentials {
    job_id: Uuid,
    read_credentials: StorageCredentials,
    provider: OnceLock<AwsCredentialProvider>,
}

impl Credentials {
    /// Captures the read credentials of `job`.
    ///
    /// Fails with [`ErrorKind::MissingSecrets`](crate::ErrorKind::MissingSecrets)
    /// when the job has not been provisioned with secrets.
    pub fn from_job(job: &RestoreJob) -> Result<Self> {
        let secrets = job
            .secrets
            .as_ref()
            .ok_or_else(|| Error::missing_secrets(job.job_id))?;

        Ok(Self {
            job_id: job.job_id,
            read_credentials: secrets.read_credentials().clone(),
            provider: OnceLock::new(),
        })
    }

    /// Derives the storage provider. Later calls return the same provider.
    pub fn init(&self) -> &AwsCredentialProvider {
        self.provider.get_or_init(|| {
            let credential = AwsCredential {
                key_id: self.read_credentials.access_key_id.clone(),
                secret_key: self.read_credentials.secret_access_key.clone(),
                token: self.read_credentials.session_token.clone(),
            };
            let provider: AwsCredentialProvider = Arc::new(StaticCredentialProvider::new(credential));
            provider
        })
    }

    /// Returns whether [`init`](Self::init) already ran.
    pub fn is_initialized(&self) -> bool {
        self.provider.get().is_some()
    }

    /// Provider for gateway requests.
    pub fn provider(&self) -> AwsCredentialProvider {
        Arc::clone(self.init())
    }

    #[inline]
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    #[inline]
    pub fn read_credentials(&self) -> &StorageCredentials {
        &self.read_credentials
    }

    /// Returns whether both values carry the same raw read credentials.
    pub fn matches(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.read_credentials == other.read_credentials
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for Credentials {}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("job_id", &self.job_id)
            .field("read_credentials", &self.read_credentials)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
