//! Raw object storage credential material.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Access key, secret key and session token issued for a restore job.
///
/// Equality compares the raw material, which is what credential rotation
/// detection relies on. The [`Debug`] output masks everything but a short
/// access key prefix so values can be logged.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCredentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    #[serde(default)]
    pub session_token: Option<String>,
}

impl StorageCredentials {
    /// Creates credentials with a session token.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    /// Creates long-lived credentials without a session token.
    pub fn without_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Returns the session token if available.
    #[inline]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Returns a masked version of the access key for logging.
    ///
    /// This shows only the first 4 characters followed by asterisks.
    pub fn access_key_masked(&self) -> String {
        match self.access_key_id.char_indices().nth(4) {
            Some((end, _)) => format!("{}***", &self.access_key_id[..end]),
            None => "*".repeat(self.access_key_id.chars().count()),
        }
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key_id", &self.access_key_masked())
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}
