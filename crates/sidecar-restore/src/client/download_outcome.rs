//! Result of a staging attempt.

use std::path::{Path, PathBuf};

use strum::{AsRefStr, Display, IntoStaticStr};

/// Why a download was not performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// The staged path already existed before the attempt started.
    AlreadyStaged,
    /// Another writer created the staged path during the attempt.
    CreatedConcurrently,
}

/// Successful outcome of
/// [`StorageClient::download_object_if_absent`](crate::StorageClient::download_object_if_absent).
///
/// Failures are reported through the `Err` arm of the returned result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A local file was already in place; the gateway was not asked for the body.
    Skipped {
        /// Staged file that was left untouched.
        path: PathBuf,
        /// Which check found the file.
        reason: SkipReason,
    },
    /// The object body was streamed to disk.
    Downloaded {
        /// Staged file holding the object body.
        path: PathBuf,
        /// Number of bytes written.
        bytes: u64,
    },
}

impl DownloadOutcome {
    /// Local file holding the object in both arms.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Skipped { path, .. } | Self::Downloaded { path, .. } => path,
        }
    }

    /// Consumes the outcome, returning the local file.
    #[must_use]
    pub fn into_path(self) -> PathBuf {
        match self {
            Self::Skipped { path, .. } | Self::Downloaded { path, .. } => path,
        }
    }

    /// Bytes written by this attempt. Zero when skipped.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Skipped { .. } => 0,
            Self::Downloaded { bytes, .. } => *bytes,
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns the skip reason, if the download was skipped.
    #[must_use]
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason, .. } => Some(*reason),
            Self::Downloaded { .. } => None,
        }
    }
}
