//! Restore range (slice) snapshot.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// File name used when the slice key has no usable final segment.
const DEFAULT_OBJECT_FILE_NAME: &str = "object";

/// The unit of download: one remote object of a restore job.
///
/// Credentials are looked up by `job_id` at call time, never captured
/// here, so downloads always observe the latest rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRange {
    /// Job this slice belongs to.
    pub job_id: Uuid,
    /// Slice identifier, unique within the job.
    pub slice_id: String,
    /// Bucket holding the slice object.
    pub slice_bucket: String,
    /// Key of the slice object.
    pub slice_key: String,
    /// Remote integrity tag (ETag) of the slice object.
    pub slice_checksum: String,
    /// Local destination of the downloaded object.
    pub staged_object_path: PathBuf,
}

impl RestoreRange {
    /// Creates a range staged under `staging_root`.
    ///
    /// The staged path is `<staging_root>/<job_id>/<slice_id>/<file name>`,
    /// where the file name is the last segment of `slice_key`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidRange`](crate::ErrorKind::InvalidRange) error if
    /// `slice_id` is empty, `.`, `..` or contains a path separator, since it
    /// would escape the job's staging directory.
    pub fn new(
        job_id: Uuid,
        slice_id: impl Into<String>,
        slice_bucket: impl Into<String>,
        slice_key: impl Into<String>,
        slice_checksum: impl Into<String>,
        staging_root: impl AsRef<Path>,
    ) -> Result<Self> {
        let slice_id = slice_id.into();
        if !is_plain_segment(&slice_id) {
            return Err(Error::invalid_slice_id(&slice_id));
        }

        let slice_key = slice_key.into();
        let staged_object_path = Self::staged_path(staging_root.as_ref(), job_id, &slice_id, &slice_key);

        Ok(Self {
            job_id,
            slice_id,
            slice_bucket: slice_bucket.into(),
            slice_key,
            slice_checksum: slice_checksum.into(),
            staged_object_path,
        })
    }

    /// Overrides the staged object path.
    #[must_use]
    pub fn with_staged_object_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.staged_object_path = path.into();
        self
    }

    /// Returns the local destination of the slice object.
    #[inline]
    pub fn staged_object_path(&self) -> &Path {
        &self.staged_object_path
    }

    fn staged_path(staging_root: &Path, job_id: Uuid, slice_id: &str, slice_key: &str) -> PathBuf {
        let file_name = slice_key
            .rsplit('/')
            .find(|segment| is_plain_segment(segment))
            .unwrap_or(DEFAULT_OBJECT_FILE_NAME);

        staging_root
            .join(job_id.to_string())
            .join(slice_id)
            .join(file_name)
    }
}

/// Non-empty, not `.` or `..`, and free of separators and NUL.
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}
