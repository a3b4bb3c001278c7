//! Concurrent job-to-credentials map.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use super::Credentials;

/// Result of [`CredentialStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upsert {
    /// No entry existed; the candidate was installed.
    Installed,
    /// The entry held different material; the candidate replaced it.
    Rotated,
    /// The entry already held the same material and was kept.
    Unchanged,
}

/// Holds the single active [`Credentials`] of every authenticated job.
///
/// Every mutation happens under one write lock so that the
/// check-and-replace of [`upsert`](Self::upsert) is atomic per job.
/// Entries are initialized before they become visible to readers.
#[derive(Debug, Default)]
pub(crate) struct CredentialStore {
    entries: RwLock<HashMap<Uuid, Arc<Credentials>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `candidate` unless the job already holds equal credentials.
    ///
    /// Returns the entry that is active afterwards.
    pub fn upsert(&self, candidate: Credentials) -> (Arc<Credentials>, Upsert) {
        let mut entries = self.write();
        match entries.entry(candidate.job_id()) {
            Entry::Occupied(entry) if entry.get().matches(&candidate) => {
                (Arc::clone(entry.get()), Upsert::Unchanged)
            }
            Entry::Occupied(mut entry) => {
                candidate.init();
                let candidate = Arc::new(candidate);
                entry.insert(Arc::clone(&candidate));
                (candidate, Upsert::Rotated)
            }
            Entry::Vacant(entry) => {
                candidate.init();
                let candidate = Arc::new(candidate);
                entry.insert(Arc::clone(&candidate));
                (candidate, Upsert::Installed)
            }
        }
    }

    /// Returns the active credentials of the job.
    pub fn get(&self, job_id: &Uuid) -> Option<Arc<Credentials>> {
        self.read().get(job_id).cloned()
    }

    /// Removes the job's entry, returning it if present.
    pub fn remove(&self, job_id: &Uuid) -> Option<Arc<Credentials>> {
        self.write().remove(job_id)
    }

    /// Returns whether the job has active credentials.
    pub fn contains(&self, job_id: &Uuid) -> bool {
        self.read().contains_key(job_id)
    }

    /// Identifiers of all jobs with active credentials.
    pub fn job_ids(&self) -> Vec<Uuid> {
        self.read().keys().copied().collect()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<Credentials>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Arc<Credentials>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
