//! Keyed job record store.
//!
//! `JobStore` holds the latest known state of every job streamed during the
//! session. Writes are last-writer-wins by `id`; records are never removed
//! individually, only all at once when the session is torn down.
//!
//! # Thread Safety
//!
//! The map sits behind `Arc<RwLock<>>`; clones share the same records, so the
//! update stream can write while page code reads.

use crate::types::JobUpdate;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe registry of job updates keyed by job id.
///
/// # Examples
///
/// ```ignore
/// use resilient_client::JobStore;
///
/// let store = JobStore::new();
/// store.upsert(update);
/// let newest_first = store.sorted_by_recency();
/// ```
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, JobUpdate>>>,
}

impl JobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a record, returning the one it replaced.
    pub fn upsert(&self, update: JobUpdate) -> Option<JobUpdate> {
        self.jobs.write().insert(update.id.clone(), update)
    }

    /// Look up a job by id.
    pub fn get(&self, id: &str) -> Option<JobUpdate> {
        self.jobs.read().get(id).cloned()
    }

    /// Number of jobs known.
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Whether no job has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// All jobs, most recently updated first.
    pub fn sorted_by_recency(&self) -> Vec<JobUpdate> {
        let mut jobs: Vec<JobUpdate> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Number of jobs still pending or running.
    pub fn active_count(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|job| job.status.is_active())
            .count()
    }

    /// Drop every record. Called at session teardown.
    pub fn clear(&self) {
        self.jobs.write().clear();
    }
}
