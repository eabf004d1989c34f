//! In-flight job bookkeeping.
//!
//! Maps job ids to what cleanup needs: the archive path and the owning app.
//! The registry is the single arbiter of cleanup; whichever caller wins the
//! atomic [`JobRegistry::remove`] performs the physical work.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Bookkeeping for one in-flight publish job.
#[derive(Debug, Clone)]
pub struct RegisteredJob {
    pub job_id: String,
    pub owner_id: i64,
    pub archive_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub simulated: bool,
}

/// Concurrent job table. Constructed by the publisher, never global.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, RegisteredJob>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: RegisteredJob) {
        self.jobs.lock().insert(job.job_id.clone(), job);
    }

    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<RegisteredJob> {
        self.jobs.lock().get(job_id).cloned()
    }

    /// Remove-if-present. Returns the entry exactly once per job id; a
    /// second caller gets `None` and must not perform cleanup.
    #[must_use]
    pub fn remove(&self, job_id: &str) -> Option<RegisteredJob> {
        self.jobs.lock().remove(job_id)
    }

    #[must_use]
    pub fn jobs_for_owner(&self, owner_id: i64) -> Vec<RegisteredJob> {
        let mut jobs: Vec<RegisteredJob> = self
            .jobs
            .lock()
            .values()
            .filter(|job| job.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
