//! In-memory job registry
//!
//! Jobs are kept in a concurrent map for the lifetime of the process so
//! clients can poll status after completion. Mutations run under the map's
//! per-entry lock, so readers always observe either the pre- or post-mutation
//! snapshot, never a torn one. Terminal jobs are frozen: `update` refuses to
//! touch them.

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use super::{Job, JobId};

/// In-memory registry of jobs keyed by ID
pub struct JobStore {
    jobs: DashMap<JobId, Job>,
    /// How long terminal jobs are retained before `sweep` removes them.
    /// `None` disables sweeping.
    retention: Option<Duration>,
}

impl JobStore {
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            jobs: DashMap::new(),
            retention,
        }
    }

    /// Register a new job.
    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    /// Snapshot of a job by ID.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|j| j.clone())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Mutate a job under its entry lock, bumping `updatedAt`.
    ///
    /// Returns `None` when the job does not exist or is already terminal;
    /// terminal jobs never change again.
    pub fn update<T>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> T) -> Option<T> {
        let mut entry = self.jobs.get_mut(id)?;
        if entry.is_terminal() {
            debug!(job_id = %id, "ignoring update to terminal job");
            return None;
        }
        let out = f(&mut entry);
        entry.updated_at = Utc::now();
        Some(out)
    }

    /// Remove a job outright. Used to roll back a registration whose enqueue
    /// was rejected.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.jobs.remove(id).map(|(_, job)| job)
    }

    /// Remove terminal jobs older than the configured retention.
    ///
    /// Called opportunistically on job creation, mirroring how completed jobs
    /// age out rather than running a dedicated timer.
    pub fn sweep(&self) {
        let Some(retention) = self.retention else {
            return;
        };
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        self.jobs.retain(|_, job| {
            !job.is_terminal()
                || job
                    .progress
                    .end_time
                    .map(|t| now - t < retention)
                    .unwrap_or(true)
        });
    }
}
