//! Registry of in-flight generation jobs.

use crate::types::{GraphId, JobId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of a running job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveJob {
    pub job_id: JobId,
    pub graph_id: GraphId,
    pub selected_count: usize,
    pub started_at: DateTime<Utc>,
}

/// Tracks jobs between launch and their terminal state
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, ActiveJob>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a job; it stays listed until the returned registration drops
    pub fn register(self: &Arc<Self>, job: ActiveJob) -> JobRegistration {
        let job_id = job.job_id;
        self.jobs.lock().insert(job_id, job);
        JobRegistration {
            registry: Arc::clone(self),
            job_id,
        }
    }

    /// Running jobs, oldest first
    pub fn active_jobs(&self) -> Vec<ActiveJob> {
        let mut jobs: Vec<ActiveJob> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by_key(|job| job.job_id);
        jobs
    }

    pub fn is_active(&self, job_id: JobId) -> bool {
        self.jobs.lock().contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    fn remove(&self, job_id: JobId) {
        self.jobs.lock().remove(&job_id);
    }
}

/// Keeps a job listed in its registry while alive
#[must_use = "dropping the registration immediately unlists the job"]
#[derive(Debug)]
pub struct JobRegistration {
    registry: Arc<JobRegistry>,
    job_id: JobId,
}

impl JobRegistration {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl Drop for JobRegistration {
    fn drop(&mut self) {
        self.registry.remove(self.job_id);
    }
}
