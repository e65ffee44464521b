//! In-memory job table.
//!
//! The store is the only state shared between jobs. Every mutation takes the
//! write lock once and does its check and its change under it, so readers see
//! either the old record or the new one.

use crate::job::{JobId, JobRecord, JobStatus};
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition { job_id: JobId, from: JobStatus, to: JobStatus },

    #[error("configuration already set for job {0}")]
    ConfigAlreadySet(JobId),

    #[error("job {0} is already being launched")]
    LaunchInProgress(JobId),
}

#[derive(Default)]
struct Table {
    records: HashMap<JobId, JobRecord>,
    /// Jobs claimed by [`JobStore::claim_launch`] and still in `generating`.
    launching: HashSet<JobId>,
}

/// Cloneable handle to the job table.
#[derive(Clone, Default)]
pub struct JobStore {
    table: Arc<RwLock<Table>>,
}

impl fmt::Debug for JobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStore")
            .field("job_count", &self.table.try_read().map(|t| t.records.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl JobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing any record with the same id.
    pub async fn upsert(&self, record: JobRecord) {
        let mut table = self.table.write().await;
        table.records.insert(record.job_id.clone(), record);
    }

    /// Snapshot of one record.
    pub async fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.table.read().await.records.get(job_id).cloned()
    }

    /// Snapshot of every record, in no particular order.
    pub async fn list(&self) -> Vec<JobRecord> {
        self.table.read().await.records.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.records.is_empty()
    }

    /// Moves a job to `to`, bumping `updated_at` in the same write.
    pub async fn transition(&self, job_id: &JobId, to: JobStatus) -> Result<JobRecord, StoreError> {
        self.transition_with(job_id, to, |_| {}).await
    }

    /// Moves a job to `error` with `detail` as its error.
    pub async fn fail(&self, job_id: &JobId, detail: impl Into<String>) -> Result<JobRecord, StoreError> {
        let detail = detail.into();
        self.transition_with(job_id, JobStatus::Error, move |record| record.error = Some(detail))
            .await
    }

    /// Moves a job to `to` and applies `apply` to the record as part of the
    /// same update. Nothing is changed when the transition is rejected.
    pub async fn transition_with<F>(&self, job_id: &JobId, to: JobStatus, apply: F) -> Result<JobRecord, StoreError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut table = self.table.write().await;
        let record = table.records.get_mut(job_id).ok_or_else(|| StoreError::NotFound(job_id.clone()))?;

        let from = record.status;
        if !from.can_transition_to(to) {
            error!(job_id = %job_id, from = %from, to = %to, "Invalid job state transition");
            return Err(StoreError::InvalidTransition { job_id: job_id.clone(), from, to });
        }

        apply(record);
        record.status = to;
        record.updated_at = Utc::now().max(record.updated_at);
        debug!(job_id = %job_id, from = %from, to = %to, "Job state transition");
        let record = record.clone();
        table.launching.remove(job_id);
        Ok(record)
    }

    /// Reserves a `generating` job for one launch attempt.
    ///
    /// The claim is released by the job's next transition. A job that is not
    /// in `generating`, or is already claimed, is rejected.
    pub async fn claim_launch(&self, job_id: &JobId) -> Result<JobRecord, StoreError> {
        let mut table = self.table.write().await;
        let record = table.records.get(job_id).ok_or_else(|| StoreError::NotFound(job_id.clone()))?;
        if record.status != JobStatus::Generating {
            return Err(StoreError::InvalidTransition { job_id: job_id.clone(), from: record.status, to: JobStatus::Running });
        }
        let record = record.clone();
        if !table.launching.insert(job_id.clone()) {
            return Err(StoreError::LaunchInProgress(job_id.clone()));
        }
        Ok(record)
    }

    /// Attaches the parsed configuration. A configuration is set at most once.
    pub async fn set_config(&self, job_id: &JobId, config: Value) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let record = table.records.get_mut(job_id).ok_or_else(|| StoreError::NotFound(job_id.clone()))?;
        if record.config.is_some() {
            return Err(StoreError::ConfigAlreadySet(job_id.clone()));
        }
        record.config = Some(config);
        Ok(())
    }
}
