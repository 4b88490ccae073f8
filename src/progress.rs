//! Job progress tracker — keyed store of batch job state for async polling.
//!
//! The job record is the single shared handle between a spawned batch driver
//! and the caller polling it. All mutation goes through the tracker so
//! concurrent item workers cannot interleave into lost updates. Records are
//! held for process lifetime; eviction, if ever needed, is a caller concern.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::batch::types::{ItemOutcome, SkipReason, SkippedItem};
use crate::error::JobError;

/// Lifecycle status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Terminal statuses never regress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// One timestamped, human-readable log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Snapshot of one batch-processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Items to process, fixed once candidates are filtered.
    pub total: usize,
    /// Items finished so far (monotonically increasing).
    pub current: usize,
    /// Item presently in flight (advisory, for display).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub logs: Vec<LogLine>,
    pub results: Vec<ItemOutcome>,
    pub skipped_items: Vec<SkippedItem>,
    /// Terminal-failure message, set only when status is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            total: 0,
            current: 0,
            current_item: None,
            logs: Vec::new(),
            results: Vec::new(),
            skipped_items: Vec::new(),
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Keyed store of job records, safe under concurrent writers.
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
        })
    }

    /// Create a fresh job record with status `processing` and return its id.
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.write().await.insert(id, Job::new(id));
        id
    }

    /// Current snapshot of a job, or `NotFound` for an unknown id.
    pub async fn snapshot(&self, id: Uuid) -> Result<Job, JobError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound { id })
    }

    /// Append a timestamped log line.
    pub async fn log(&self, id: Uuid, message: impl Into<String>) {
        self.with_job(id, |job| {
            job.logs.push(LogLine {
                at: Utc::now(),
                message: message.into(),
            });
        })
        .await;
    }

    /// Fix the to-process count once candidates are known.
    pub async fn set_total(&self, id: Uuid, total: usize) {
        self.with_job(id, |job| job.total = total).await;
    }

    /// Mark which item is presently in flight.
    pub async fn start_item(&self, id: Uuid, item_id: &str) {
        let item_id = item_id.to_string();
        self.with_job(id, |job| job.current_item = Some(item_id)).await;
    }

    /// Record one per-item outcome and advance the progress counter.
    pub async fn record_outcome(&self, id: Uuid, outcome: ItemOutcome) {
        self.with_job(id, |job| {
            if job.current_item.as_deref() == Some(outcome.item_id.as_str()) {
                job.current_item = None;
            }
            job.results.push(outcome);
            job.current += 1;
        })
        .await;
    }

    /// Record an item excluded before processing.
    pub async fn record_skipped(&self, id: Uuid, item_id: &str, reason: SkipReason) {
        let item_id = item_id.to_string();
        self.with_job(id, |job| {
            job.skipped_items.push(SkippedItem { item_id, reason });
        })
        .await;
    }

    /// Transition to a terminal status. A job finalizes exactly once: once
    /// terminal, later finalize calls are ignored (logs and results may
    /// still be appended afterwards).
    pub async fn finalize(&self, id: Uuid, status: JobStatus, error: Option<String>) {
        self.with_job(id, |job| {
            if job.status.is_terminal() {
                warn!(job_id = %id, current = ?job.status, attempted = ?status,
                    "Ignoring finalize on already-terminal job");
                return;
            }
            job.status = status;
            job.error = error;
            job.current_item = None;
        })
        .await;
    }

    async fn with_job(&self, id: Uuid, mutate: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => mutate(job),
            // Jobs are never deleted, so a miss here is a caller bug.
            None => warn!(job_id = %id, "Write to unknown job ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::types::OutcomeStatus;

    fn outcome(item_id: &str) -> ItemOutcome {
        ItemOutcome {
            item_id: item_id.into(),
            sender: "borrower@example.com".into(),
            status: OutcomeStatus::GeneratedOnly,
            reply: Some("Thank you for reaching out.".into()),
            reply_id: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn create_and_snapshot() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;

        let job = tracker.snapshot(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.total, 0);
        assert_eq!(job.current, 0);
        assert!(job.logs.is_empty());
        assert!(job.results.is_empty());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let tracker = JobTracker::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            tracker.snapshot(missing).await,
            Err(JobError::NotFound { id }) if id == missing
        ));
    }

    #[tokio::test]
    async fn outcomes_advance_current() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;
        tracker.set_total(id, 2).await;

        tracker.start_item(id, "email-1").await;
        assert_eq!(
            tracker.snapshot(id).await.unwrap().current_item.as_deref(),
            Some("email-1")
        );

        tracker.record_outcome(id, outcome("email-1")).await;
        tracker.record_outcome(id, outcome("email-2")).await;

        let job = tracker.snapshot(id).await.unwrap();
        assert_eq!(job.current, 2);
        assert_eq!(job.results.len(), 2);
        assert!(job.current_item.is_none());
    }

    #[tokio::test]
    async fn finalize_is_sticky() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;

        tracker.finalize(id, JobStatus::Completed, None).await;
        tracker
            .finalize(id, JobStatus::Error, Some("late failure".into()))
            .await;

        let job = tracker.snapshot(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn logs_allowed_after_finalize() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;

        tracker.finalize(id, JobStatus::Completed, None).await;
        tracker.log(id, "final summary").await;

        let job = tracker.snapshot(id).await.unwrap();
        assert_eq!(job.logs.len(), 1);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_writers_lose_no_updates() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;
        tracker.set_total(id, 50).await;

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    tracker.record_outcome(id, outcome(&format!("email-{i}"))).await;
                    tracker.log(id, format!("processed email-{i}")).await;
                })
            })
            .collect();
        futures::future::join_all(tasks).await;

        let job = tracker.snapshot(id).await.unwrap();
        assert_eq!(job.current, 50);
        assert_eq!(job.results.len(), 50);
        assert_eq!(job.logs.len(), 50);
    }
}
