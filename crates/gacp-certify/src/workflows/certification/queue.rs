use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::clock::Clock;
use super::domain::{ApplicationId, StaffId};
use super::errors::WorkflowError;
use super::notifications::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{:06}", self.0)
    }
}

/// Background condition that advances an application without a direct caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoTrigger {
    BeginReview,
    OpenReplacementPayment,
    AdvanceToPhase2Payment,
}

impl AutoTrigger {
    pub const fn label(self) -> &'static str {
        match self {
            AutoTrigger::BeginReview => "begin_review",
            AutoTrigger::OpenReplacementPayment => "open_replacement_payment",
            AutoTrigger::AdvanceToPhase2Payment => "advance_to_phase2_payment",
        }
    }
}

/// Work the engine defers to the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Notification(Notification),
    GenerateCertificate {
        application_id: ApplicationId,
        approver: StaffId,
        certificate_number: String,
        year: i32,
        sequence: u32,
    },
    BlockCalendar {
        application_id: ApplicationId,
        auditor: StaffId,
        starts_at: DateTime<Utc>,
        hours: u32,
    },
    AutoTransition {
        application_id: ApplicationId,
        trigger: AutoTrigger,
    },
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::Notification(_) => "notification",
            JobPayload::GenerateCertificate { .. } => "certificate_generation",
            JobPayload::BlockCalendar { .. } => "calendar_block",
            JobPayload::AutoTransition { .. } => "auto_transition",
        }
    }
}

/// Submission options. Lower `priority` values run first among equally due jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: u8,
    pub delay: Duration,
    pub dedup_key: Option<String>,
}

impl JobOptions {
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn deduplicated(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Deferred,
    Inline,
}

/// Acknowledgement returned to the caller of `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub kind: &'static str,
    pub state: JobState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Executes job payloads; implemented by the engine.
pub trait JobWorker {
    fn run(&self, payload: &JobPayload) -> Result<(), WorkflowError>;
}

/// Deferred execution collaborator.
pub trait TaskQueue: Send + Sync {
    /// Accept a job. Deferred queues ignore `worker`; inline queues run it before returning.
    fn submit(
        &self,
        payload: JobPayload,
        options: JobOptions,
        worker: &dyn JobWorker,
    ) -> Result<JobHandle, QueueError>;

    fn status(&self, job_id: JobId) -> Result<Option<JobStatus>, QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task queue unavailable: {0}")]
    Unavailable(String),
}

const MAX_BACKOFF_MS: u64 = 24 * 3_600 * 1_000;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let millis = self
            .base_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(MAX_BACKOFF_MS);
        Duration::milliseconds(millis as i64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedJob {
    id: JobId,
    payload: JobPayload,
    priority: u8,
    dedup_key: Option<String>,
    due_at: DateTime<Utc>,
    state: JobState,
    attempts: u32,
    last_error: Option<String>,
}

impl QueuedJob {
    fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.id,
            kind: self.payload.kind(),
            state: self.state.clone(),
            attempts: self.attempts,
            last_error: self.last_error.clone(),
        }
    }
}

/// Completed jobs kept for `status` lookups before the oldest are dropped.
pub const DEFAULT_COMPLETED_RETENTION: usize = 1_024;

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    jobs: BTreeMap<JobId, QueuedJob>,
}

impl QueueState {
    fn allocate(&mut self) -> JobId {
        self.next_id += 1;
        JobId(self.next_id)
    }

    /// Drop the oldest completed jobs beyond `retention`. Pending and failed jobs stay.
    fn prune_completed(&mut self, retention: usize) {
        let completed: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.state == JobState::Completed)
            .map(|job| job.id)
            .collect();
        let excess = completed.len().saturating_sub(retention);
        for id in completed.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
    }
}

/// Process-local deferred queue drained by `run_due`.
pub struct InMemoryTaskQueue {
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    completed_retention: usize,
    state: Mutex<QueueState>,
}

impl InMemoryTaskQueue {
    pub fn new(clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            clock,
            policy,
            completed_retention: DEFAULT_COMPLETED_RETENTION,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn with_completed_retention(mut self, retention: usize) -> Self {
        self.completed_retention = retention;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Unavailable("queue mutex poisoned".to_string()))
    }

    /// Execute every job due now, once. Returns how many jobs ran.
    pub fn run_due(&self, worker: &dyn JobWorker) -> Result<usize, QueueError> {
        let now = self.clock.now();
        let batch: Vec<QueuedJob> = {
            let mut state = self.lock()?;
            let mut due: Vec<&mut QueuedJob> = state
                .jobs
                .values_mut()
                .filter(|job| job.state == JobState::Pending && job.due_at <= now)
                .collect();
            due.sort_by(|a, b| {
                a.due_at
                    .cmp(&b.due_at)
                    .then(a.priority.cmp(&b.priority))
                    .then(a.id.cmp(&b.id))
            });
            due.into_iter()
                .map(|job| {
                    job.state = JobState::Running;
                    job.attempts += 1;
                    job.clone()
                })
                .collect()
        };

        for job in &batch {
            let outcome = worker.run(&job.payload);
            let mut state = self.lock()?;
            let Some(stored) = state.jobs.get_mut(&job.id) else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    stored.state = JobState::Completed;
                    debug!(job_id = %job.id, kind = job.payload.kind(), "job completed");
                    state.prune_completed(self.completed_retention);
                }
                Err(err) if err.is_retryable() && stored.attempts < self.policy.max_attempts => {
                    let retry_at = self.clock.now() + self.policy.backoff(stored.attempts);
                    warn!(
                        job_id = %job.id,
                        kind = job.payload.kind(),
                        attempt = stored.attempts,
                        error = %err,
                        "job failed; retry scheduled"
                    );
                    stored.state = JobState::Pending;
                    stored.due_at = retry_at;
                    stored.last_error = Some(err.to_string());
                }
                Err(err) => {
                    error!(
                        job_id = %job.id,
                        kind = job.payload.kind(),
                        attempts = stored.attempts,
                        error = %err,
                        "job permanently failed"
                    );
                    stored.state = JobState::Failed {
                        error: err.to_string(),
                    };
                    stored.last_error = Some(err.to_string());
                }
            }
        }

        Ok(batch.len())
    }

    /// Run due jobs until none remain due, including jobs enqueued by earlier ones.
    pub fn drain(&self, worker: &dyn JobWorker) -> Result<usize, QueueError> {
        let mut total = 0;
        loop {
            let ran = self.run_due(worker)?;
            if ran == 0 {
                return Ok(total);
            }
            total += ran;
        }
    }

    pub fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, QueueError> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|job| job.state == JobState::Pending)
            .map(|job| job.due_at)
            .min())
    }

    pub fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|job| job.state == JobState::Pending)
            .count())
    }

    pub fn failed_jobs(&self) -> Result<Vec<JobStatus>, QueueError> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|job| matches!(job.state, JobState::Failed { .. }))
            .map(QueuedJob::status)
            .collect())
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn submit(
        &self,
        payload: JobPayload,
        options: JobOptions,
        _worker: &dyn JobWorker,
    ) -> Result<JobHandle, QueueError> {
        let now = self.clock.now();
        let mut state = self.lock()?;

        if let Some(key) = options.dedup_key.as_deref() {
            let existing = state.jobs.values().find(|job| {
                job.state == JobState::Pending && job.dedup_key.as_deref() == Some(key)
            });
            if let Some(job) = existing {
                debug!(job_id = %job.id, dedup_key = key, "duplicate job suppressed");
                return Ok(JobHandle {
                    job_id: job.id,
                    mode: ExecutionMode::Deferred,
                });
            }
        }

        let id = state.allocate();
        debug!(job_id = %id, kind = payload.kind(), "job enqueued");
        state.jobs.insert(
            id,
            QueuedJob {
                id,
                payload,
                priority: options.priority,
                dedup_key: options.dedup_key,
                due_at: now + options.delay,
                state: JobState::Pending,
                attempts: 0,
                last_error: None,
            },
        );

        Ok(JobHandle {
            job_id: id,
            mode: ExecutionMode::Deferred,
        })
    }

    fn status(&self, job_id: JobId) -> Result<Option<JobStatus>, QueueError> {
        Ok(self.lock()?.jobs.get(&job_id).map(QueuedJob::status))
    }
}

/// Disabled-queue mode: runs each job inline with the same bounded retry count.
///
/// Backoff delays are not slept; attempts run back to back.
pub struct SynchronousTaskQueue {
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    completed_retention: usize,
    state: Mutex<QueueState>,
}

impl SynchronousTaskQueue {
    pub fn new(clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            clock,
            policy,
            completed_retention: DEFAULT_COMPLETED_RETENTION,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn with_completed_retention(mut self, retention: usize) -> Self {
        self.completed_retention = retention;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Unavailable("queue mutex poisoned".to_string()))
    }
}

impl TaskQueue for SynchronousTaskQueue {
    fn submit(
        &self,
        payload: JobPayload,
        options: JobOptions,
        worker: &dyn JobWorker,
    ) -> Result<JobHandle, QueueError> {
        let id = self.lock()?.allocate();
        let mut attempts = 0;
        let mut state = JobState::Completed;
        let mut last_error = None;

        while attempts < self.policy.max_attempts.max(1) {
            attempts += 1;
            match worker.run(&payload) {
                Ok(()) => {
                    state = JobState::Completed;
                    break;
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    last_error = Some(err.to_string());
                    state = JobState::Failed {
                        error: err.to_string(),
                    };
                    if !retryable {
                        break;
                    }
                }
            }
        }

        if let JobState::Failed { error: message } = &state {
            error!(job_id = %id, kind = payload.kind(), attempts, error = %message, "inline job failed");
        }

        let mut queue = self.lock()?;
        queue.jobs.insert(
            id,
            QueuedJob {
                id,
                payload,
                priority: options.priority,
                dedup_key: options.dedup_key,
                due_at: self.clock.now(),
                state,
                attempts,
                last_error,
            },
        );
        queue.prune_completed(self.completed_retention);

        Ok(JobHandle {
            job_id: id,
            mode: ExecutionMode::Inline,
        })
    }

    fn status(&self, job_id: JobId) -> Result<Option<JobStatus>, QueueError> {
        Ok(self.lock()?.jobs.get(&job_id).map(QueuedJob::status))
    }
}
