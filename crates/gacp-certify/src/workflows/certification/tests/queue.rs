use std::sync::{Arc, Mutex};

use chrono::Duration;

use super::common::*;
use crate::workflows::certification::clock::{Clock, ManualClock};
use crate::workflows::certification::domain::ApplicationId;
use crate::workflows::certification::errors::{
    InfrastructureError, ValidationError, WorkflowError,
};
use crate::workflows::certification::queue::{
    AutoTrigger, ExecutionMode, InMemoryTaskQueue, JobOptions, JobPayload, JobState, JobWorker,
    RetryPolicy, SynchronousTaskQueue, TaskQueue,
};

/// Worker that fails a fixed number of times before succeeding, recording every call.
struct ScriptedWorker {
    failures_left: Mutex<u32>,
    retryable: bool,
    calls: Mutex<Vec<ApplicationId>>,
}

impl ScriptedWorker {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: Mutex::new(times),
            retryable: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn rejecting() -> Self {
        Self {
            failures_left: Mutex::new(u32::MAX),
            retryable: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<ApplicationId> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl JobWorker for ScriptedWorker {
    fn run(&self, payload: &JobPayload) -> Result<(), WorkflowError> {
        if let JobPayload::AutoTransition { application_id, .. } = payload {
            self.calls
                .lock()
                .expect("calls lock")
                .push(application_id.clone());
        }
        let mut failures_left = self.failures_left.lock().expect("failure lock");
        if *failures_left == 0 {
            return Ok(());
        }
        *failures_left -= 1;
        if self.retryable {
            Err(InfrastructureError::Serialization("broker hiccup".to_string()).into())
        } else {
            Err(ValidationError::MissingReason.into())
        }
    }
}

fn payload(id: &str) -> JobPayload {
    JobPayload::AutoTransition {
        application_id: ApplicationId(id.to_string()),
        trigger: AutoTrigger::BeginReview,
    }
}

fn queue() -> (Arc<ManualClock>, InMemoryTaskQueue) {
    let clock = Arc::new(ManualClock::new(start()));
    let queue = InMemoryTaskQueue::new(clock.clone(), RetryPolicy::default());
    (clock, queue)
}

#[test]
fn backoff_doubles_and_is_capped() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(1), Duration::seconds(2));
    assert_eq!(policy.backoff(2), Duration::seconds(4));
    assert_eq!(policy.backoff(3), Duration::seconds(8));
    assert_eq!(policy.backoff(40), Duration::hours(24));
}

#[test]
fn transient_failures_are_retried_with_backoff() {
    let (clock, queue) = queue();
    let worker = ScriptedWorker::failing(2);
    let handle = queue
        .submit(payload("app-1"), JobOptions::immediate(), &worker)
        .expect("job accepted");
    assert_eq!(handle.mode, ExecutionMode::Deferred);
    assert!(worker.calls().is_empty());

    assert_eq!(queue.run_due(&worker).expect("queue runs"), 1);
    let status = queue
        .status(handle.job_id)
        .expect("queue readable")
        .expect("job known");
    assert_eq!(status.state, JobState::Pending);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.kind, "auto_transition");
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|error| error.contains("broker hiccup")));
    assert_eq!(
        queue.next_due_at().expect("queue readable"),
        Some(clock.now() + Duration::seconds(2))
    );

    assert_eq!(queue.run_due(&worker).expect("queue runs"), 0);
    clock.advance(Duration::seconds(2));
    assert_eq!(queue.run_due(&worker).expect("queue runs"), 1);
    clock.advance(Duration::seconds(4));
    assert_eq!(queue.run_due(&worker).expect("queue runs"), 1);

    let status = queue
        .status(handle.job_id)
        .expect("queue readable")
        .expect("job known");
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.attempts, 3);
    assert_eq!(worker.calls().len(), 3);
    assert_eq!(queue.pending_count().expect("queue readable"), 0);
}

#[test]
fn jobs_fail_after_max_attempts() {
    let (clock, queue) = queue();
    let worker = ScriptedWorker::failing(u32::MAX);
    let handle = queue
        .submit(payload("app-1"), JobOptions::immediate(), &worker)
        .expect("job accepted");

    for _ in 0..3 {
        queue.run_due(&worker).expect("queue runs");
        clock.advance(Duration::minutes(1));
    }

    let failed = queue.failed_jobs().expect("queue readable");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_id, handle.job_id);
    assert_eq!(failed[0].attempts, 3);
    assert!(matches!(failed[0].state, JobState::Failed { .. }));
    assert_eq!(queue.next_due_at().expect("queue readable"), None);
    assert_eq!(queue.run_due(&worker).expect("queue runs"), 0);
}

#[test]
fn business_failures_are_not_retried() {
    let (_, queue) = queue();
    let worker = ScriptedWorker::rejecting();
    let handle = queue
        .submit(payload("app-1"), JobOptions::immediate(), &worker)
        .expect("job accepted");

    assert_eq!(queue.drain(&worker).expect("queue drains"), 1);
    let status = queue
        .status(handle.job_id)
        .expect("queue readable")
        .expect("job known");
    assert_eq!(status.attempts, 1);
    match status.state {
        JobState::Failed { error } => assert_eq!(error, "a reason is required"),
        other => panic!("expected failed job, got {other:?}"),
    }
}

#[test]
fn dedup_applies_only_while_pending() {
    let (_, queue) = queue();
    let worker = ScriptedWorker::failing(0);
    let options = || JobOptions::immediate().deduplicated("auto:app-1:begin_review");

    let first = queue
        .submit(payload("app-1"), options(), &worker)
        .expect("job accepted");
    let duplicate = queue
        .submit(payload("app-1"), options(), &worker)
        .expect("job accepted");
    assert_eq!(first.job_id, duplicate.job_id);
    assert_eq!(queue.pending_count().expect("queue readable"), 1);

    queue.drain(&worker).expect("queue drains");
    let later = queue
        .submit(payload("app-1"), options(), &worker)
        .expect("job accepted");
    assert_ne!(later.job_id, first.job_id);
}

#[test]
fn due_jobs_run_by_priority_and_delayed_jobs_wait() {
    let (clock, queue) = queue();
    let worker = ScriptedWorker::failing(0);
    queue
        .submit(
            payload("notification"),
            JobOptions::immediate().with_priority(5),
            &worker,
        )
        .expect("job accepted");
    queue
        .submit(
            payload("certificate"),
            JobOptions::immediate().with_priority(0),
            &worker,
        )
        .expect("job accepted");
    queue
        .submit(
            payload("trigger"),
            JobOptions::delayed(Duration::seconds(10)).with_priority(1),
            &worker,
        )
        .expect("job accepted");

    assert_eq!(queue.drain(&worker).expect("queue drains"), 2);
    assert_eq!(
        worker.calls(),
        vec![
            ApplicationId("certificate".to_string()),
            ApplicationId("notification".to_string()),
        ]
    );
    assert_eq!(
        queue.next_due_at().expect("queue readable"),
        Some(clock.now() + Duration::seconds(10))
    );

    clock.advance(Duration::seconds(10));
    assert_eq!(queue.drain(&worker).expect("queue drains"), 1);
    assert_eq!(worker.calls().len(), 3);
}

#[test]
fn synchronous_queue_runs_inline_with_bounded_retries() {
    let clock = Arc::new(ManualClock::new(start()));
    let queue = SynchronousTaskQueue::new(clock, RetryPolicy::default());

    let flaky = ScriptedWorker::failing(1);
    let handle = queue
        .submit(payload("app-1"), JobOptions::immediate(), &flaky)
        .expect("job accepted");
    assert_eq!(handle.mode, ExecutionMode::Inline);
    let status = queue
        .status(handle.job_id)
        .expect("queue readable")
        .expect("job known");
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.attempts, 2);

    let broken = ScriptedWorker::failing(u32::MAX);
    let handle = queue
        .submit(payload("app-2"), JobOptions::immediate(), &broken)
        .expect("job accepted");
    let status = queue
        .status(handle.job_id)
        .expect("queue readable")
        .expect("job known");
    assert!(matches!(status.state, JobState::Failed { .. }));
    assert_eq!(status.attempts, 3);

    let rejecting = ScriptedWorker::rejecting();
    let handle = queue
        .submit(payload("app-3"), JobOptions::immediate(), &rejecting)
        .expect("job accepted");
    assert_eq!(
        queue
            .status(handle.job_id)
            .expect("queue readable")
            .expect("job known")
            .attempts,
        1
    );
}

#[test]
fn completed_jobs_are_pruned_beyond_retention() {
    let (_, queue) = queue();
    let queue = queue.with_completed_retention(2);
    let worker = ScriptedWorker::failing(0);
    let rejecting = ScriptedWorker::rejecting();

    let rejected = queue
        .submit(payload("app-0"), JobOptions::immediate(), &rejecting)
        .expect("job accepted");
    queue.drain(&rejecting).expect("queue drains");

    let handles: Vec<_> = (1..=4)
        .map(|n| {
            queue
                .submit(payload(&format!("app-{n}")), JobOptions::immediate(), &worker)
                .expect("job accepted")
        })
        .collect();
    assert_eq!(queue.drain(&worker).expect("queue drains"), 4);

    let known: Vec<bool> = handles
        .iter()
        .map(|handle| {
            queue
                .status(handle.job_id)
                .expect("queue readable")
                .is_some()
        })
        .collect();
    assert_eq!(known, vec![false, false, true, true]);
    assert!(matches!(
        queue
            .status(rejected.job_id)
            .expect("queue readable")
            .map(|status| status.state),
        Some(JobState::Failed { .. })
    ));
    assert_eq!(queue.failed_jobs().expect("queue readable").len(), 1);
}

#[test]
fn synchronous_queue_prunes_completed_jobs() {
    let clock = Arc::new(ManualClock::new(start()));
    let queue =
        SynchronousTaskQueue::new(clock, RetryPolicy::default()).with_completed_retention(1);
    let worker = ScriptedWorker::failing(0);

    let first = queue
        .submit(payload("app-1"), JobOptions::immediate(), &worker)
        .expect("job accepted");
    let second = queue
        .submit(payload("app-2"), JobOptions::immediate(), &worker)
        .expect("job accepted");

    assert_eq!(queue.status(first.job_id).expect("queue readable"), None);
    assert_eq!(
        queue
            .status(second.job_id)
            .expect("queue readable")
            .map(|status| status.state),
        Some(JobState::Completed)
    );
}
