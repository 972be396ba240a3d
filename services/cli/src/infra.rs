use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use gacp_certify::config::AppConfig;
use gacp_certify::error::AppError;
use gacp_certify::workflows::certification::memory::{
    InMemoryApplicationRepository, InMemoryCertificateRepository, InMemoryStaffDirectory,
};
use gacp_certify::workflows::certification::{
    AuditorPoolScheduler, CertificationEngine, Clock, Collaborators, HmacSha256Signer,
    InMemoryCache, InMemoryTaskQueue, LedgerPaymentGate, Notification,
    NotificationDispatcher, NotificationError, RegionCode, StaffId, StaffProfile, StaffRole,
    SynchronousTaskQueue, SystemClock, TaskQueue, WorkflowError,
};
use tracing::{debug, info};

pub(crate) type Engine =
    CertificationEngine<InMemoryApplicationRepository, InMemoryCertificateRepository>;

/// Dispatcher that writes each notification to the log instead of a transport.
#[derive(Debug, Default)]
pub(crate) struct TracingNotifier;

impl NotificationDispatcher for TracingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            event = notification.event.template(),
            application_id = %notification.application_id,
            recipient = %notification.recipient,
            details = ?notification.details,
            "notification sent"
        );
        Ok(())
    }
}

fn profile(
    id: &str,
    name: &str,
    role: StaffRole,
    region: &str,
    expertise: &[&str],
) -> StaffProfile {
    StaffProfile {
        staff_id: StaffId(id.to_string()),
        name: name.to_string(),
        role,
        region: RegionCode(region.to_string()),
        expertise: expertise.iter().map(|skill| skill.to_string()).collect(),
        active_workload: 0,
    }
}

pub(crate) fn seeded_staff() -> Vec<StaffProfile> {
    vec![
        profile("officer-cm-01", "Anong S.", StaffRole::Officer, "CM", &[]),
        profile("officer-bk-01", "Prasert K.", StaffRole::Officer, "BK", &[]),
        profile(
            "auditor-cm-01",
            "Kittipong W.",
            StaffRole::Auditor,
            "CM",
            &["cannabis", "hemp"],
        ),
        profile(
            "auditor-bk-01",
            "Siriporn L.",
            StaffRole::Auditor,
            "BK",
            &["cannabis", "kratom"],
        ),
    ]
}

/// Engine wired to in-process adapters plus the queue the configuration selects.
pub(crate) struct Runtime {
    pub(crate) engine: Engine,
    queue: Option<Arc<InMemoryTaskQueue>>,
    poll_interval: StdDuration,
}

impl Runtime {
    pub(crate) fn build(config: &AppConfig) -> Result<Self, AppError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let directory = Arc::new(InMemoryStaffDirectory::with_staff(seeded_staff()));
        let signer = HmacSha256Signer::new(&config.certificates.signing_key)
            .map_err(WorkflowError::from)?;

        let deferred = config.queue.enabled.then(|| {
            Arc::new(InMemoryTaskQueue::new(
                clock.clone(),
                config.queue.retry_policy(),
            ))
        });
        let active: Arc<dyn TaskQueue> = match &deferred {
            Some(queue) => queue.clone(),
            None => Arc::new(SynchronousTaskQueue::new(
                clock.clone(),
                config.queue.retry_policy(),
            )),
        };

        let collaborators = Collaborators {
            staff: directory.clone(),
            scheduler: Arc::new(AuditorPoolScheduler::new(
                directory,
                config.workflow.minimum_notice_days,
            )),
            payments: Arc::new(LedgerPaymentGate),
            notifier: Arc::new(TracingNotifier),
            queue: active,
            cache: Arc::new(InMemoryCache::new(clock.clone())),
            clock,
            signer: Arc::new(signer),
        };
        let engine = CertificationEngine::new(
            Arc::new(InMemoryApplicationRepository::new()),
            Arc::new(InMemoryCertificateRepository::new()),
            collaborators,
            config.workflow.clone(),
        );

        info!(
            queue_enabled = config.queue.enabled,
            max_attempts = config.queue.max_attempts,
            "certification runtime ready"
        );
        Ok(Self {
            engine,
            queue: deferred,
            poll_interval: StdDuration::from_millis(config.queue.poll_interval_ms.max(1)),
        })
    }

    /// Poll the deferred queue until nothing is pending. Inline mode has nothing to wait for.
    pub(crate) async fn settle(&self) -> Result<(), AppError> {
        let Some(queue) = &self.queue else {
            return Ok(());
        };
        loop {
            let ran = queue.drain(&self.engine).map_err(WorkflowError::from)?;
            if ran > 0 {
                debug!(jobs = ran, "queue drained");
            }
            let Some(due) = queue.next_due_at().map_err(WorkflowError::from)? else {
                return Ok(());
            };
            let wait = (due - Utc::now())
                .to_std()
                .unwrap_or(StdDuration::ZERO)
                .min(self.poll_interval);
            tokio::time::sleep(wait).await;
        }
    }
}
