//! Workflow engine orchestrating the certification components.
//!
//! Every mutation runs inside the repository's unit of work. After a commit the
//! engine invalidates cached views, announces the new state, and hands deferred
//! work (auto-transitions, certificate generation, calendar blocks) to the task
//! queue. When the queue is unavailable the same job runs inline.

mod applications;
mod inspection;
mod issuance;
mod queries;
mod review;
mod settlement;

pub use issuance::{CertificateAck, FinalApproval};
pub use queries::{ApplicationPage, StatusSummary};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::cache::{keys, Cache};
use super::certificates::{CertificateIssuer, PayloadSigner};
use super::clock::Clock;
use super::config::WorkflowConfig;
use super::domain::{Application, ApplicationId, ApplicationStatus, PaymentPhase};
use super::errors::{BusinessRuleViolation, InfrastructureError, ValidationError, WorkflowError};
use super::fees::FeeCalculator;
use super::intake::IntakeGuard;
use super::notifications::{Notification, NotificationDispatcher, NotificationEvent};
use super::payments::PaymentGate;
use super::queue::{
    AutoTrigger, ExecutionMode, JobHandle, JobId, JobOptions, JobPayload, JobWorker, QueueError,
    TaskQueue,
};
use super::repository::{ApplicationRepository, CertificateRepository};
use super::revisions::RevisionTracker;
use super::scheduler::InspectionScheduler;
use super::scoring::ComplianceScorer;
use super::staff::StaffDirectory;

const NOTIFICATION_PRIORITY: u8 = 5;
const TRIGGER_PRIORITY: u8 = 1;
const CERTIFICATE_PRIORITY: u8 = 0;

/// Operation precondition on the current state, checked before the transition table.
fn require_status(
    application: &Application,
    operation: &'static str,
    allowed: &[ApplicationStatus],
) -> Result<(), BusinessRuleViolation> {
    if allowed.contains(&application.status) {
        Ok(())
    } else {
        Err(BusinessRuleViolation::InvalidState {
            operation,
            status: application.status,
        })
    }
}

/// Trim caller-supplied reasons, dropping blanks. Fails when nothing remains.
fn clean_reasons(reasons: Vec<String>) -> Result<Vec<String>, ValidationError> {
    let cleaned: Vec<String> = reasons
        .into_iter()
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .collect();
    if cleaned.is_empty() {
        Err(ValidationError::MissingReason)
    } else {
        Ok(cleaned)
    }
}

/// Collaborators injected into the engine.
pub struct Collaborators {
    pub staff: Arc<dyn StaffDirectory>,
    pub scheduler: Arc<dyn InspectionScheduler>,
    pub payments: Arc<dyn PaymentGate>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub queue: Arc<dyn TaskQueue>,
    pub cache: Arc<dyn Cache>,
    pub clock: Arc<dyn Clock>,
    pub signer: Arc<dyn PayloadSigner>,
}

/// Root service of the certification workflow.
pub struct CertificationEngine<R, C> {
    applications: Arc<R>,
    certificates: Arc<C>,
    staff: Arc<dyn StaffDirectory>,
    scheduler: Arc<dyn InspectionScheduler>,
    payments: Arc<dyn PaymentGate>,
    notifier: Arc<dyn NotificationDispatcher>,
    queue: Arc<dyn TaskQueue>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    fees: FeeCalculator,
    scorer: ComplianceScorer,
    revisions: RevisionTracker,
    issuer: CertificateIssuer,
    intake: IntakeGuard,
    config: WorkflowConfig,
}

impl<R, C> CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    pub fn new(
        applications: Arc<R>,
        certificates: Arc<C>,
        collaborators: Collaborators,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            applications,
            certificates,
            staff: collaborators.staff,
            scheduler: collaborators.scheduler,
            payments: collaborators.payments,
            notifier: collaborators.notifier,
            queue: collaborators.queue,
            cache: collaborators.cache,
            clock: collaborators.clock,
            fees: FeeCalculator::new(config.fees.clone()),
            scorer: ComplianceScorer::new(config.scoring.clone()),
            revisions: RevisionTracker::new(config.revision_penalty_threshold),
            issuer: CertificateIssuer::new(config.certificates.clone(), collaborators.signer),
            intake: IntakeGuard,
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Load, change, and save one application atomically.
    ///
    /// Unchanged applications are not written back. When the status moved, the
    /// transition is logged and announced after the commit.
    fn mutate<T, F>(&self, id: &ApplicationId, change: F) -> Result<(Application, T), WorkflowError>
    where
        F: FnOnce(&mut Application, DateTime<Utc>) -> Result<T, WorkflowError>,
    {
        let now = self.now();
        let (application, previous, changed, value) =
            self.applications.unit_of_work(|uow| {
                let original = uow
                    .find_by_id(id)?
                    .ok_or_else(|| BusinessRuleViolation::ApplicationNotFound(id.clone()))?;
                let mut application = original.clone();
                let value = change(&mut application, now)?;
                let changed = application != original;
                if changed {
                    uow.save(application.clone())?;
                }
                Ok::<_, WorkflowError>((application, original.status, changed, value))
            })?;

        if changed {
            self.invalidate_application(id);
        }
        if application.status != previous {
            info!(
                application_id = %application.application_id,
                application_number = %application.application_number,
                from = previous.label(),
                status = application.status.label(),
                "application transitioned"
            );
            self.announce(&application);
        }

        Ok((application, value))
    }

    fn invalidate_application(&self, id: &ApplicationId) {
        if let Err(err) = self.cache.delete(&keys::application(id)) {
            warn!(application_id = %id, error = %err, "cache invalidation failed");
        }
        self.invalidate_listings();
    }

    fn invalidate_listings(&self) {
        if let Err(err) = self.cache.delete_pattern(keys::APPLICATION_LIST_PATTERN) {
            warn!(error = %err, "list cache invalidation failed");
        }
        if let Err(err) = self.cache.delete(keys::STATUS_SUMMARY) {
            warn!(error = %err, "stats cache invalidation failed");
        }
    }

    fn invalidate_verification(&self, certificate_number: &str) {
        let pattern = keys::certificate_verification_pattern(certificate_number);
        if let Err(err) = self.cache.delete_pattern(&pattern) {
            warn!(certificate_number, error = %err, "verification cache invalidation failed");
        }
    }

    /// Hand a job to the queue, running it inline if the queue cannot take it.
    fn dispatch(&self, payload: JobPayload, options: JobOptions) -> Result<JobHandle, WorkflowError> {
        match self.queue.submit(payload.clone(), options, self) {
            Ok(handle) => Ok(handle),
            Err(QueueError::Unavailable(reason)) => {
                warn!(kind = payload.kind(), reason = %reason, "task queue unavailable; running job inline");
                self.run(&payload)?;
                Ok(JobHandle {
                    job_id: JobId(0),
                    mode: ExecutionMode::Inline,
                })
            }
        }
    }

    fn schedule_trigger(&self, application_id: &ApplicationId, trigger: AutoTrigger) {
        let options = JobOptions::delayed(Duration::seconds(self.config.auto_transition_delay_secs))
            .with_priority(TRIGGER_PRIORITY)
            .deduplicated(format!("auto:{application_id}:{}", trigger.label()));
        let payload = JobPayload::AutoTransition {
            application_id: application_id.clone(),
            trigger,
        };
        if let Err(err) = self.dispatch(payload, options) {
            warn!(
                application_id = %application_id,
                trigger = trigger.label(),
                error = %err,
                "auto-transition could not be scheduled"
            );
        }
    }

    fn notify(&self, notification: Notification) {
        let event = notification.event.template();
        let application_id = notification.application_id.clone();
        let options = JobOptions::immediate().with_priority(NOTIFICATION_PRIORITY);
        if let Err(err) = self.dispatch(JobPayload::Notification(notification), options) {
            warn!(application_id = %application_id, event, error = %err, "notification dropped");
        }
    }

    /// Announce the application's current state to the applicant.
    fn announce(&self, application: &Application) {
        let event = match application.status {
            ApplicationStatus::Draft => NotificationEvent::ApplicationCreated,
            ApplicationStatus::Submitted => NotificationEvent::ApplicationSubmitted,
            ApplicationStatus::UnderReview => return,
            ApplicationStatus::RevisionRequired => NotificationEvent::RevisionRequested,
            ApplicationStatus::PenaltyPaymentPending => NotificationEvent::PenaltyFeeDue,
            ApplicationStatus::PaymentPending
            | ApplicationStatus::Phase2PaymentPending
            | ApplicationStatus::ReplacementPaymentPending => NotificationEvent::PaymentDue,
            ApplicationStatus::PaymentVerified
            | ApplicationStatus::Phase2PaymentVerified
            | ApplicationStatus::ReplacementAdminCheck => NotificationEvent::PaymentConfirmed,
            ApplicationStatus::InspectionScheduled => NotificationEvent::InspectionScheduled,
            ApplicationStatus::InspectionCompleted => NotificationEvent::InspectionCompleted,
            ApplicationStatus::Approved => NotificationEvent::ApplicationApproved,
            ApplicationStatus::CertificateIssued => NotificationEvent::CertificateIssued,
            ApplicationStatus::Rejected => NotificationEvent::ApplicationRejected,
            ApplicationStatus::Expired => NotificationEvent::ApplicationExpired,
        };

        let mut notification = Notification::new(
            event,
            application.application_id.clone(),
            &application.applicant.0,
        )
        .with("application_number", &application.application_number)
        .with("status", application.status.label());

        if let Some(note) = application.status_history.last().map(|entry| &entry.note) {
            if !note.is_empty() {
                notification = notification.with("note", note);
            }
        }
        for (phase, record) in application.payment.iter().filter(|(_, r)| !r.is_completed()) {
            notification = notification.with(&format!("{}_amount", phase.key()), record.amount);
        }
        if let Some(deadline) = application.appeal_deadline {
            notification = notification.with("appeal_deadline", deadline.to_rfc3339());
        }
        if let Some(date) = application.inspection_date {
            notification = notification.with("inspection_date", date.to_rfc3339());
        }

        self.notify(notification);
    }

    /// Execute a background trigger. Triggers that find the application in
    /// another state are no-ops.
    fn apply_trigger(
        &self,
        application_id: &ApplicationId,
        trigger: AutoTrigger,
    ) -> Result<(), WorkflowError> {
        let fees = &self.fees;
        let (application, fired) = self.mutate(application_id, |application, now| {
            let expected = match trigger {
                AutoTrigger::BeginReview => ApplicationStatus::Submitted,
                AutoTrigger::OpenReplacementPayment => ApplicationStatus::Submitted,
                AutoTrigger::AdvanceToPhase2Payment => ApplicationStatus::InspectionCompleted,
            };
            if application.status != expected {
                return Ok(false);
            }

            match trigger {
                AutoTrigger::BeginReview => {
                    if application.application_type.is_replacement() {
                        return Ok(false);
                    }
                    super::state_machine::transition(
                        application,
                        ApplicationStatus::UnderReview,
                        "system",
                        "automated document review completed",
                        now,
                    )?;
                }
                AutoTrigger::OpenReplacementPayment => {
                    if !application.application_type.is_replacement() {
                        return Ok(false);
                    }
                    application
                        .payment
                        .entry(PaymentPhase::Replacement)
                        .or_insert_with(|| fees.open_record(PaymentPhase::Replacement, now));
                    super::state_machine::transition(
                        application,
                        ApplicationStatus::ReplacementPaymentPending,
                        "system",
                        "replacement fee requested",
                        now,
                    )?;
                }
                AutoTrigger::AdvanceToPhase2Payment => {
                    application
                        .payment
                        .entry(PaymentPhase::Phase2)
                        .or_insert_with(|| fees.open_record(PaymentPhase::Phase2, now));
                    super::state_machine::transition(
                        application,
                        ApplicationStatus::Phase2PaymentPending,
                        "system",
                        "inspection record finalized",
                        now,
                    )?;
                    if application.is_paid(PaymentPhase::Phase2) {
                        super::state_machine::transition(
                            application,
                            ApplicationStatus::Phase2PaymentVerified,
                            "system",
                            "phase2 fee already settled",
                            now,
                        )?;
                    }
                }
            }
            Ok(true)
        })?;

        if !fired {
            debug!(
                application_id = %application_id,
                trigger = trigger.label(),
                status = application.status.label(),
                "auto-transition skipped"
            );
        }
        Ok(())
    }
}

impl<R, C> JobWorker for CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    fn run(&self, payload: &JobPayload) -> Result<(), WorkflowError> {
        match payload {
            JobPayload::Notification(notification) => self
                .notifier
                .send(notification.clone())
                .map_err(|err| InfrastructureError::from(err).into()),
            JobPayload::GenerateCertificate {
                application_id,
                approver,
                certificate_number,
                year,
                sequence,
            } => self
                .issue_certificate(application_id, approver, certificate_number, *year, *sequence)
                .map(|_| ()),
            JobPayload::BlockCalendar {
                application_id,
                auditor,
                starts_at,
                hours,
            } => {
                let notification = Notification::new(
                    NotificationEvent::CalendarBlockRequested,
                    application_id.clone(),
                    &auditor.0,
                )
                .with("starts_at", starts_at.to_rfc3339())
                .with("hours", hours);
                self.notifier
                    .send(notification)
                    .map_err(|err| InfrastructureError::from(err).into())
            }
            JobPayload::AutoTransition {
                application_id,
                trigger,
            } => self.apply_trigger(application_id, *trigger),
        }
    }
}
