use chrono::{DateTime, Duration, Utc};

use super::domain::{Application, ApplicationStatus, StatusEntry};
use super::errors::BusinessRuleViolation;

use ApplicationStatus::*;

/// Explicit allowed-transition table for the application lifecycle.
pub fn allowed_targets(from: ApplicationStatus) -> &'static [ApplicationStatus] {
    match from {
        Draft => &[Submitted, Expired],
        Submitted => &[UnderReview, ReplacementPaymentPending, Expired],
        UnderReview => &[RevisionRequired, PaymentPending, Rejected],
        RevisionRequired => &[Submitted, PenaltyPaymentPending, Rejected, Expired],
        PenaltyPaymentPending => &[Submitted, Expired],
        PaymentPending => &[PaymentVerified, Expired],
        PaymentVerified => &[InspectionScheduled],
        InspectionScheduled => &[InspectionCompleted, Rejected],
        InspectionCompleted => &[Phase2PaymentPending, Rejected],
        Phase2PaymentPending => &[Phase2PaymentVerified, Expired],
        Phase2PaymentVerified => &[Approved, Rejected],
        ReplacementPaymentPending => &[ReplacementAdminCheck, Expired],
        ReplacementAdminCheck => &[Approved, Rejected],
        Approved => &[CertificateIssued],
        CertificateIssued | Rejected | Expired => &[],
    }
}

pub fn can_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Move `application` to `to`, appending the history entry that records it.
pub fn transition(
    application: &mut Application,
    to: ApplicationStatus,
    actor: &str,
    note: impl Into<String>,
    at: DateTime<Utc>,
) -> Result<(), BusinessRuleViolation> {
    let from = application.status;
    if !can_transition(from, to) {
        return Err(BusinessRuleViolation::TransitionNotAllowed { from, to });
    }

    application.status = to;
    application.status_history.push(StatusEntry {
        state: to,
        actor: actor.to_string(),
        timestamp: at,
        note: note.into(),
    });
    Ok(())
}

/// Append a note to the history without changing state.
pub fn annotate(application: &mut Application, actor: &str, note: impl Into<String>, at: DateTime<Utc>) {
    application.status_history.push(StatusEntry {
        state: application.status,
        actor: actor.to_string(),
        timestamp: at,
        note: note.into(),
    });
}

/// How long an application may wait in an applicant-owned state before it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallTimeouts {
    pub draft_days: i64,
    pub revision_days: i64,
    pub payment_days: i64,
}

impl Default for StallTimeouts {
    fn default() -> Self {
        Self {
            draft_days: 30,
            revision_days: 30,
            payment_days: 7,
        }
    }
}

impl StallTimeouts {
    /// `None` for states the sweep never touches.
    pub fn timeout_for(&self, status: ApplicationStatus) -> Option<Duration> {
        let days = match status {
            Draft => self.draft_days,
            RevisionRequired => self.revision_days,
            PenaltyPaymentPending
            | PaymentPending
            | Phase2PaymentPending
            | ReplacementPaymentPending => self.payment_days,
            _ => return None,
        };
        Some(Duration::days(days))
    }

    pub fn is_stalled(&self, application: &Application, now: DateTime<Utc>) -> bool {
        match self.timeout_for(application.status) {
            Some(timeout) => now - application.entered_status_at() > timeout,
            None => false,
        }
    }
}
