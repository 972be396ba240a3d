use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::ApplicationId;

/// Event types the dispatcher knows how to template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    ApplicationCreated,
    ApplicationSubmitted,
    RevisionRequested,
    PenaltyFeeDue,
    PaymentDue,
    PaymentConfirmed,
    InspectionScheduled,
    CalendarBlockRequested,
    InspectionCompleted,
    ApplicationApproved,
    ApplicationRejected,
    ApplicationExpired,
    CertificateIssued,
    CertificateRevoked,
    CertificateRenewed,
}

impl NotificationEvent {
    pub const fn template(self) -> &'static str {
        match self {
            NotificationEvent::ApplicationCreated => "application_created",
            NotificationEvent::ApplicationSubmitted => "application_submitted",
            NotificationEvent::RevisionRequested => "revision_requested",
            NotificationEvent::PenaltyFeeDue => "penalty_fee_due",
            NotificationEvent::PaymentDue => "payment_due",
            NotificationEvent::PaymentConfirmed => "payment_confirmed",
            NotificationEvent::InspectionScheduled => "inspection_scheduled",
            NotificationEvent::CalendarBlockRequested => "calendar_block_requested",
            NotificationEvent::InspectionCompleted => "inspection_completed",
            NotificationEvent::ApplicationApproved => "application_approved",
            NotificationEvent::ApplicationRejected => "application_rejected",
            NotificationEvent::ApplicationExpired => "application_expired",
            NotificationEvent::CertificateIssued => "certificate_issued",
            NotificationEvent::CertificateRevoked => "certificate_revoked",
            NotificationEvent::CertificateRenewed => "certificate_renewed",
        }
    }
}

/// Templated message request so adapters and tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub application_id: ApplicationId,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(event: NotificationEvent, application_id: ApplicationId, recipient: &str) -> Self {
        Self {
            event,
            application_id,
            recipient: recipient.to_string(),
            details: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Outbound message hook (e-mail, SMS, LINE adapters).
pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
