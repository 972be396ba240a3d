use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Application, PaymentMethod, PaymentPhase, PaymentStatus};
use super::errors::{BusinessRuleViolation, ValidationError, WorkflowError};

/// Confirmation supplied by the payment gateway adapter; trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub transaction_id: String,
    pub method: PaymentMethod,
}

/// Records phase payments and enforces "paid before proceed".
pub trait PaymentGate: Send + Sync {
    /// Mark `phase` completed on `application`. Fails if the record is missing or already completed.
    fn confirm(
        &self,
        application: &mut Application,
        phase: PaymentPhase,
        confirmation: &PaymentConfirmation,
        at: DateTime<Utc>,
    ) -> Result<(), WorkflowError>;

    fn ensure_paid(
        &self,
        application: &Application,
        phase: PaymentPhase,
    ) -> Result<(), BusinessRuleViolation>;
}

/// Gate backed by the payment records stored on the application itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerPaymentGate;

impl PaymentGate for LedgerPaymentGate {
    fn confirm(
        &self,
        application: &mut Application,
        phase: PaymentPhase,
        confirmation: &PaymentConfirmation,
        at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if confirmation.transaction_id.trim().is_empty() {
            return Err(ValidationError::MissingField("transaction_id").into());
        }

        let record = application
            .payment
            .get_mut(&phase)
            .ok_or(BusinessRuleViolation::PaymentNotOpened { phase })?;

        if record.is_completed() {
            return Err(BusinessRuleViolation::PaymentAlreadyCompleted { phase }.into());
        }

        record.status = PaymentStatus::Completed;
        record.paid_at = Some(at);
        record.transaction_id = Some(confirmation.transaction_id.trim().to_string());
        record.method = Some(confirmation.method);
        Ok(())
    }

    fn ensure_paid(
        &self,
        application: &Application,
        phase: PaymentPhase,
    ) -> Result<(), BusinessRuleViolation> {
        if application.is_paid(phase) {
            Ok(())
        } else {
            Err(BusinessRuleViolation::PaymentRequired { phase })
        }
    }
}

/// Parse a caller-supplied phase key.
pub fn parse_phase(key: &str) -> Result<PaymentPhase, ValidationError> {
    key.parse::<PaymentPhase>()
        .map_err(ValidationError::UnknownPaymentPhase)
}
