use tracing::info;

use super::CertificationEngine;
use crate::workflows::certification::domain::{
    Application, ApplicationId, ApplicationStatus, PaymentPhase,
};
use crate::workflows::certification::errors::{BusinessRuleViolation, WorkflowError};
use crate::workflows::certification::notifications::{Notification, NotificationEvent};
use crate::workflows::certification::payments::{parse_phase, PaymentConfirmation};
use crate::workflows::certification::queue::AutoTrigger;
use crate::workflows::certification::repository::{ApplicationRepository, CertificateRepository};
use crate::workflows::certification::state_machine::transition;

/// State a confirmed payment moves the application into, if any.
///
/// `None` inside `Ok` means the phase may be paid here without a transition.
fn settlement_target(
    application: &Application,
    phase: PaymentPhase,
) -> Result<Option<ApplicationStatus>, BusinessRuleViolation> {
    use ApplicationStatus::*;

    match (phase, application.status) {
        (PaymentPhase::Phase1, Draft) => Ok(None),
        (PaymentPhase::Phase2, PaymentPending) => Ok(Some(PaymentVerified)),
        (PaymentPhase::Phase2, Phase2PaymentPending) => Ok(Some(Phase2PaymentVerified)),
        (PaymentPhase::Penalty, PenaltyPaymentPending) => Ok(Some(Submitted)),
        (PaymentPhase::Replacement, ReplacementPaymentPending) => Ok(Some(ReplacementAdminCheck)),
        _ if application.is_paid(phase) => Err(BusinessRuleViolation::PaymentAlreadyCompleted { phase }),
        (_, status) => Err(BusinessRuleViolation::InvalidState {
            operation: "confirm_payment",
            status,
        }),
    }
}

impl<R, C> CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    /// Complete one payment phase at most once and advance the workflow it gates.
    pub fn confirm_payment(
        &self,
        id: &ApplicationId,
        phase: PaymentPhase,
        confirmation: &PaymentConfirmation,
    ) -> Result<Application, WorkflowError> {
        let payments = &self.payments;
        let (application, target) = self.mutate(id, |application, now| {
            let target = settlement_target(application, phase)?;
            payments.confirm(application, phase, confirmation, now)?;
            if let Some(next) = target {
                let note = format!(
                    "{phase} payment confirmed ({})",
                    confirmation.transaction_id.trim()
                );
                let actor = application.applicant.0.clone();
                transition(application, next, &actor, note, now)?;
            }
            Ok(target)
        })?;

        info!(
            application_id = %application.application_id,
            phase = phase.key(),
            transaction_id = %confirmation.transaction_id.trim(),
            "payment confirmed"
        );

        match target {
            Some(ApplicationStatus::Submitted) => {
                self.schedule_trigger(&application.application_id, AutoTrigger::BeginReview);
            }
            Some(_) => {}
            None => {
                let amount = application
                    .payment_for(phase)
                    .map(|record| record.amount)
                    .unwrap_or_default();
                self.notify(
                    Notification::new(
                        NotificationEvent::PaymentConfirmed,
                        application.application_id.clone(),
                        &application.applicant.0,
                    )
                    .with("application_number", &application.application_number)
                    .with("phase", phase.key())
                    .with("amount", amount),
                );
            }
        }
        Ok(application)
    }

    /// `confirm_payment` for a caller-supplied phase key such as `"phase1"`.
    pub fn process_payment(
        &self,
        id: &ApplicationId,
        phase_key: &str,
        confirmation: &PaymentConfirmation,
    ) -> Result<Application, WorkflowError> {
        let phase = parse_phase(phase_key)?;
        self.confirm_payment(id, phase, confirmation)
    }
}
