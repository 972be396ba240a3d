use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::{clean_reasons, require_status, CertificationEngine};
use crate::workflows::certification::domain::{
    Application, ApplicationId, ApplicationStatus, AssessmentScore, PaymentPhase, StaffId,
};
use crate::workflows::certification::errors::WorkflowError;
use crate::workflows::certification::fees::FeeCalculator;
use crate::workflows::certification::intake::required_documents;
use crate::workflows::certification::repository::{ApplicationRepository, CertificateRepository};
use crate::workflows::certification::revisions::{RevisionOutcome, RevisionTracker};
use crate::workflows::certification::scoring::{
    DocumentReview, PreliminaryAssessment, PreliminaryDecision,
};
use crate::workflows::certification::state_machine::transition;

pub(super) const PRELIMINARY_CATEGORY: &str = "preliminary_review";

/// Statuses from which staff may reject an application.
const REJECTABLE: [ApplicationStatus; 6] = [
    ApplicationStatus::UnderReview,
    ApplicationStatus::RevisionRequired,
    ApplicationStatus::InspectionScheduled,
    ApplicationStatus::InspectionCompleted,
    ApplicationStatus::Phase2PaymentVerified,
    ApplicationStatus::ReplacementAdminCheck,
];

fn open_phase2_payment(
    fees: &FeeCalculator,
    application: &mut Application,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    require_status(application, "approve_for_payment", &[ApplicationStatus::UnderReview])?;
    application
        .payment
        .entry(PaymentPhase::Phase2)
        .or_insert_with(|| fees.open_record(PaymentPhase::Phase2, now));
    transition(
        application,
        ApplicationStatus::PaymentPending,
        actor,
        "documents approved; inspection fee due",
        now,
    )?;
    Ok(())
}

fn return_for_revision(
    revisions: &RevisionTracker,
    fees: &FeeCalculator,
    application: &mut Application,
    actor: &str,
    reasons: &[String],
    now: DateTime<Utc>,
) -> Result<RevisionOutcome, WorkflowError> {
    require_status(application, "request_revision", &[ApplicationStatus::UnderReview])?;

    let outcome = revisions.record(application.revision_count);
    application.revision_count = outcome.count();
    transition(
        application,
        ApplicationStatus::RevisionRequired,
        actor,
        format!("revision {}: {}", outcome.count(), reasons.join("; ")),
        now,
    )?;

    if let RevisionOutcome::PenaltyTriggered { count } = outcome {
        application
            .payment
            .entry(PaymentPhase::Penalty)
            .or_insert_with(|| fees.open_record(PaymentPhase::Penalty, now));
        transition(
            application,
            ApplicationStatus::PenaltyPaymentPending,
            "system",
            format!("revision limit reached after {count} requests; penalty fee due"),
            now,
        )?;
    }
    Ok(outcome)
}

pub(super) fn reject(
    application: &mut Application,
    actor: &str,
    reasons: &[String],
    appeal_window_days: i64,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    require_status(application, "reject", &REJECTABLE)?;
    transition(
        application,
        ApplicationStatus::Rejected,
        actor,
        format!("rejected: {}", reasons.join("; ")),
        now,
    )?;
    application.appeal_deadline = Some(now + Duration::days(appeal_window_days));
    Ok(())
}

impl<R, C> CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    /// Score the document review and apply its decision in the same unit of work.
    ///
    /// Officer comments become the revision or rejection reasons; without comments
    /// the score itself is quoted.
    pub fn review_application(
        &self,
        id: &ApplicationId,
        reviewer: &StaffId,
        review: DocumentReview,
    ) -> Result<(Application, PreliminaryAssessment), WorkflowError> {
        let fees = &self.fees;
        let revisions = &self.revisions;
        let scorer = &self.scorer;
        let appeal_window_days = self.config.appeal_window_days;

        let (application, assessment) = self.mutate(id, |application, now| {
            require_status(application, "review", &[ApplicationStatus::UnderReview])?;

            let required = required_documents(application.application_type).len();
            let assessment =
                scorer.preliminary(&application.farm, application.risk_level, required, &review);
            application.assessment_scores.push(AssessmentScore {
                category: PRELIMINARY_CATEGORY.to_string(),
                max_score: 100.0,
                achieved_score: assessment.total,
                assessor: reviewer.clone(),
                timestamp: now,
            });

            let reasons = if review.comments.is_empty() {
                vec![format!("preliminary score {:.1}", assessment.total)]
            } else {
                review.comments.clone()
            };
            match assessment.decision {
                PreliminaryDecision::ProceedToInspection => {
                    open_phase2_payment(fees, application, &reviewer.0, now)?;
                }
                PreliminaryDecision::RevisionRequired => {
                    return_for_revision(revisions, fees, application, &reviewer.0, &reasons, now)?;
                }
                PreliminaryDecision::Reject => {
                    reject(application, &reviewer.0, &reasons, appeal_window_days, now)?;
                }
            }
            Ok(assessment)
        })?;

        info!(
            application_id = %application.application_id,
            score = assessment.total,
            decision = ?assessment.decision,
            "preliminary review recorded"
        );
        Ok((application, assessment))
    }

    /// Return an under-review application to the applicant.
    ///
    /// The third cumulative request moves to `penalty_payment_pending` instead
    /// and opens the penalty fee.
    pub fn request_revision(
        &self,
        id: &ApplicationId,
        reviewer: &StaffId,
        reasons: Vec<String>,
    ) -> Result<Application, WorkflowError> {
        let reasons = clean_reasons(reasons)?;
        let fees = &self.fees;
        let revisions = &self.revisions;

        let (application, outcome) = self.mutate(id, |application, now| {
            return_for_revision(revisions, fees, application, &reviewer.0, &reasons, now)
        })?;

        info!(
            application_id = %application.application_id,
            revision_count = outcome.count(),
            penalty = matches!(outcome, RevisionOutcome::PenaltyTriggered { .. }),
            "revision requested"
        );
        Ok(application)
    }

    /// Accept the documents and open the phase-2 (inspection) fee.
    pub fn approve_for_payment(
        &self,
        id: &ApplicationId,
        reviewer: &StaffId,
    ) -> Result<Application, WorkflowError> {
        let fees = &self.fees;
        let (application, ()) = self.mutate(id, |application, now| {
            open_phase2_payment(fees, application, &reviewer.0, now)
        })?;
        Ok(application)
    }

    /// Reject with mandatory reasons; the applicant may appeal until the deadline.
    pub fn reject_application(
        &self,
        id: &ApplicationId,
        actor: &StaffId,
        reasons: Vec<String>,
    ) -> Result<Application, WorkflowError> {
        let reasons = clean_reasons(reasons)?;
        let appeal_window_days = self.config.appeal_window_days;
        let (application, ()) = self.mutate(id, |application, now| {
            reject(application, &actor.0, &reasons, appeal_window_days, now)
        })?;
        Ok(application)
    }
}
