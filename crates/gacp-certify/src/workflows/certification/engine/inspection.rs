use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::review::reject;
use super::{require_status, CertificationEngine};
use crate::workflows::certification::domain::{
    Application, ApplicationId, ApplicationStatus, AssessmentScore, InspectionDecision, StaffId,
};
use crate::workflows::certification::errors::WorkflowError;
use crate::workflows::certification::queue::{AutoTrigger, JobOptions, JobPayload};
use crate::workflows::certification::repository::{ApplicationRepository, CertificateRepository};
use crate::workflows::certification::scheduler::InspectionSlot;
use crate::workflows::certification::scoring::{
    ComplianceAssessment, ComplianceCategory, ComplianceOutcome,
};
use crate::workflows::certification::state_machine::transition;

const FINAL_CATEGORY: &str = "final_compliance";
const CALENDAR_PRIORITY: u8 = 3;

impl<R, C> CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    /// Book the least-loaded qualified auditor on the earliest legal date.
    ///
    /// The auditor's calendar is blocked by a deferred job sized from the
    /// estimated inspection duration.
    pub fn schedule_inspection(
        &self,
        id: &ApplicationId,
        officer: &StaffId,
        preferred_date: Option<DateTime<Utc>>,
    ) -> Result<(Application, InspectionSlot), WorkflowError> {
        let scheduler = &self.scheduler;
        let (application, slot) = self.mutate(id, |application, now| {
            require_status(
                application,
                "schedule_inspection",
                &[ApplicationStatus::PaymentVerified],
            )?;
            let slot = scheduler.schedule(application, preferred_date, now)?;
            application.assigned_auditor = Some(slot.auditor.clone());
            application.inspection_date = Some(slot.date);
            transition(
                application,
                ApplicationStatus::InspectionScheduled,
                &officer.0,
                format!("inspection booked with {} for {}", slot.auditor, slot.date.date_naive()),
                now,
            )?;
            Ok(slot)
        })?;

        if let Err(err) = self.staff.record_assignment(&slot.auditor) {
            warn!(staff_id = %slot.auditor, error = %err, "auditor workload not updated");
        }

        let payload = JobPayload::BlockCalendar {
            application_id: application.application_id.clone(),
            auditor: slot.auditor.clone(),
            starts_at: slot.date,
            hours: slot.estimated_hours,
        };
        let options = JobOptions::immediate()
            .with_priority(CALENDAR_PRIORITY)
            .deduplicated(format!("calendar:{}", application.application_id));
        if let Err(err) = self.dispatch(payload, options) {
            warn!(
                application_id = %application.application_id,
                error = %err,
                "calendar block could not be queued"
            );
        }

        info!(
            application_id = %application.application_id,
            auditor = %slot.auditor,
            estimated_hours = slot.estimated_hours,
            "inspection scheduled"
        );
        Ok((application, slot))
    }

    /// Record the on-site category points and the resulting certification decision.
    ///
    /// A rejection ends the workflow with an appeal deadline. Otherwise the
    /// application moves on to the phase-2 settlement step in the background.
    pub fn complete_inspection(
        &self,
        id: &ApplicationId,
        auditor: &StaffId,
        points: BTreeMap<ComplianceCategory, f64>,
    ) -> Result<(Application, ComplianceAssessment), WorkflowError> {
        let scorer = &self.scorer;
        let category_cap = scorer.config().category_cap;
        let appeal_window_days = self.config.appeal_window_days;

        let (application, assessment) = self.mutate(id, |application, now| {
            require_status(
                application,
                "complete_inspection",
                &[ApplicationStatus::InspectionScheduled],
            )?;

            let assessment = scorer.compliance(&points);
            for (category, achieved) in &assessment.category_points {
                application.assessment_scores.push(AssessmentScore {
                    category: category.label().to_string(),
                    max_score: category_cap,
                    achieved_score: *achieved,
                    assessor: auditor.clone(),
                    timestamp: now,
                });
            }
            application.assessment_scores.push(AssessmentScore {
                category: FINAL_CATEGORY.to_string(),
                max_score: 100.0,
                achieved_score: assessment.score,
                assessor: auditor.clone(),
                timestamp: now,
            });
            application.inspection_decision = Some(InspectionDecision {
                outcome: assessment.outcome.clone(),
                final_score: assessment.score,
                decided_by: auditor.clone(),
                decided_at: now,
            });

            transition(
                application,
                ApplicationStatus::InspectionCompleted,
                &auditor.0,
                format!("compliance score {:.1}", assessment.score),
                now,
            )?;
            if let ComplianceOutcome::Rejected { reasons } = &assessment.outcome {
                reject(application, &auditor.0, reasons, appeal_window_days, now)?;
            }
            Ok(assessment)
        })?;

        info!(
            application_id = %application.application_id,
            score = assessment.score,
            rejected = assessment.outcome.is_rejection(),
            "inspection completed"
        );

        if !assessment.outcome.is_rejection() {
            self.schedule_trigger(
                &application.application_id,
                AutoTrigger::AdvanceToPhase2Payment,
            );
        }
        Ok((application, assessment))
    }
}
