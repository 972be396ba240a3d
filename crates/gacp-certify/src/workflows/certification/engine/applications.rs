use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{info, warn};

use super::CertificationEngine;
use crate::workflows::certification::domain::{
    ApplicantId, Application, ApplicationDraft, ApplicationId, ApplicationStatus, CertificateStatus,
    Document, DocumentKind, PaymentPhase, RegionCode, StatusEntry,
};
use crate::workflows::certification::errors::{
    BusinessRuleViolation, ValidationError, WorkflowError,
};
use crate::workflows::certification::intake::missing_documents;
use crate::workflows::certification::queue::AutoTrigger;
use crate::workflows::certification::repository::{
    ApplicationFilter, ApplicationRepository, CertificateRepository, Page, RepositoryError,
};
use crate::workflows::certification::scoring::assess_risk;
use crate::workflows::certification::staff::{least_loaded, StaffRole};
use crate::workflows::certification::state_machine::transition;

const NUMBER_ATTEMPTS: usize = 10;

/// `APP-YYYYMMDD-NNNN` with a random four-digit suffix.
pub(crate) fn generate_application_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("APP-{}-{suffix}", now.format("%Y%m%d"))
}

impl<R, C> CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    /// Open a draft application for `applicant`.
    ///
    /// Fails if the applicant already has a non-terminal application. The draft,
    /// its number, and its initial fee records are written in one unit of work.
    pub fn create_application(
        &self,
        applicant: &ApplicantId,
        draft: ApplicationDraft,
    ) -> Result<Application, WorkflowError> {
        self.intake.validate(&draft)?;

        if let Some(request) = &draft.replacement {
            let previous = self
                .certificates
                .find_by_number(request.previous_certificate_number.trim())?;
            let eligible = previous.as_ref().is_some_and(|certificate| {
                &certificate.holder == applicant
                    && matches!(
                        certificate.status,
                        CertificateStatus::Active | CertificateStatus::Suspended
                    )
            });
            if !eligible {
                return Err(BusinessRuleViolation::ReplacementSourceInvalid(
                    request.previous_certificate_number.clone(),
                )
                .into());
            }
        }

        let now = self.now();
        let mut farm = draft.farm;
        farm.region = RegionCode::resolve(&farm.region, &farm.province);
        let risk_level = assess_risk(&farm);
        let payment = self.fees.initial_records(draft.application_type, now);

        let application = self.applications.unit_of_work(|uow| {
            if let Some(existing) = uow.find_active_by_applicant(applicant)? {
                return Err(BusinessRuleViolation::ActiveApplicationExists {
                    existing: existing.application_number,
                }
                .into());
            }

            let mut application_number = None;
            for _ in 0..NUMBER_ATTEMPTS {
                let candidate = generate_application_number(now);
                if uow.find_by_number(&candidate)?.is_none() {
                    application_number = Some(candidate);
                    break;
                }
            }
            let application_number = application_number.ok_or_else(|| {
                RepositoryError::Conflict("application number space exhausted".to_string())
            })?;

            let application = Application {
                application_id: ApplicationId::generate(),
                application_number,
                application_type: draft.application_type,
                applicant_type: draft.applicant_type,
                applicant: applicant.clone(),
                holder_name: draft.holder_name.trim().to_string(),
                farm,
                crops: draft.crops,
                replacement: draft.replacement,
                risk_level,
                status: ApplicationStatus::Draft,
                status_history: vec![StatusEntry {
                    state: ApplicationStatus::Draft,
                    actor: applicant.0.clone(),
                    timestamp: now,
                    note: "application created".to_string(),
                }],
                payment,
                revision_count: 0,
                documents: Vec::new(),
                assessment_scores: Vec::new(),
                assigned_officer: None,
                assigned_auditor: None,
                inspection_date: None,
                inspection_decision: None,
                appeal_deadline: None,
                reserved_certificate_number: None,
                certificate_id: None,
                created_at: now,
                submitted_at: None,
            };
            uow.create(application.clone())?;
            Ok::<_, WorkflowError>(application)
        })?;

        self.invalidate_listings();
        info!(
            application_id = %application.application_id,
            application_number = %application.application_number,
            application_type = application.application_type.label(),
            risk_level = ?application.risk_level,
            "application created"
        );
        self.announce(&application);
        Ok(application)
    }

    /// Record an uploaded document while the application is editable.
    pub fn attach_document(
        &self,
        id: &ApplicationId,
        kind: DocumentKind,
        locator: &str,
    ) -> Result<Application, WorkflowError> {
        if locator.trim().is_empty() {
            return Err(ValidationError::MissingField("locator").into());
        }

        let (application, ()) = self.mutate(id, |application, now| {
            if !application.status.is_editable() {
                return Err(BusinessRuleViolation::DocumentsLocked(application.status).into());
            }
            application.documents.push(Document {
                kind,
                locator: locator.trim().to_string(),
                uploaded_at: now,
            });
            Ok(())
        })?;
        Ok(application)
    }

    /// Submit (or resubmit) an application for review.
    ///
    /// New and renewal applications need the phase-1 fee; every type needs its
    /// document set. The least-loaded officer in the farm's region is assigned on
    /// first submission.
    pub fn submit_application(
        &self,
        id: &ApplicationId,
        actor: &str,
    ) -> Result<Application, WorkflowError> {
        let payments = &self.payments;
        let staff = &self.staff;
        let (application, newly_assigned) = self.mutate(id, |application, now| {
            if !matches!(
                application.status,
                ApplicationStatus::Draft | ApplicationStatus::RevisionRequired
            ) {
                return Err(BusinessRuleViolation::InvalidState {
                    operation: "submit",
                    status: application.status,
                }
                .into());
            }

            if !application.application_type.is_replacement() {
                payments.ensure_paid(application, PaymentPhase::Phase1)?;
            }

            let missing =
                missing_documents(application.application_type, &application.documents, now);
            if !missing.is_empty() {
                return Err(BusinessRuleViolation::MissingDocuments { missing }.into());
            }

            let mut newly_assigned = None;
            if application.assigned_officer.is_none() {
                let region = &application.farm.region;
                let officer = least_loaded(staff.officers_in_region(region)?).ok_or_else(|| {
                    BusinessRuleViolation::NoResourceAvailable {
                        role: StaffRole::Officer.label(),
                        region: region.to_string(),
                    }
                })?;
                application.assigned_officer = Some(officer.staff_id.clone());
                newly_assigned = Some(officer.staff_id);
            }

            let note = if application.revision_count > 0 {
                format!("resubmitted after revision {}", application.revision_count)
            } else {
                "submitted for review".to_string()
            };
            transition(application, ApplicationStatus::Submitted, actor, note, now)?;
            application.submitted_at = Some(now);
            Ok(newly_assigned)
        })?;

        if let Some(officer) = newly_assigned {
            if let Err(err) = self.staff.record_assignment(&officer) {
                warn!(staff_id = %officer, error = %err, "officer workload not updated");
            }
        }

        let trigger = if application.application_type.is_replacement() {
            AutoTrigger::OpenReplacementPayment
        } else {
            AutoTrigger::BeginReview
        };
        self.schedule_trigger(&application.application_id, trigger);
        Ok(application)
    }

    /// Expire applications left too long in an applicant-owned waiting state.
    pub fn expire_stalled_applications(&self) -> Result<Vec<ApplicationId>, WorkflowError> {
        let now = self.now();
        let timeouts = self.config.timeouts.clone();
        let mut candidates = Vec::new();

        for status in ApplicationStatus::ALL {
            if timeouts.timeout_for(status).is_none() {
                continue;
            }
            let filter = ApplicationFilter {
                status: Some(status),
                ..ApplicationFilter::default()
            };
            let mut offset = 0;
            loop {
                let page = Page::new(offset, Page::MAX_LIMIT);
                let batch = self.applications.find_all(&filter, page)?;
                let fetched = batch.len();
                candidates.extend(
                    batch
                        .into_iter()
                        .filter(|application| timeouts.is_stalled(application, now))
                        .map(|application| application.application_id),
                );
                if fetched < page.limit {
                    break;
                }
                offset += fetched;
            }
        }

        let mut expired = Vec::new();
        for id in candidates {
            let (_, did_expire) = self.mutate(&id, |application, now| {
                if !timeouts.is_stalled(application, now) {
                    return Ok(false);
                }
                let note = format!("expired after waiting in {}", application.status.label());
                transition(application, ApplicationStatus::Expired, "system", note, now)?;
                Ok(true)
            })?;
            if did_expire {
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "stalled applications expired");
        }
        Ok(expired)
    }
}
