use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{clean_reasons, require_status, CertificationEngine, CERTIFICATE_PRIORITY};
use crate::workflows::certification::cache::keys;
use crate::workflows::certification::certificates::{
    self, add_months, CertificateNumber, IssueRequest, VerificationFailure, VerificationResult,
};
use crate::workflows::certification::domain::{
    Application, ApplicationId, ApplicationStatus, Certificate, CertificateStatus, PaymentPhase,
    StaffId,
};
use crate::workflows::certification::errors::{
    BusinessRuleViolation, ValidationError, WorkflowError,
};
use crate::workflows::certification::notifications::{Notification, NotificationEvent};
use crate::workflows::certification::queue::{JobHandle, JobOptions, JobPayload};
use crate::workflows::certification::repository::{ApplicationRepository, CertificateRepository};
use crate::workflows::certification::scoring::ComplianceCategory;
use crate::workflows::certification::state_machine::{annotate, transition};

/// Acknowledgement for a deferred certificate generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateAck {
    pub application_id: ApplicationId,
    pub certificate_number: String,
    pub job: JobHandle,
}

/// Result of `final_approval`: the approved application and the pending certificate.
#[derive(Debug, Clone)]
pub struct FinalApproval {
    pub application: Application,
    pub certificate: CertificateAck,
}

impl<R, C> CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    /// Approve a settled application and queue its certificate.
    pub fn final_approval(
        &self,
        id: &ApplicationId,
        approver: &StaffId,
    ) -> Result<FinalApproval, WorkflowError> {
        let payments = &self.payments;
        let (application, ()) = self.mutate(id, |application, now| {
            match application.status {
                ApplicationStatus::Phase2PaymentVerified => {
                    payments.ensure_paid(application, PaymentPhase::Phase2)?;
                    let approved = application
                        .inspection_decision
                        .as_ref()
                        .is_some_and(|decision| !decision.outcome.is_rejection());
                    if !approved {
                        return Err(BusinessRuleViolation::InspectionMissing.into());
                    }
                }
                ApplicationStatus::ReplacementAdminCheck => {
                    payments.ensure_paid(application, PaymentPhase::Replacement)?;
                }
                status => {
                    return Err(BusinessRuleViolation::InvalidState {
                        operation: "final_approval",
                        status,
                    }
                    .into());
                }
            }
            transition(
                application,
                ApplicationStatus::Approved,
                &approver.0,
                "final approval granted",
                now,
            )?;
            Ok(())
        })?;

        let certificate = self.generate_certificate(id, approver)?;
        Ok(FinalApproval {
            application,
            certificate,
        })
    }

    /// Reserve the certificate number and hand generation to the task queue.
    ///
    /// Calling this again for the same application reuses the reserved number.
    pub fn generate_certificate(
        &self,
        id: &ApplicationId,
        approver: &StaffId,
    ) -> Result<CertificateAck, WorkflowError> {
        let store = &self.certificates;
        let prefix = self.issuer.policy().prefix.clone();

        let (application, number) = self.mutate(id, |application, now| {
            require_status(application, "generate_certificate", &[ApplicationStatus::Approved])?;
            if let Some(reserved) = &application.reserved_certificate_number {
                let number = CertificateNumber::parse(reserved).ok_or_else(|| {
                    ValidationError::MalformedCertificateNumber(reserved.clone())
                })?;
                return Ok(number);
            }
            let region = application.farm.region.clone();
            let year = now.year();
            let sequence = store.next_sequence(year, &region)?;
            let number = CertificateNumber::new(&prefix, year, region, sequence);
            application.reserved_certificate_number = Some(number.to_string());
            Ok(number)
        })?;

        let certificate_number = number.to_string();
        let payload = JobPayload::GenerateCertificate {
            application_id: application.application_id.clone(),
            approver: approver.clone(),
            certificate_number: certificate_number.clone(),
            year: number.year,
            sequence: number.sequence,
        };
        let options = JobOptions::immediate()
            .with_priority(CERTIFICATE_PRIORITY)
            .deduplicated(format!("certificate:{}", application.application_id));
        let job = self.dispatch(payload, options)?;

        info!(
            application_id = %application.application_id,
            certificate_number = %certificate_number,
            job_id = %job.job_id,
            "certificate generation queued"
        );
        Ok(CertificateAck {
            application_id: application.application_id,
            certificate_number,
            job,
        })
    }

    /// Build, sign, and store the certificate, then mark the application issued.
    ///
    /// Runs as the deferred generation job. Safe to retry: an existing certificate
    /// for the application is reused rather than issued twice.
    pub(crate) fn issue_certificate(
        &self,
        id: &ApplicationId,
        approver: &StaffId,
        certificate_number: &str,
        year: i32,
        sequence: u32,
    ) -> Result<Certificate, WorkflowError> {
        let application = self
            .applications
            .find_by_id(id)?
            .ok_or_else(|| BusinessRuleViolation::ApplicationNotFound(id.clone()))?;

        if application.status == ApplicationStatus::CertificateIssued {
            debug!(application_id = %id, "certificate already issued");
            return self
                .certificates
                .find_by_application(id)?
                .ok_or_else(|| {
                    BusinessRuleViolation::CertificateNotFound(certificate_number.to_string())
                        .into()
                });
        }
        require_status(&application, "issue_certificate", &[ApplicationStatus::Approved])?;

        let certificate = match self.certificates.find_by_application(id)? {
            Some(existing) => existing,
            None => {
                let number = CertificateNumber::parse(certificate_number)
                    .filter(|number| number.year == year && number.sequence == sequence)
                    .ok_or_else(|| {
                        ValidationError::MalformedCertificateNumber(certificate_number.to_string())
                    })?;
                self.build_certificate(&application, approver, number)?
            }
        };

        let certificate_id = certificate.certificate_id.clone();
        let note = format!("certificate {} issued", certificate.certificate_number);
        self.mutate(id, |application, now| {
            if application.status == ApplicationStatus::CertificateIssued {
                return Ok(());
            }
            require_status(application, "issue_certificate", &[ApplicationStatus::Approved])?;
            application.certificate_id = Some(certificate_id);
            transition(
                application,
                ApplicationStatus::CertificateIssued,
                "system",
                note,
                now,
            )?;
            Ok(())
        })?;

        info!(
            application_id = %id,
            certificate_number = %certificate.certificate_number,
            expiry_date = %certificate.expiry_date,
            "certificate issued"
        );
        Ok(certificate)
    }

    fn build_certificate(
        &self,
        application: &Application,
        approver: &StaffId,
        number: CertificateNumber,
    ) -> Result<Certificate, WorkflowError> {
        let now = self.now();

        let mut replaced = None;
        let (expiry_date, score) = match &application.replacement {
            Some(request) if application.application_type.is_replacement() => {
                let previous = self
                    .certificates
                    .find_by_number(request.previous_certificate_number.trim())?
                    .ok_or_else(|| {
                        BusinessRuleViolation::ReplacementSourceInvalid(
                            request.previous_certificate_number.clone(),
                        )
                    })?;
                let terms = (previous.expiry_date, previous.score);
                replaced = Some(previous);
                terms
            }
            _ => {
                let decision = application
                    .inspection_decision
                    .as_ref()
                    .ok_or(BusinessRuleViolation::InspectionMissing)?;
                let months = decision
                    .outcome
                    .validity_months()
                    .ok_or(BusinessRuleViolation::InspectionMissing)?;
                (add_months(now, months), decision.final_score)
            }
        };

        let certificate = self.issuer.build(IssueRequest {
            application,
            approver: approver.clone(),
            number,
            issue_date: now,
            expiry_date,
            score,
        })?;
        self.certificates.insert(certificate.clone())?;

        if let Some(previous) = replaced {
            self.retire_replaced(previous, &certificate, approver, now)?;
        }
        Ok(certificate)
    }

    fn retire_replaced(
        &self,
        mut previous: Certificate,
        replacement: &Certificate,
        approver: &StaffId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let reason = format!("replaced by {}", replacement.certificate_number);
        if let Err(err) = certificates::revoke(&mut previous, &reason, now) {
            warn!(
                certificate_number = %previous.certificate_number,
                error = %err,
                "replaced certificate left unchanged"
            );
            return Ok(());
        }
        self.certificates.save(previous.clone())?;
        self.invalidate_verification(&previous.certificate_number);

        let note = format!("certificate {} {reason}", previous.certificate_number);
        self.mutate(&previous.application_id, |application, now| {
            annotate(application, &approver.0, note, now);
            Ok(())
        })?;
        Ok(())
    }

    /// Public verification with outcome-dependent caching.
    pub fn verify_certificate(
        &self,
        certificate_number: &str,
        code: Option<&str>,
    ) -> Result<VerificationResult, WorkflowError> {
        let number = certificate_number.trim();
        let code = code
            .map(|code| code.trim().to_ascii_uppercase())
            .filter(|code| !code.is_empty());
        let key = keys::certificate_verification(number, code.as_deref());

        match self.cache.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<VerificationResult>(&raw) {
                Ok(cached) => return Ok(cached),
                Err(err) => warn!(key = %key, error = %err, "discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(err) => warn!(key = %key, error = %err, "cache read failed"),
        }

        let certificate = self.certificates.find_by_number(number)?;
        let result = self
            .issuer
            .verify(number, certificate.as_ref(), code.as_deref(), self.now())?;

        let ttls = &self.config.cache_ttls;
        let ttl = match result.reason {
            None | Some(VerificationFailure::Expired) => Some(ttls.verification_stable),
            Some(VerificationFailure::NotActive | VerificationFailure::InvalidCode) => {
                Some(ttls.verification_mutable)
            }
            Some(VerificationFailure::NotFound | VerificationFailure::SignatureMismatch) => None,
        };
        if let Some(ttl) = ttl {
            match serde_json::to_string(&result) {
                Ok(raw) => {
                    if let Err(err) = self.cache.set(&key, raw, ttl) {
                        warn!(key = %key, error = %err, "cache write failed");
                    }
                }
                Err(err) => warn!(key = %key, error = %err, "verification result not cached"),
            }
        }

        debug!(
            certificate_number = number,
            valid = result.valid,
            reason = result.reason.map(VerificationFailure::code),
            "certificate verified"
        );
        Ok(result)
    }

    fn load_certificate(&self, certificate_number: &str) -> Result<Certificate, WorkflowError> {
        let number = certificate_number.trim();
        self.certificates
            .find_by_number(number)?
            .ok_or_else(|| BusinessRuleViolation::CertificateNotFound(number.to_string()).into())
    }

    fn store_certificate(&self, certificate: &Certificate) -> Result<(), WorkflowError> {
        self.certificates.save(certificate.clone())?;
        self.invalidate_verification(&certificate.certificate_number);
        Ok(())
    }

    fn annotate_linked_application(
        &self,
        certificate: &Certificate,
        actor: &StaffId,
        note: String,
    ) -> Result<(), WorkflowError> {
        self.mutate(&certificate.application_id, |application, now| {
            annotate(application, &actor.0, note, now);
            Ok(())
        })?;
        Ok(())
    }

    fn certificate_notification(
        &self,
        event: NotificationEvent,
        certificate: &Certificate,
    ) -> Notification {
        Notification::new(
            event,
            certificate.application_id.clone(),
            &certificate.holder.0,
        )
        .with("certificate_number", &certificate.certificate_number)
        .with("status", certificate.status.label())
        .with("expiry_date", certificate.expiry_date.to_rfc3339())
    }

    /// Extend an active certificate inside the renewal window.
    ///
    /// With `recheck` points the compliance pass is rerun and must not reject;
    /// otherwise the stored score must still meet the conditional threshold.
    pub fn renew_certificate(
        &self,
        certificate_number: &str,
        actor: &StaffId,
        recheck: Option<&BTreeMap<ComplianceCategory, f64>>,
    ) -> Result<Certificate, WorkflowError> {
        let mut certificate = self.load_certificate(certificate_number)?;
        let required = self.scorer.config().conditional_threshold;

        match recheck {
            Some(points) => {
                let assessment = self.scorer.compliance(points);
                if assessment.outcome.is_rejection() {
                    return Err(BusinessRuleViolation::ScoreBelowThreshold {
                        score: assessment.score,
                        required,
                    }
                    .into());
                }
                certificate.score = assessment.score;
            }
            None if certificate.score < required => {
                return Err(BusinessRuleViolation::ScoreBelowThreshold {
                    score: certificate.score,
                    required,
                }
                .into());
            }
            None => {}
        }

        let entry = self.issuer.renew(&mut certificate, actor.clone(), self.now())?;
        self.store_certificate(&certificate)?;

        info!(
            certificate_number = %certificate.certificate_number,
            previous_expiry = %entry.previous_expiry,
            new_expiry = %entry.new_expiry,
            "certificate renewed"
        );
        self.notify(self.certificate_notification(NotificationEvent::CertificateRenewed, &certificate));
        Ok(certificate)
    }

    /// Permanently revoke a certificate and note it on the originating application.
    pub fn revoke_certificate(
        &self,
        certificate_number: &str,
        actor: &StaffId,
        reason: &str,
    ) -> Result<Certificate, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(ValidationError::MissingReason.into());
        }
        let mut certificate = self.load_certificate(certificate_number)?;
        certificates::revoke(&mut certificate, reason, self.now())?;
        self.store_certificate(&certificate)?;
        self.annotate_linked_application(
            &certificate,
            actor,
            format!(
                "certificate {} revoked: {}",
                certificate.certificate_number,
                reason.trim()
            ),
        )?;

        warn!(
            certificate_number = %certificate.certificate_number,
            reason = reason.trim(),
            "certificate revoked"
        );
        self.notify(
            self.certificate_notification(NotificationEvent::CertificateRevoked, &certificate)
                .with("reason", reason.trim()),
        );
        Ok(certificate)
    }

    /// Temporarily withdraw an active certificate.
    pub fn suspend_certificate(
        &self,
        certificate_number: &str,
        actor: &StaffId,
        reasons: Vec<String>,
    ) -> Result<Certificate, WorkflowError> {
        let reasons = clean_reasons(reasons)?;
        let mut certificate = self.load_certificate(certificate_number)?;
        certificates::suspend(&mut certificate)?;
        self.store_certificate(&certificate)?;
        self.annotate_linked_application(
            &certificate,
            actor,
            format!(
                "certificate {} suspended: {}",
                certificate.certificate_number,
                reasons.join("; ")
            ),
        )?;
        info!(certificate_number = %certificate.certificate_number, "certificate suspended");
        Ok(certificate)
    }

    pub fn reactivate_certificate(
        &self,
        certificate_number: &str,
        actor: &StaffId,
    ) -> Result<Certificate, WorkflowError> {
        let mut certificate = self.load_certificate(certificate_number)?;
        certificates::reactivate(&mut certificate)?;
        self.store_certificate(&certificate)?;
        self.annotate_linked_application(
            &certificate,
            actor,
            format!("certificate {} reactivated", certificate.certificate_number),
        )?;
        info!(certificate_number = %certificate.certificate_number, "certificate reactivated");
        Ok(certificate)
    }

    /// Mark active certificates past their expiry date as expired.
    pub fn expire_certificates(&self) -> Result<Vec<String>, WorkflowError> {
        let now = self.now();
        let mut expired = Vec::new();
        for mut certificate in self.certificates.active_expiring_before(now)? {
            if certificate.status != CertificateStatus::Active {
                continue;
            }
            certificate.status = CertificateStatus::Expired;
            self.store_certificate(&certificate)?;
            expired.push(certificate.certificate_number);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "certificates expired");
        }
        Ok(expired)
    }
}
