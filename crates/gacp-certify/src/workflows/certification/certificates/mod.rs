//! Certificate numbering, signing, verification, and lifecycle rules.
//!
//! Everything here is pure with respect to storage; the engine owns persistence,
//! caching, and the deferred generation job.

mod numbering;
mod signing;

pub use numbering::{generate_verification_code, is_valid_prefix, CertificateNumber};
pub use signing::{HmacSha256Signer, PayloadSigner, SigningError};

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, Certificate, CertificateId, CertificateStatus, RenewalEntry, StaffId,
};
use super::errors::BusinessRuleViolation;

/// Issuance and lifecycle dials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePolicy {
    pub prefix: String,
    pub validity_months: u32,
    pub renewal_window_days: i64,
}

impl Default for CertificatePolicy {
    fn default() -> Self {
        Self {
            prefix: "GACP".to_string(),
            validity_months: 24,
            renewal_window_days: 90,
        }
    }
}

/// Why a verification attempt failed. Each maps to a distinct reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailure {
    NotFound,
    NotActive,
    Expired,
    SignatureMismatch,
    InvalidCode,
}

impl VerificationFailure {
    pub const fn code(self) -> &'static str {
        match self {
            VerificationFailure::NotFound => "not_found",
            VerificationFailure::NotActive => "not_active",
            VerificationFailure::Expired => "expired",
            VerificationFailure::SignatureMismatch => "signature_mismatch",
            VerificationFailure::InvalidCode => "invalid_code",
        }
    }
}

/// Cacheable result of `verify_certificate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub certificate_number: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<VerificationFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CertificateStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
}

impl VerificationResult {
    fn invalid(number: &str, reason: VerificationFailure, certificate: Option<&Certificate>) -> Self {
        Self {
            certificate_number: number.to_string(),
            valid: false,
            reason: Some(reason),
            status: certificate.map(|cert| cert.status),
            holder_name: None,
            farm_name: None,
            expiry_date: certificate.map(|cert| cert.expiry_date),
        }
    }

    fn valid(certificate: &Certificate) -> Self {
        Self {
            certificate_number: certificate.certificate_number.clone(),
            valid: true,
            reason: None,
            status: Some(certificate.status),
            holder_name: Some(certificate.holder_name.clone()),
            farm_name: Some(certificate.farm_name.clone()),
            expiry_date: Some(certificate.expiry_date),
        }
    }
}

/// Canonical payload covered by the digital signature.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedPayload<'a> {
    certificate_number: &'a str,
    farmer_name: &'a str,
    farm_name: &'a str,
    issue_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    final_score: f64,
    verification_code: &'a str,
}

pub fn canonical_payload(certificate: &Certificate) -> Result<Vec<u8>, SigningError> {
    serde_json::to_vec(&SignedPayload {
        certificate_number: &certificate.certificate_number,
        farmer_name: &certificate.holder_name,
        farm_name: &certificate.farm_name,
        issue_date: certificate.issue_date,
        expiry_date: certificate.expiry_date,
        final_score: certificate.score,
        verification_code: &certificate.verification_code,
    })
    .map_err(|err| SigningError::Payload(err.to_string()))
}

pub fn add_months(from: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    from.checked_add_months(Months::new(months))
        .unwrap_or_else(|| from + Duration::days(i64::from(months) * 30))
}

/// Inputs for building a signed certificate.
#[derive(Debug, Clone)]
pub struct IssueRequest<'a> {
    pub application: &'a Application,
    pub approver: StaffId,
    pub number: CertificateNumber,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub score: f64,
}

/// Builds, signs, verifies, and transitions certificates.
pub struct CertificateIssuer {
    policy: CertificatePolicy,
    signer: Arc<dyn PayloadSigner>,
}

impl CertificateIssuer {
    pub fn new(policy: CertificatePolicy, signer: Arc<dyn PayloadSigner>) -> Self {
        Self { policy, signer }
    }

    pub fn policy(&self) -> &CertificatePolicy {
        &self.policy
    }

    pub fn build(&self, request: IssueRequest<'_>) -> Result<Certificate, SigningError> {
        let application = request.application;
        let mut certificate = Certificate {
            certificate_id: CertificateId::generate(),
            certificate_number: request.number.to_string(),
            application_id: application.application_id.clone(),
            holder: application.applicant.clone(),
            holder_name: application.holder_name.clone(),
            farm_name: application.farm.farm_name.clone(),
            region: request.number.region.clone(),
            year: request.number.year,
            sequence: request.number.sequence,
            status: CertificateStatus::Active,
            issue_date: request.issue_date,
            expiry_date: request.expiry_date,
            score: request.score,
            verification_code: generate_verification_code(),
            digital_signature: String::new(),
            signature_algorithm: self.signer.algorithm().to_string(),
            approved_by: request.approver,
            renewal_history: Vec::new(),
            revoked_at: None,
            revocation_reason: None,
        };
        self.resign(&mut certificate)?;
        Ok(certificate)
    }

    pub fn resign(&self, certificate: &mut Certificate) -> Result<(), SigningError> {
        let payload = canonical_payload(certificate)?;
        certificate.digital_signature = self.signer.sign(&payload)?;
        certificate.signature_algorithm = self.signer.algorithm().to_string();
        Ok(())
    }

    /// Check order: missing, status, expiry, signature, then the caller's code.
    pub fn verify(
        &self,
        number: &str,
        certificate: Option<&Certificate>,
        code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VerificationResult, SigningError> {
        let Some(certificate) = certificate else {
            return Ok(VerificationResult::invalid(
                number,
                VerificationFailure::NotFound,
                None,
            ));
        };

        let failure = match certificate.status {
            CertificateStatus::Active if now > certificate.expiry_date => {
                Some(VerificationFailure::Expired)
            }
            CertificateStatus::Active => None,
            CertificateStatus::Expired => Some(VerificationFailure::Expired),
            CertificateStatus::Revoked | CertificateStatus::Suspended => {
                Some(VerificationFailure::NotActive)
            }
        };
        if let Some(failure) = failure {
            return Ok(VerificationResult::invalid(number, failure, Some(certificate)));
        }

        let payload = canonical_payload(certificate)?;
        if !self.signer.verify(&payload, &certificate.digital_signature)? {
            return Ok(VerificationResult::invalid(
                number,
                VerificationFailure::SignatureMismatch,
                Some(certificate),
            ));
        }

        if let Some(code) = code {
            if !code.trim().eq_ignore_ascii_case(&certificate.verification_code) {
                return Ok(VerificationResult::invalid(
                    number,
                    VerificationFailure::InvalidCode,
                    Some(certificate),
                ));
            }
        }

        Ok(VerificationResult::valid(certificate))
    }

    pub fn days_to_expiry(certificate: &Certificate, now: DateTime<Utc>) -> i64 {
        (certificate.expiry_date - now).num_days()
    }

    /// Extend an active certificate inside the renewal window and re-sign it.
    pub fn renew(
        &self,
        certificate: &mut Certificate,
        renewed_by: StaffId,
        now: DateTime<Utc>,
    ) -> Result<RenewalEntry, RenewalError> {
        if certificate.status != CertificateStatus::Active {
            return Err(BusinessRuleViolation::CertificateTransitionNotAllowed {
                number: certificate.certificate_number.clone(),
                operation: "renewed",
                status: certificate.status,
            }
            .into());
        }

        let days_to_expiry = Self::days_to_expiry(certificate, now);
        if days_to_expiry > self.policy.renewal_window_days {
            return Err(BusinessRuleViolation::RenewalWindowClosed {
                number: certificate.certificate_number.clone(),
                days_to_expiry,
            }
            .into());
        }

        let base = certificate.expiry_date.max(now);
        let entry = RenewalEntry {
            renewed_at: now,
            renewed_by,
            previous_expiry: certificate.expiry_date,
            new_expiry: add_months(base, self.policy.validity_months),
        };
        certificate.expiry_date = entry.new_expiry;
        certificate.renewal_history.push(entry.clone());
        self.resign(certificate)?;
        Ok(entry)
    }
}

/// One-way transition to `revoked`.
pub fn revoke(
    certificate: &mut Certificate,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), BusinessRuleViolation> {
    if certificate.status == CertificateStatus::Revoked {
        return Err(BusinessRuleViolation::CertificateTransitionNotAllowed {
            number: certificate.certificate_number.clone(),
            operation: "revoked",
            status: certificate.status,
        });
    }
    certificate.status = CertificateStatus::Revoked;
    certificate.revoked_at = Some(now);
    certificate.revocation_reason = Some(reason.trim().to_string());
    Ok(())
}

pub fn suspend(certificate: &mut Certificate) -> Result<(), BusinessRuleViolation> {
    if certificate.status != CertificateStatus::Active {
        return Err(BusinessRuleViolation::CertificateTransitionNotAllowed {
            number: certificate.certificate_number.clone(),
            operation: "suspended",
            status: certificate.status,
        });
    }
    certificate.status = CertificateStatus::Suspended;
    Ok(())
}

/// `suspended -> active` is the only backwards transition.
pub fn reactivate(certificate: &mut Certificate) -> Result<(), BusinessRuleViolation> {
    if certificate.status != CertificateStatus::Suspended {
        return Err(BusinessRuleViolation::CertificateTransitionNotAllowed {
            number: certificate.certificate_number.clone(),
            operation: "reactivated",
            status: certificate.status,
        });
    }
    certificate.status = CertificateStatus::Active;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    #[error(transparent)]
    Rule(#[from] BusinessRuleViolation),
    #[error(transparent)]
    Signing(#[from] SigningError),
}
