use super::cache::CacheError;
use super::certificates::{RenewalError, SigningError};
use super::domain::{ApplicationId, ApplicationStatus, CertificateStatus, PaymentPhase};
use super::notifications::NotificationError;
use super::queue::QueueError;
use super::repository::RepositoryError;
use super::staff::DirectoryError;

/// Coarse classification used by callers to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BusinessLogic,
    Infrastructure,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::BusinessLogic => "business_logic",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

/// Error surfaced by every engine operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    BusinessLogic(#[from] BusinessRuleViolation),
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::BusinessLogic(_) => ErrorKind::BusinessLogic,
            WorkflowError::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }

    /// Only infrastructure failures may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::Infrastructure(_))
    }
}

/// Malformed or incomplete caller input.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("required field '{0}' is missing or blank")]
    MissingField(&'static str),
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown payment phase '{0}'")]
    UnknownPaymentPhase(String),
    #[error("a reason is required")]
    MissingReason,
    #[error("certificate number '{0}' is malformed")]
    MalformedCertificateNumber(String),
}

/// A real-world precondition has not been met.
#[derive(Debug, thiserror::Error)]
pub enum BusinessRuleViolation {
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("certificate {0} not found")]
    CertificateNotFound(String),
    #[error("applicant already has active application {existing}")]
    ActiveApplicationExists { existing: String },
    #[error("operation '{operation}' is not allowed while application is {status}")]
    InvalidState {
        operation: &'static str,
        status: ApplicationStatus,
    },
    #[error("transition {from} -> {to} is not allowed")]
    TransitionNotAllowed {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("{phase} payment has not been completed")]
    PaymentRequired { phase: PaymentPhase },
    #[error("{phase} payment is already completed")]
    PaymentAlreadyCompleted { phase: PaymentPhase },
    #[error("{phase} payment has not been opened for this application")]
    PaymentNotOpened { phase: PaymentPhase },
    #[error("required documents missing: {}", missing.join(", "))]
    MissingDocuments { missing: Vec<String> },
    #[error("documents can only be attached while the application is editable (currently {0})")]
    DocumentsLocked(ApplicationStatus),
    #[error("no {role} available for region {region}")]
    NoResourceAvailable { role: &'static str, region: String },
    #[error("compliance score {score:.1} is below the required {required:.1}")]
    ScoreBelowThreshold { score: f64, required: f64 },
    #[error("inspection has not been recorded for this application")]
    InspectionMissing,
    #[error("certificate {number} is {status:?}")]
    CertificateNotActive {
        number: String,
        status: CertificateStatus,
    },
    #[error("certificate {number} cannot be {operation} while {status:?}")]
    CertificateTransitionNotAllowed {
        number: String,
        operation: &'static str,
        status: CertificateStatus,
    },
    #[error("certificate {number} is outside the renewal window ({days_to_expiry} days to expiry)")]
    RenewalWindowClosed { number: String, days_to_expiry: i64 },
    #[error("previous certificate {0} is not eligible for replacement")]
    ReplacementSourceInvalid(String),
}

/// A collaborator failed; the operation may succeed on retry.
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(value: RepositoryError) -> Self {
        Self::Infrastructure(InfrastructureError::Repository(value))
    }
}

impl From<QueueError> for WorkflowError {
    fn from(value: QueueError) -> Self {
        Self::Infrastructure(InfrastructureError::Queue(value))
    }
}

impl From<DirectoryError> for WorkflowError {
    fn from(value: DirectoryError) -> Self {
        Self::Infrastructure(InfrastructureError::Directory(value))
    }
}

impl From<SigningError> for WorkflowError {
    fn from(value: SigningError) -> Self {
        Self::Infrastructure(InfrastructureError::Signing(value))
    }
}

impl From<RenewalError> for WorkflowError {
    fn from(value: RenewalError) -> Self {
        match value {
            RenewalError::Rule(rule) => Self::BusinessLogic(rule),
            RenewalError::Signing(err) => err.into(),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(value: serde_json::Error) -> Self {
        Self::Infrastructure(InfrastructureError::Serialization(value.to_string()))
    }
}
