//! GACP farm certification workflow.
//!
//! The engine drives applications through intake, document review, phase
//! payments, on-site inspection, and certificate issuance. Storage, staff,
//! notifications, the task queue, and the cache are injected collaborators;
//! `memory` provides in-process implementations of each.

pub mod cache;
pub mod certificates;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod fees;
pub mod intake;
pub mod memory;
pub mod notifications;
pub mod payments;
pub mod queue;
pub mod repository;
pub mod revisions;
pub mod scheduler;
pub mod scoring;
pub mod staff;
pub mod state_machine;

#[cfg(test)]
mod tests;

pub use cache::{Cache, CacheError, InMemoryCache, NoopCache};
pub use certificates::{
    CertificateIssuer, CertificateNumber, CertificatePolicy, HmacSha256Signer, PayloadSigner,
    SigningError, VerificationFailure, VerificationResult,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WorkflowConfig;
pub use domain::{
    ApplicantId, ApplicantType, Application, ApplicationDraft, ApplicationId, ApplicationStatus,
    ApplicationType, Certificate, CertificateStatus, Coordinates, CropInformation, DocumentKind,
    FarmInformation, FarmingSystem, PaymentMethod, PaymentPhase, RegionCode,
    ReplacementRequest, RiskLevel, StaffId, WaterQuality,
};
pub use engine::{
    ApplicationPage, CertificateAck, CertificationEngine, Collaborators, FinalApproval,
    StatusSummary,
};
pub use errors::{
    BusinessRuleViolation, ErrorKind, InfrastructureError, ValidationError, WorkflowError,
};
pub use fees::{FeeCalculator, FeeQuote, FeeSchedule};
pub use notifications::{Notification, NotificationDispatcher, NotificationError, NotificationEvent};
pub use payments::{LedgerPaymentGate, PaymentConfirmation, PaymentGate};
pub use queue::{
    InMemoryTaskQueue, JobHandle, JobId, JobState, JobStatus, RetryPolicy, SynchronousTaskQueue,
    TaskQueue,
};
pub use repository::{ApplicationFilter, ApplicationRepository, CertificateRepository, Page};
pub use scheduler::{estimate_duration_hours, AuditorPoolScheduler, InspectionScheduler, InspectionSlot};
pub use scoring::{ComplianceCategory, ComplianceOutcome, DocumentReview, ScoringConfig};
pub use staff::{StaffDirectory, StaffProfile, StaffRole};
