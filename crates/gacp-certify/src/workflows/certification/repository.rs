use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicantId, Application, ApplicationId, ApplicationStatus, ApplicationType, Certificate,
    CertificateId, RegionCode,
};

/// Listing filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_type: Option<ApplicationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant: Option<ApplicantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionCode>,
}

impl ApplicationFilter {
    pub fn matches(&self, application: &Application) -> bool {
        self.status.map_or(true, |status| application.status == status)
            && self
                .application_type
                .map_or(true, |kind| application.application_type == kind)
            && self
                .applicant
                .as_ref()
                .map_or(true, |applicant| &application.applicant == applicant)
            && self
                .region
                .as_ref()
                .map_or(true, |region| &application.farm.region == region)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 100;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

/// Transactional view handed to `unit_of_work` closures. Reads see staged writes.
pub trait ApplicationUnitOfWork {
    fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn find_by_number(&self, number: &str) -> Result<Option<Application>, RepositoryError>;
    fn find_active_by_applicant(
        &self,
        applicant: &ApplicantId,
    ) -> Result<Option<Application>, RepositoryError>;
    fn create(&mut self, application: Application) -> Result<(), RepositoryError>;
    fn save(&mut self, application: Application) -> Result<(), RepositoryError>;
}

/// Storage abstraction for applications.
///
/// `unit_of_work` must isolate concurrent callers: a closure's reads and staged
/// writes are committed together when it returns `Ok` and discarded otherwise.
pub trait ApplicationRepository: Send + Sync {
    fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn find_by_number(&self, number: &str) -> Result<Option<Application>, RepositoryError>;
    fn find_active_by_applicant(
        &self,
        applicant: &ApplicantId,
    ) -> Result<Option<Application>, RepositoryError>;
    fn find_all(
        &self,
        filter: &ApplicationFilter,
        page: Page,
    ) -> Result<Vec<Application>, RepositoryError>;
    fn count(&self, filter: &ApplicationFilter) -> Result<usize, RepositoryError>;
    fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ApplicationUnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Storage abstraction for issued certificates.
pub trait CertificateRepository: Send + Sync {
    fn find_by_number(&self, number: &str) -> Result<Option<Certificate>, RepositoryError>;
    fn find_by_id(&self, id: &CertificateId) -> Result<Option<Certificate>, RepositoryError>;
    fn find_by_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<Certificate>, RepositoryError>;
    fn insert(&self, certificate: Certificate) -> Result<(), RepositoryError>;
    fn save(&self, certificate: Certificate) -> Result<(), RepositoryError>;
    /// Reserve the next sequence for (year, region); never hands out the same value twice.
    fn next_sequence(&self, year: i32, region: &RegionCode) -> Result<u32, RepositoryError>;
    fn active_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Certificate>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
