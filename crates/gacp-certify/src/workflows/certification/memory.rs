//! Reference in-memory adapters for the collaborator traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    ApplicantId, Application, ApplicationId, Certificate, CertificateId, CertificateStatus,
    RegionCode, StaffId,
};
use super::notifications::{Notification, NotificationDispatcher, NotificationError};
use super::repository::{
    ApplicationFilter, ApplicationRepository, ApplicationUnitOfWork, CertificateRepository,
    Page, RepositoryError,
};
use super::staff::{DirectoryError, StaffDirectory, StaffProfile, StaffRole};

fn poisoned(name: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("{name} mutex poisoned"))
}

/// Application store whose unit of work holds the table lock for the whole closure.
#[derive(Default)]
pub struct InMemoryApplicationRepository {
    records: Mutex<BTreeMap<ApplicationId, Application>>,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<ApplicationId, Application>>, RepositoryError> {
        self.records.lock().map_err(|_| poisoned("application"))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn active_for<'a>(
    mut candidates: impl Iterator<Item = &'a Application>,
    applicant: &ApplicantId,
) -> Option<Application> {
    candidates
        .find(|application| &application.applicant == applicant && !application.status.is_terminal())
        .cloned()
}

struct StagedUnitOfWork<'a> {
    committed: &'a BTreeMap<ApplicationId, Application>,
    staged: BTreeMap<ApplicationId, Application>,
}

impl StagedUnitOfWork<'_> {
    fn view(&self) -> Vec<&Application> {
        self.committed
            .iter()
            .filter(|(id, _)| !self.staged.contains_key(*id))
            .map(|(_, application)| application)
            .chain(self.staged.values())
            .collect()
    }
}

impl ApplicationUnitOfWork for StagedUnitOfWork<'_> {
    fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self
            .staged
            .get(id)
            .or_else(|| self.committed.get(id))
            .cloned())
    }

    fn find_by_number(&self, number: &str) -> Result<Option<Application>, RepositoryError> {
        Ok(self
            .view()
            .into_iter()
            .find(|application| application.application_number == number)
            .cloned())
    }

    fn find_active_by_applicant(
        &self,
        applicant: &ApplicantId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(active_for(self.view().into_iter(), applicant))
    }

    fn create(&mut self, application: Application) -> Result<(), RepositoryError> {
        let id = &application.application_id;
        if self.committed.contains_key(id) || self.staged.contains_key(id) {
            return Err(RepositoryError::Conflict(id.to_string()));
        }
        if self
            .view()
            .iter()
            .any(|existing| existing.application_number == application.application_number)
        {
            return Err(RepositoryError::Conflict(
                application.application_number.clone(),
            ));
        }
        self.staged.insert(id.clone(), application);
        Ok(())
    }

    fn save(&mut self, application: Application) -> Result<(), RepositoryError> {
        let id = &application.application_id;
        if !self.committed.contains_key(id) && !self.staged.contains_key(id) {
            return Err(RepositoryError::NotFound);
        }
        self.staged.insert(id.clone(), application);
        Ok(())
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn find_by_number(&self, number: &str) -> Result<Option<Application>, RepositoryError> {
        Ok(self
            .lock()?
            .values()
            .find(|application| application.application_number == number)
            .cloned())
    }

    fn find_active_by_applicant(
        &self,
        applicant: &ApplicantId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(active_for(self.lock()?.values(), applicant))
    }

    fn find_all(
        &self,
        filter: &ApplicationFilter,
        page: Page,
    ) -> Result<Vec<Application>, RepositoryError> {
        let records = self.lock()?;
        let mut matching: Vec<&Application> = records
            .values()
            .filter(|application| filter.matches(application))
            .collect();
        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.application_id.cmp(&b.application_id))
        });
        Ok(matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    fn count(&self, filter: &ApplicationFilter) -> Result<usize, RepositoryError> {
        Ok(self
            .lock()?
            .values()
            .filter(|application| filter.matches(application))
            .count())
    }

    fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ApplicationUnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut records = self.lock()?;
        let (result, staged) = {
            let mut uow = StagedUnitOfWork {
                committed: &*records,
                staged: BTreeMap::new(),
            };
            let result = work(&mut uow)?;
            (result, uow.staged)
        };
        records.extend(staged);
        Ok(result)
    }
}

#[derive(Default)]
struct CertificateTable {
    records: BTreeMap<CertificateId, Certificate>,
    sequences: HashMap<(i32, RegionCode), u32>,
}

/// Certificate store with an atomic per-(year, region) sequence.
#[derive(Default)]
pub struct InMemoryCertificateRepository {
    table: Mutex<CertificateTable>,
}

impl InMemoryCertificateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CertificateTable>, RepositoryError> {
        self.table.lock().map_err(|_| poisoned("certificate"))
    }

    pub fn all(&self) -> Result<Vec<Certificate>, RepositoryError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }
}

impl CertificateRepository for InMemoryCertificateRepository {
    fn find_by_number(&self, number: &str) -> Result<Option<Certificate>, RepositoryError> {
        Ok(self
            .lock()?
            .records
            .values()
            .find(|certificate| certificate.certificate_number == number)
            .cloned())
    }

    fn find_by_id(&self, id: &CertificateId) -> Result<Option<Certificate>, RepositoryError> {
        Ok(self.lock()?.records.get(id).cloned())
    }

    fn find_by_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<Certificate>, RepositoryError> {
        Ok(self
            .lock()?
            .records
            .values()
            .find(|certificate| &certificate.application_id == application_id)
            .cloned())
    }

    fn insert(&self, certificate: Certificate) -> Result<(), RepositoryError> {
        let mut table = self.lock()?;
        if table.records.contains_key(&certificate.certificate_id)
            || table
                .records
                .values()
                .any(|existing| existing.certificate_number == certificate.certificate_number)
        {
            return Err(RepositoryError::Conflict(
                certificate.certificate_number.clone(),
            ));
        }
        table
            .records
            .insert(certificate.certificate_id.clone(), certificate);
        Ok(())
    }

    fn save(&self, certificate: Certificate) -> Result<(), RepositoryError> {
        let mut table = self.lock()?;
        match table.records.get_mut(&certificate.certificate_id) {
            Some(existing) => {
                *existing = certificate;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn next_sequence(&self, year: i32, region: &RegionCode) -> Result<u32, RepositoryError> {
        let mut table = self.lock()?;
        let highest_stored = table
            .records
            .values()
            .filter(|certificate| certificate.year == year && &certificate.region == region)
            .map(|certificate| certificate.sequence)
            .max()
            .unwrap_or(0);
        let counter = table
            .sequences
            .entry((year, region.clone()))
            .or_insert(0);
        let next = (*counter).max(highest_stored) + 1;
        *counter = next;
        Ok(next)
    }

    fn active_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Certificate>, RepositoryError> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|certificate| {
                certificate.status == CertificateStatus::Active && certificate.expiry_date < cutoff
            })
            .cloned()
            .collect())
    }
}

/// Staff directory seeded with fixed profiles; assignments bump the workload counter.
#[derive(Default)]
pub struct InMemoryStaffDirectory {
    staff: Mutex<Vec<StaffProfile>>,
}

impl InMemoryStaffDirectory {
    pub fn with_staff(staff: Vec<StaffProfile>) -> Self {
        Self {
            staff: Mutex::new(staff),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<StaffProfile>>, DirectoryError> {
        self.staff
            .lock()
            .map_err(|_| DirectoryError::Unavailable("staff mutex poisoned".to_string()))
    }

    pub fn workload_of(&self, staff_id: &StaffId) -> Option<u32> {
        self.lock().ok().and_then(|staff| {
            staff
                .iter()
                .find(|profile| &profile.staff_id == staff_id)
                .map(|profile| profile.active_workload)
        })
    }
}

impl StaffDirectory for InMemoryStaffDirectory {
    fn officers_in_region(&self, region: &RegionCode) -> Result<Vec<StaffProfile>, DirectoryError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|profile| profile.role == StaffRole::Officer && &profile.region == region)
            .cloned()
            .collect())
    }

    fn auditors(&self) -> Result<Vec<StaffProfile>, DirectoryError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|profile| profile.role == StaffRole::Auditor)
            .cloned()
            .collect())
    }

    fn record_assignment(&self, staff_id: &StaffId) -> Result<(), DirectoryError> {
        let mut staff = self.lock()?;
        let profile = staff
            .iter_mut()
            .find(|profile| &profile.staff_id == staff_id)
            .ok_or_else(|| DirectoryError::UnknownStaff(staff_id.clone()))?;
        profile.active_workload += 1;
        Ok(())
    }
}

/// Dispatcher that records every notification it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .map_err(|_| NotificationError::Transport("recorder mutex poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
