use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::CertificationEngine;
use crate::workflows::certification::cache::keys;
use crate::workflows::certification::domain::{Application, ApplicationId, ApplicationStatus};
use crate::workflows::certification::errors::{BusinessRuleViolation, WorkflowError};
use crate::workflows::certification::queue::{JobId, JobStatus};
use crate::workflows::certification::repository::{
    ApplicationFilter, ApplicationRepository, CertificateRepository, Page,
};

/// One page of `list_applications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPage {
    pub items: Vec<Application>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Application counts keyed by status label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
}

impl<R, C> CertificationEngine<R, C>
where
    R: ApplicationRepository + 'static,
    C: CertificateRepository + 'static,
{
    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(key, error = %err, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    fn store_cached<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "value not cached");
                return;
            }
        };
        if let Err(err) = self.cache.set(key, raw, ttl_secs) {
            warn!(key, error = %err, "cache write failed");
        }
    }

    /// Read-through lookup of a single application.
    pub fn get_application(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        let key = keys::application(id);
        if let Some(application) = self.cached::<Application>(&key) {
            return Ok(application);
        }
        let application = self
            .applications
            .find_by_id(id)?
            .ok_or_else(|| BusinessRuleViolation::ApplicationNotFound(id.clone()))?;
        self.store_cached(&key, &application, self.config.cache_ttls.application);
        Ok(application)
    }

    pub fn list_applications(
        &self,
        filter: &ApplicationFilter,
        page: Page,
    ) -> Result<ApplicationPage, WorkflowError> {
        let fingerprint = format!(
            "{}:{}:{}",
            serde_json::to_string(filter)?,
            page.offset,
            page.limit
        );
        let key = keys::application_list(&fingerprint);
        if let Some(listing) = self.cached::<ApplicationPage>(&key) {
            return Ok(listing);
        }

        let listing = ApplicationPage {
            items: self.applications.find_all(filter, page)?,
            total: self.applications.count(filter)?,
            offset: page.offset,
            limit: page.limit,
        };
        self.store_cached(&key, &listing, self.config.cache_ttls.list);
        Ok(listing)
    }

    /// Counts per status, including zero rows for every state.
    pub fn status_summary(&self) -> Result<StatusSummary, WorkflowError> {
        if let Some(summary) = self.cached::<StatusSummary>(keys::STATUS_SUMMARY) {
            return Ok(summary);
        }

        let mut counts = BTreeMap::new();
        for status in ApplicationStatus::ALL {
            let filter = ApplicationFilter {
                status: Some(status),
                ..ApplicationFilter::default()
            };
            counts.insert(status.label().to_string(), self.applications.count(&filter)?);
        }
        let summary = StatusSummary {
            total: counts.values().sum(),
            counts,
        };
        self.store_cached(keys::STATUS_SUMMARY, &summary, self.config.cache_ttls.stats);
        Ok(summary)
    }

    pub fn job_status(&self, job_id: JobId) -> Result<Option<JobStatus>, WorkflowError> {
        Ok(self.queue.status(job_id)?)
    }
}
