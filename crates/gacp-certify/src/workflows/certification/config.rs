use super::cache::CacheTtls;
use super::certificates::CertificatePolicy;
use super::fees::FeeSchedule;
use super::revisions::RevisionTracker;
use super::scoring::ScoringConfig;
use super::state_machine::StallTimeouts;

/// Business constants for the certification workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub fees: FeeSchedule,
    pub scoring: ScoringConfig,
    pub certificates: CertificatePolicy,
    pub cache_ttls: CacheTtls,
    pub timeouts: StallTimeouts,
    pub revision_penalty_threshold: u32,
    pub minimum_notice_days: i64,
    pub appeal_window_days: i64,
    pub auto_transition_delay_secs: i64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            scoring: ScoringConfig::default(),
            certificates: CertificatePolicy::default(),
            cache_ttls: CacheTtls::default(),
            timeouts: StallTimeouts::default(),
            revision_penalty_threshold: RevisionTracker::DEFAULT_THRESHOLD,
            minimum_notice_days: 14,
            appeal_window_days: 30,
            auto_transition_delay_secs: 1,
        }
    }
}

impl WorkflowConfig {
    /// Full-approval validity drives both first issuance and renewal.
    pub fn set_certificate_validity(&mut self, months: u32) {
        self.certificates.validity_months = months;
        self.scoring.approved_validity_months = months;
    }
}
