use serde::{Deserialize, Serialize};

use super::domain::{RegionCode, StaffId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Officer,
    Auditor,
}

impl StaffRole {
    pub const fn label(self) -> &'static str {
        match self {
            StaffRole::Officer => "officer",
            StaffRole::Auditor => "auditor",
        }
    }
}

/// Staff member as exposed by the external directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub staff_id: StaffId,
    pub name: String,
    pub role: StaffRole,
    pub region: RegionCode,
    pub expertise: Vec<String>,
    pub active_workload: u32,
}

impl StaffProfile {
    pub fn covers_crop(&self, crop_type: &str) -> bool {
        self.expertise
            .iter()
            .any(|skill| skill.eq_ignore_ascii_case(crop_type.trim()))
    }
}

/// Directory of officers and auditors owned outside the engine.
pub trait StaffDirectory: Send + Sync {
    fn officers_in_region(&self, region: &RegionCode) -> Result<Vec<StaffProfile>, DirectoryError>;
    fn auditors(&self) -> Result<Vec<StaffProfile>, DirectoryError>;
    fn record_assignment(&self, staff_id: &StaffId) -> Result<(), DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("staff directory unavailable: {0}")]
    Unavailable(String),
    #[error("staff member {0} not found")]
    UnknownStaff(StaffId),
}

/// Lowest workload wins; ties resolve by identifier so selection is deterministic.
pub fn least_loaded(candidates: Vec<StaffProfile>) -> Option<StaffProfile> {
    candidates
        .into_iter()
        .min_by(|a, b| {
            a.active_workload
                .cmp(&b.active_workload)
                .then_with(|| a.staff_id.cmp(&b.staff_id))
        })
}
