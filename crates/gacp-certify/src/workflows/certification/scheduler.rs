use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Application, PaymentPhase, StaffId};
use super::errors::{BusinessRuleViolation, WorkflowError};
use super::staff::{least_loaded, StaffDirectory, StaffRole};

/// Auditor and date chosen for an on-site inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionSlot {
    pub auditor: StaffId,
    pub date: DateTime<Utc>,
    pub estimated_hours: u32,
}

/// Picks an auditor and a legal inspection date for an application.
pub trait InspectionScheduler: Send + Sync {
    fn schedule(
        &self,
        application: &Application,
        preferred_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<InspectionSlot, WorkflowError>;
}

pub const BASE_INSPECTION_HOURS: u32 = 4;
pub const RAI_PER_EXTRA_HOUR: f64 = 5.0;

/// Estimated on-site hours: base + one per started five rai + one per crop category.
pub fn estimate_duration_hours(area_rai: f64, categories: usize) -> u32 {
    let area = if area_rai.is_finite() && area_rai > 0.0 {
        area_rai
    } else {
        0.0
    };
    // `as` saturates at u32::MAX for oversized areas.
    let size_hours = (area / RAI_PER_EXTRA_HOUR).ceil() as u32;
    let category_hours = u32::try_from(categories).unwrap_or(u32::MAX);
    BASE_INSPECTION_HOURS
        .saturating_add(size_hours)
        .saturating_add(category_hours)
}

/// Earliest legal date given the caller's preference and the notice period.
pub fn inspection_date(
    preferred: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    minimum_notice: Duration,
) -> DateTime<Utc> {
    let earliest = now + minimum_notice;
    match preferred {
        Some(date) if date > earliest => date,
        _ => earliest,
    }
}

/// Scheduler that draws from the staff directory's auditor pool.
pub struct AuditorPoolScheduler {
    directory: Arc<dyn StaffDirectory>,
    minimum_notice: Duration,
}

impl AuditorPoolScheduler {
    pub fn new(directory: Arc<dyn StaffDirectory>, minimum_notice_days: i64) -> Self {
        Self {
            directory,
            minimum_notice: Duration::days(minimum_notice_days.max(0)),
        }
    }
}

impl InspectionScheduler for AuditorPoolScheduler {
    fn schedule(
        &self,
        application: &Application,
        preferred_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<InspectionSlot, WorkflowError> {
        if !application.is_paid(PaymentPhase::Phase2) {
            return Err(BusinessRuleViolation::PaymentRequired {
                phase: PaymentPhase::Phase2,
            }
            .into());
        }

        let region = &application.farm.region;
        let qualified: Vec<_> = self
            .directory
            .auditors()?
            .into_iter()
            .filter(|auditor| auditor.role == StaffRole::Auditor && &auditor.region == region)
            .filter(|auditor| {
                application
                    .crops
                    .iter()
                    .all(|crop| auditor.covers_crop(&crop.crop_type))
            })
            .collect();

        let auditor = least_loaded(qualified).ok_or_else(|| {
            BusinessRuleViolation::NoResourceAvailable {
                role: StaffRole::Auditor.label(),
                region: region.to_string(),
            }
        })?;

        Ok(InspectionSlot {
            auditor: auditor.staff_id,
            date: inspection_date(preferred_date, now, self.minimum_notice),
            estimated_hours: estimate_duration_hours(
                application.farm.total_area_rai,
                application.crops.len(),
            ),
        })
    }
}
