use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::ScoringConfig;

/// Fixed on-site inspection categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceCategory {
    SeedPlantingMaterial,
    SoilManagement,
    PestDiseaseManagement,
    HarvestingPractices,
    PostHarvestHandling,
    StorageTransportation,
    RecordKeeping,
    WorkerTraining,
}

impl ComplianceCategory {
    pub const ALL: [ComplianceCategory; 8] = [
        ComplianceCategory::SeedPlantingMaterial,
        ComplianceCategory::SoilManagement,
        ComplianceCategory::PestDiseaseManagement,
        ComplianceCategory::HarvestingPractices,
        ComplianceCategory::PostHarvestHandling,
        ComplianceCategory::StorageTransportation,
        ComplianceCategory::RecordKeeping,
        ComplianceCategory::WorkerTraining,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ComplianceCategory::SeedPlantingMaterial => "seed_planting_material",
            ComplianceCategory::SoilManagement => "soil_management",
            ComplianceCategory::PestDiseaseManagement => "pest_disease_management",
            ComplianceCategory::HarvestingPractices => "harvesting_practices",
            ComplianceCategory::PostHarvestHandling => "post_harvest_handling",
            ComplianceCategory::StorageTransportation => "storage_transportation",
            ComplianceCategory::RecordKeeping => "record_keeping",
            ComplianceCategory::WorkerTraining => "worker_training",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum ComplianceOutcome {
    Approved {
        validity_months: u32,
    },
    ConditionalApproval {
        validity_months: u32,
        corrective_actions: Vec<String>,
    },
    Rejected {
        reasons: Vec<String>,
    },
}

impl ComplianceOutcome {
    pub fn is_rejection(&self) -> bool {
        matches!(self, ComplianceOutcome::Rejected { .. })
    }

    pub fn validity_months(&self) -> Option<u32> {
        match self {
            ComplianceOutcome::Approved { validity_months }
            | ComplianceOutcome::ConditionalApproval {
                validity_months, ..
            } => Some(*validity_months),
            ComplianceOutcome::Rejected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub category_points: BTreeMap<ComplianceCategory, f64>,
    pub raw_total: f64,
    pub max_total: f64,
    pub score: f64,
    pub outcome: ComplianceOutcome,
}

/// Cap every category, sum, normalise to 100, and map onto the approval bands.
///
/// Categories absent from `points` contribute zero. A category scoring below two
/// thirds of its cap becomes a corrective action (conditional) or a rejection reason.
pub fn score_compliance(
    config: &ScoringConfig,
    points: &BTreeMap<ComplianceCategory, f64>,
) -> ComplianceAssessment {
    let cap = config.category_cap;
    let category_points: BTreeMap<ComplianceCategory, f64> = ComplianceCategory::ALL
        .iter()
        .map(|category| {
            let raw = points.get(category).copied().unwrap_or(0.0);
            let bounded = if raw.is_finite() { raw.clamp(0.0, cap) } else { 0.0 };
            (*category, bounded)
        })
        .collect();

    let raw_total: f64 = category_points.values().sum();
    let max_total = cap * ComplianceCategory::ALL.len() as f64;
    let score = if max_total > 0.0 {
        raw_total / max_total * 100.0
    } else {
        0.0
    };

    let weak: Vec<String> = category_points
        .iter()
        .filter(|(_, value)| **value < cap * 2.0 / 3.0)
        .map(|(category, value)| format!("{} scored {:.1}/{:.0}", category.label(), value, cap))
        .collect();

    let outcome = if score >= config.approval_threshold {
        ComplianceOutcome::Approved {
            validity_months: config.approved_validity_months,
        }
    } else if score >= config.conditional_threshold {
        ComplianceOutcome::ConditionalApproval {
            validity_months: config.conditional_validity_months,
            corrective_actions: weak,
        }
    } else {
        let mut reasons = vec![format!(
            "compliance score {:.1} below {:.0}",
            score, config.conditional_threshold
        )];
        reasons.extend(weak);
        ComplianceOutcome::Rejected { reasons }
    };

    ComplianceAssessment {
        category_points,
        raw_total,
        max_total,
        score,
        outcome,
    }
}
