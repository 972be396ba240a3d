mod compliance;
mod config;
mod preliminary;

pub use compliance::{
    score_compliance, ComplianceAssessment, ComplianceCategory, ComplianceOutcome,
};
pub use config::ScoringConfig;
pub use preliminary::{
    farm_information_completeness, score_preliminary, DocumentReview, PreliminaryAssessment,
    PreliminaryDecision,
};

use super::domain::{FarmInformation, FarmingSystem, RiskLevel, WaterQuality};

/// Stateless scorer applying a fixed configuration to both passes.
#[derive(Debug, Clone, Default)]
pub struct ComplianceScorer {
    config: ScoringConfig,
}

impl ComplianceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn preliminary(
        &self,
        farm: &FarmInformation,
        risk: RiskLevel,
        required_documents: usize,
        review: &DocumentReview,
    ) -> PreliminaryAssessment {
        score_preliminary(&self.config, farm, risk, required_documents, review)
    }

    pub fn compliance(
        &self,
        points: &std::collections::BTreeMap<ComplianceCategory, f64>,
    ) -> ComplianceAssessment {
        score_compliance(&self.config, points)
    }
}

/// Derive the intake risk level from farm information.
pub fn assess_risk(farm: &FarmInformation) -> RiskLevel {
    let mut points = 0u8;
    if farm.contamination_risk {
        points += 2;
    }
    if farm.farming_system == FarmingSystem::Conventional {
        points += 1;
    }
    if farm.water_quality == Some(WaterQuality::Poor) {
        points += 1;
    }
    if farm.total_area_rai > 50.0 {
        points += 1;
    }

    match points {
        0 => RiskLevel::Low,
        1 => RiskLevel::Medium,
        2 | 3 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}
