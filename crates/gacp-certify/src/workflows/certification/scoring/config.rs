use serde::{Deserialize, Serialize};

use super::super::domain::RiskLevel;

/// Weight tables and decision thresholds for both scoring passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub document_weight: f64,
    pub farm_information_weight: f64,
    pub practice_weight: f64,
    pub proceed_threshold: f64,
    pub revision_threshold: f64,
    pub category_cap: f64,
    pub approval_threshold: f64,
    pub conditional_threshold: f64,
    pub approved_validity_months: u32,
    pub conditional_validity_months: u32,
}

impl ScoringConfig {
    pub fn risk_penalty(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Low => 0.0,
            RiskLevel::Medium => 5.0,
            RiskLevel::High => 10.0,
            RiskLevel::Critical => 20.0,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            document_weight: 0.3,
            farm_information_weight: 0.3,
            practice_weight: 0.4,
            proceed_threshold: 80.0,
            revision_threshold: 60.0,
            category_cap: 15.0,
            approval_threshold: 85.0,
            conditional_threshold: 70.0,
            approved_validity_months: 24,
            conditional_validity_months: 12,
        }
    }
}
