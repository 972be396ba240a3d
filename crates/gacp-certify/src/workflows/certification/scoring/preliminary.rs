use serde::{Deserialize, Serialize};

use super::super::domain::{FarmInformation, RiskLevel, WaterQuality};
use super::config::ScoringConfig;

/// Officer input for the document-review pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReview {
    pub verified_documents: usize,
    pub practice_score: f64,
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreliminaryDecision {
    ProceedToInspection,
    RevisionRequired,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreliminaryAssessment {
    pub document_score: f64,
    pub farm_information_score: f64,
    pub practice_score: f64,
    pub risk_penalty: f64,
    pub total: f64,
    pub decision: PreliminaryDecision,
}

/// Four equally weighted completeness checks, 0 to 100.
pub fn farm_information_completeness(farm: &FarmInformation) -> f64 {
    let mut score = 0.0;
    if farm.coordinates.is_some() {
        score += 25.0;
    }
    if !farm.land_ownership_documents.is_empty() {
        score += 25.0;
    }
    if farm.water_quality == Some(WaterQuality::Good) {
        score += 25.0;
    }
    if farm.soil_ph.is_some() {
        score += 25.0;
    }
    score
}

pub fn score_preliminary(
    config: &ScoringConfig,
    farm: &FarmInformation,
    risk: RiskLevel,
    required_documents: usize,
    review: &DocumentReview,
) -> PreliminaryAssessment {
    let document_score = if required_documents == 0 {
        100.0
    } else {
        (review.verified_documents as f64 / required_documents as f64 * 100.0).min(100.0)
    };
    let farm_information_score = farm_information_completeness(farm);
    let practice_score = review.practice_score.clamp(0.0, 100.0);
    let risk_penalty = config.risk_penalty(risk);

    let weighted = document_score * config.document_weight
        + farm_information_score * config.farm_information_weight
        + practice_score * config.practice_weight;
    let total = (weighted - risk_penalty).max(0.0);

    let decision = if total >= config.proceed_threshold {
        PreliminaryDecision::ProceedToInspection
    } else if total >= config.revision_threshold {
        PreliminaryDecision::RevisionRequired
    } else {
        PreliminaryDecision::Reject
    };

    PreliminaryAssessment {
        document_score,
        farm_information_score,
        practice_score,
        risk_penalty,
        total,
        decision,
    }
}
