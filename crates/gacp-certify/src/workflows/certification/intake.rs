use chrono::{DateTime, Duration, Utc};

use super::domain::{ApplicationDraft, ApplicationType, Document, DocumentKind};
use super::errors::ValidationError;

/// One entry of a required-document set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRequirement {
    pub kind: DocumentKind,
    pub minimum_count: usize,
    pub max_age_days: Option<i64>,
}

impl DocumentRequirement {
    const fn one(kind: DocumentKind) -> Self {
        Self {
            kind,
            minimum_count: 1,
            max_age_days: None,
        }
    }

    const fn at_least(kind: DocumentKind, minimum_count: usize) -> Self {
        Self {
            kind,
            minimum_count,
            max_age_days: None,
        }
    }

    const fn recent(kind: DocumentKind, max_age_days: i64) -> Self {
        Self {
            kind,
            minimum_count: 1,
            max_age_days: Some(max_age_days),
        }
    }

    fn describe(&self) -> String {
        match (self.minimum_count, self.max_age_days) {
            (1, None) => self.kind.label().to_string(),
            (count, None) => format!("{} (at least {count})", self.kind.label()),
            (_, Some(days)) => format!("{} (within {days} days)", self.kind.label()),
        }
    }
}

const NEW_DOCUMENTS: [DocumentRequirement; 5] = [
    DocumentRequirement::one(DocumentKind::FarmLicense),
    DocumentRequirement::one(DocumentKind::LandDeed),
    DocumentRequirement::one(DocumentKind::FarmerId),
    DocumentRequirement::at_least(DocumentKind::FarmPhotos, 5),
    DocumentRequirement::recent(DocumentKind::WaterTestReport, 90),
];

const RENEWAL_DOCUMENTS: [DocumentRequirement; 5] = [
    DocumentRequirement::one(DocumentKind::FarmLicense),
    DocumentRequirement::one(DocumentKind::FarmerId),
    DocumentRequirement::at_least(DocumentKind::FarmPhotos, 5),
    DocumentRequirement::recent(DocumentKind::WaterTestReport, 90),
    DocumentRequirement::one(DocumentKind::PreviousCertificate),
];

const REPLACEMENT_DOCUMENTS: [DocumentRequirement; 2] = [
    DocumentRequirement::one(DocumentKind::PoliceReport),
    DocumentRequirement::one(DocumentKind::FarmerId),
];

pub fn required_documents(application_type: ApplicationType) -> &'static [DocumentRequirement] {
    match application_type {
        ApplicationType::New => &NEW_DOCUMENTS,
        ApplicationType::Renewal => &RENEWAL_DOCUMENTS,
        ApplicationType::Replacement => &REPLACEMENT_DOCUMENTS,
    }
}

/// Requirements not satisfied by `documents`, described for the applicant.
pub fn missing_documents(
    application_type: ApplicationType,
    documents: &[Document],
    now: DateTime<Utc>,
) -> Vec<String> {
    required_documents(application_type)
        .iter()
        .filter(|requirement| {
            let satisfying = documents
                .iter()
                .filter(|document| document.kind == requirement.kind)
                .filter(|document| match requirement.max_age_days {
                    Some(days) => now - document.uploaded_at <= Duration::days(days),
                    None => true,
                })
                .count();
            satisfying < requirement.minimum_count
        })
        .map(DocumentRequirement::describe)
        .collect()
}

/// Guard validating inbound drafts before anything is persisted.
#[derive(Debug, Clone, Default)]
pub struct IntakeGuard;

impl IntakeGuard {
    pub fn validate(&self, draft: &ApplicationDraft) -> Result<(), ValidationError> {
        if draft.holder_name.trim().is_empty() {
            return Err(ValidationError::MissingField("holder_name"));
        }
        if draft.farm.farm_name.trim().is_empty() {
            return Err(ValidationError::MissingField("farm.farm_name"));
        }
        if draft.farm.province.trim().is_empty() {
            return Err(ValidationError::MissingField("farm.province"));
        }
        if !(draft.farm.total_area_rai.is_finite() && draft.farm.total_area_rai > 0.0) {
            return Err(ValidationError::InvalidField {
                field: "farm.total_area_rai",
                reason: "must be a positive number".to_string(),
            });
        }
        if let Some(ph) = draft.farm.soil_ph {
            if !(0.0..=14.0).contains(&ph) {
                return Err(ValidationError::InvalidField {
                    field: "farm.soil_ph",
                    reason: format!("{ph} is outside 0-14"),
                });
            }
        }
        if let Some(coordinates) = draft.farm.coordinates {
            if !(-90.0..=90.0).contains(&coordinates.latitude)
                || !(-180.0..=180.0).contains(&coordinates.longitude)
            {
                return Err(ValidationError::InvalidField {
                    field: "farm.coordinates",
                    reason: "latitude/longitude out of range".to_string(),
                });
            }
        }

        match draft.application_type {
            ApplicationType::Replacement => {
                let request = draft
                    .replacement
                    .as_ref()
                    .ok_or(ValidationError::MissingField("replacement"))?;
                if request.previous_certificate_number.trim().is_empty() {
                    return Err(ValidationError::MissingField(
                        "replacement.previous_certificate_number",
                    ));
                }
                if request.reason.trim().is_empty() {
                    return Err(ValidationError::MissingField("replacement.reason"));
                }
            }
            ApplicationType::New | ApplicationType::Renewal => {
                if draft.crops.is_empty() {
                    return Err(ValidationError::MissingField("crops"));
                }
                if let Some(crop) = draft
                    .crops
                    .iter()
                    .find(|crop| crop.crop_type.trim().is_empty())
                {
                    return Err(ValidationError::InvalidField {
                        field: "crops.crop_type",
                        reason: format!("blank crop type ({} rai)", crop.cultivated_area_rai),
                    });
                }
            }
        }

        Ok(())
    }
}
