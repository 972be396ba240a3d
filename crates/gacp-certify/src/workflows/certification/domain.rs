use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::ComplianceOutcome;

/// Identifier wrapper for certification applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Farmer (or juristic person) submitting farms for certification.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Weak reference to an officer, auditor, or approver owned by the staff directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StaffId(pub String);

impl fmt::Display for StaffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CertificateId(pub String);

impl CertificateId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-letter province code used for officer routing and certificate numbering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionCode(pub String);

impl RegionCode {
    pub const UNKNOWN: &'static str = "XX";

    /// Map a province name (Thai or English) onto its registry code.
    pub fn from_province(province: &str) -> Self {
        let normalized = province.trim().to_ascii_lowercase().replace([' ', '_', '-'], "");
        let code = match normalized.as_str() {
            "กรุงเทพมหานคร" | "bangkok" => "BK",
            "เชียงใหม่" | "chiangmai" => "CM",
            "เชียงราย" | "chiangrai" => "CR",
            "นครราชสีมา" | "nakhonratchasima" => "NM",
            "ขอนแก่น" | "khonkaen" => "KK",
            "อุบลราชธานี" | "ubonratchathani" => "UB",
            "สงขลา" | "songkhla" => "SK",
            "ภูเก็ต" | "phuket" => "PK",
            _ => Self::UNKNOWN,
        };
        Self(code.to_string())
    }

    /// Caller-supplied code when usable, otherwise the province mapping.
    pub fn resolve(candidate: &RegionCode, province: &str) -> Self {
        let code = candidate.0.trim().to_ascii_uppercase();
        if code == Self::UNKNOWN || !Self::is_registry_code(&code) {
            Self::from_province(province)
        } else {
            Self(code)
        }
    }

    pub fn is_registry_code(code: &str) -> bool {
        !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationType {
    New,
    Renewal,
    Replacement,
}

impl ApplicationType {
    pub const fn is_replacement(self) -> bool {
        matches!(self, ApplicationType::Replacement)
    }

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationType::New => "NEW",
            ApplicationType::Renewal => "RENEWAL",
            ApplicationType::Replacement => "REPLACEMENT",
        }
    }
}

impl std::str::FromStr for ApplicationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "RENEWAL" => Ok(Self::Renewal),
            "REPLACEMENT" => Ok(Self::Replacement),
            other => Err(format!("unknown application type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantType {
    Individual,
    CommunityEnterprise,
    Juristic,
}

/// Workflow state tracked on every application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    RevisionRequired,
    PenaltyPaymentPending,
    PaymentPending,
    PaymentVerified,
    InspectionScheduled,
    InspectionCompleted,
    Phase2PaymentPending,
    Phase2PaymentVerified,
    ReplacementPaymentPending,
    ReplacementAdminCheck,
    Approved,
    CertificateIssued,
    Rejected,
    Expired,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 17] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::RevisionRequired,
        ApplicationStatus::PenaltyPaymentPending,
        ApplicationStatus::PaymentPending,
        ApplicationStatus::PaymentVerified,
        ApplicationStatus::InspectionScheduled,
        ApplicationStatus::InspectionCompleted,
        ApplicationStatus::Phase2PaymentPending,
        ApplicationStatus::Phase2PaymentVerified,
        ApplicationStatus::ReplacementPaymentPending,
        ApplicationStatus::ReplacementAdminCheck,
        ApplicationStatus::Approved,
        ApplicationStatus::CertificateIssued,
        ApplicationStatus::Rejected,
        ApplicationStatus::Expired,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::RevisionRequired => "revision_required",
            ApplicationStatus::PenaltyPaymentPending => "penalty_payment_pending",
            ApplicationStatus::PaymentPending => "payment_pending",
            ApplicationStatus::PaymentVerified => "payment_verified",
            ApplicationStatus::InspectionScheduled => "inspection_scheduled",
            ApplicationStatus::InspectionCompleted => "inspection_completed",
            ApplicationStatus::Phase2PaymentPending => "phase2_payment_pending",
            ApplicationStatus::Phase2PaymentVerified => "phase2_payment_verified",
            ApplicationStatus::ReplacementPaymentPending => "replacement_payment_pending",
            ApplicationStatus::ReplacementAdminCheck => "replacement_admin_check",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::CertificateIssued => "certificate_issued",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Expired => "expired",
        }
    }

    /// Terminal states close the application; an applicant may open a new one afterwards.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::CertificateIssued
                | ApplicationStatus::Rejected
                | ApplicationStatus::Expired
        )
    }

    /// States in which the applicant may still edit documents.
    pub const fn is_editable(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Draft | ApplicationStatus::RevisionRequired
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Single append-only entry in an application's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub state: ApplicationStatus,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPhase {
    Phase1,
    Phase2,
    Replacement,
    Penalty,
}

impl PaymentPhase {
    pub const fn key(self) -> &'static str {
        match self {
            PaymentPhase::Phase1 => "phase1",
            PaymentPhase::Phase2 => "phase2",
            PaymentPhase::Replacement => "replacement",
            PaymentPhase::Penalty => "penalty",
        }
    }
}

impl fmt::Display for PaymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for PaymentPhase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "phase1" | "1" => Ok(Self::Phase1),
            "phase2" | "2" => Ok(Self::Phase2),
            "replacement" => Ok(Self::Replacement),
            "penalty" => Ok(Self::Penalty),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    QrCode,
    BankTransfer,
    CreditCard,
    Counter,
}

/// Per-phase payment record. Immutable once completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub amount: u32,
    pub currency: String,
    pub status: PaymentStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub method: Option<PaymentMethod>,
}

impl PaymentRecord {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    FarmLicense,
    LandDeed,
    FarmerId,
    FarmPhotos,
    WaterTestReport,
    SoilTestReport,
    PreviousCertificate,
    PoliceReport,
    Other,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::FarmLicense => "farm_license",
            DocumentKind::LandDeed => "land_deed",
            DocumentKind::FarmerId => "farmer_id",
            DocumentKind::FarmPhotos => "farm_photos",
            DocumentKind::WaterTestReport => "water_test_report",
            DocumentKind::SoilTestReport => "soil_test_report",
            DocumentKind::PreviousCertificate => "previous_certificate",
            DocumentKind::PoliceReport => "police_report",
            DocumentKind::Other => "other",
        }
    }
}

/// Metadata for an uploaded document; the file itself lives in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub kind: DocumentKind,
    pub locator: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentScore {
    pub category: String,
    pub max_score: f64,
    pub achieved_score: f64,
    pub assessor: StaffId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterQuality {
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmingSystem {
    Organic,
    Conventional,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Farm details captured at intake and used for scoring, routing, and the certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmInformation {
    pub farm_name: String,
    pub province: String,
    pub region: RegionCode,
    pub coordinates: Option<Coordinates>,
    pub total_area_rai: f64,
    pub land_ownership_documents: Vec<String>,
    pub water_quality: Option<WaterQuality>,
    pub soil_ph: Option<f64>,
    pub contamination_risk: bool,
    pub farming_system: FarmingSystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropInformation {
    pub crop_type: String,
    pub cultivated_area_rai: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Why a replacement certificate is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRequest {
    pub previous_certificate_number: String,
    pub reason: String,
}

/// Inbound payload for `create_application`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub application_type: ApplicationType,
    pub applicant_type: ApplicantType,
    pub holder_name: String,
    pub farm: FarmInformation,
    pub crops: Vec<CropInformation>,
    pub replacement: Option<ReplacementRequest>,
}

/// Certification decision recorded after the on-site inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionDecision {
    pub outcome: ComplianceOutcome,
    pub final_score: f64,
    pub decided_by: StaffId,
    pub decided_at: DateTime<Utc>,
}

/// Aggregate root of the certification workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub application_id: ApplicationId,
    pub application_number: String,
    pub application_type: ApplicationType,
    pub applicant_type: ApplicantType,
    pub applicant: ApplicantId,
    pub holder_name: String,
    pub farm: FarmInformation,
    pub crops: Vec<CropInformation>,
    pub replacement: Option<ReplacementRequest>,
    pub risk_level: RiskLevel,
    pub status: ApplicationStatus,
    pub status_history: Vec<StatusEntry>,
    pub payment: BTreeMap<PaymentPhase, PaymentRecord>,
    pub revision_count: u32,
    pub documents: Vec<Document>,
    pub assessment_scores: Vec<AssessmentScore>,
    pub assigned_officer: Option<StaffId>,
    pub assigned_auditor: Option<StaffId>,
    pub inspection_date: Option<DateTime<Utc>>,
    pub inspection_decision: Option<InspectionDecision>,
    pub appeal_deadline: Option<DateTime<Utc>>,
    pub reserved_certificate_number: Option<String>,
    pub certificate_id: Option<CertificateId>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn payment_for(&self, phase: PaymentPhase) -> Option<&PaymentRecord> {
        self.payment.get(&phase)
    }

    pub fn is_paid(&self, phase: PaymentPhase) -> bool {
        self.payment_for(phase)
            .map(PaymentRecord::is_completed)
            .unwrap_or(false)
    }

    /// Timestamp of the most recent status change.
    pub fn entered_status_at(&self) -> DateTime<Utc> {
        self.status_history
            .last()
            .map(|entry| entry.timestamp)
            .unwrap_or(self.created_at)
    }

    /// Latest final compliance score, falling back to the preliminary review score.
    pub fn latest_score(&self) -> Option<f64> {
        self.inspection_decision
            .as_ref()
            .map(|decision| decision.final_score)
            .or_else(|| {
                self.assessment_scores
                    .iter()
                    .rev()
                    .find(|score| score.category == "preliminary_review")
                    .map(|score| score.achieved_score)
            })
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application_id.clone(),
            application_number: self.application_number.clone(),
            status: self.status.label(),
            revision_count: self.revision_count,
            outstanding_payments: self
                .payment
                .iter()
                .filter(|(_, record)| !record.is_completed())
                .map(|(phase, _)| phase.key())
                .collect(),
            certificate_id: self.certificate_id.clone(),
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub application_number: String,
    pub status: &'static str,
    pub revision_count: u32,
    pub outstanding_payments: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<CertificateId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Expired,
    Revoked,
    Suspended,
}

impl CertificateStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalEntry {
    pub renewed_at: DateTime<Utc>,
    pub renewed_by: StaffId,
    pub previous_expiry: DateTime<Utc>,
    pub new_expiry: DateTime<Utc>,
}

/// Issued certification. Never deleted; lifecycle is expressed through `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: CertificateId,
    pub certificate_number: String,
    pub application_id: ApplicationId,
    pub holder: ApplicantId,
    pub holder_name: String,
    pub farm_name: String,
    pub region: RegionCode,
    pub year: i32,
    pub sequence: u32,
    pub status: CertificateStatus,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub score: f64,
    pub verification_code: String,
    pub digital_signature: String,
    pub signature_algorithm: String,
    pub approved_by: StaffId,
    pub renewal_history: Vec<RenewalEntry>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
}
