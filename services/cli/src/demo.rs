use std::collections::BTreeMap;

use clap::{Args, ValueEnum};
use gacp_certify::config::AppConfig;
use gacp_certify::error::AppError;
use gacp_certify::workflows::certification::{
    estimate_duration_hours, ApplicantId, ApplicantType, ApplicationDraft, ApplicationFilter,
    ApplicationId, ApplicationStatus, ApplicationType, ComplianceCategory, Coordinates,
    CropInformation, DocumentKind, DocumentReview, FarmInformation, FarmingSystem, FeeCalculator,
    Page, PaymentConfirmation, PaymentMethod, PaymentPhase, RegionCode, ReplacementRequest,
    StaffId, WaterQuality, WorkflowError,
};

use crate::infra::Runtime;

const OFFICER: &str = "officer-cm-01";
const APPROVER: &str = "director-01";

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Scenario {
    /// Intake through certificate issuance and public verification
    New,
    /// Three revision requests, the penalty fee, and the return to review
    Penalty,
    /// Certificate replacement after loss
    Replacement,
    #[default]
    All,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Which scenario to run
    #[arg(long, value_enum, default_value_t = Scenario::All)]
    pub(crate) scenario: Scenario,
    /// Print the final application records as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct FeesArgs {
    /// Application type: NEW, RENEWAL, or REPLACEMENT
    #[arg(long = "type", default_value = "NEW")]
    pub(crate) application_type: ApplicationType,
    /// Emit the quote as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct EstimateArgs {
    /// Farm area in rai
    #[arg(long)]
    pub(crate) area: f64,
    /// Number of distinct crop categories grown
    #[arg(long, default_value_t = 1)]
    pub(crate) categories: usize,
}

pub(crate) fn run_fees(config: &AppConfig, args: FeesArgs) -> Result<(), AppError> {
    let quote = FeeCalculator::new(config.workflow.fees.clone()).quote(args.application_type);
    if args.json {
        let rendered = serde_json::to_string_pretty(&quote).map_err(WorkflowError::from)?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Fees for {} applications", args.application_type.label());
    for line in &quote.lines {
        println!(
            "- {:<12} {:>7} {}  {}",
            line.phase.key(),
            line.amount,
            line.currency,
            line.description
        );
    }
    println!("  total        {:>7} {}", quote.total, config.workflow.fees.currency);
    Ok(())
}

pub(crate) fn run_estimate(args: EstimateArgs) {
    let hours = estimate_duration_hours(args.area, args.categories);
    println!(
        "Estimated inspection: {hours} hours for {:.1} rai across {} crop categor{}",
        args.area,
        args.categories,
        if args.categories == 1 { "y" } else { "ies" }
    );
}

pub(crate) async fn run_demo(config: &AppConfig, args: DemoArgs) -> Result<(), AppError> {
    let runtime = Runtime::build(config)?;
    println!("GACP certification workflow demo");

    if matches!(args.scenario, Scenario::New | Scenario::All) {
        println!("\nNew application");
        certify(&runtime, "farmer-demo-01", "Somchai Jaidee").await?;
    }
    if matches!(args.scenario, Scenario::Penalty | Scenario::All) {
        println!("\nRevision penalty");
        penalty(&runtime).await?;
    }
    if matches!(args.scenario, Scenario::Replacement | Scenario::All) {
        println!("\nCertificate replacement");
        replacement(&runtime).await?;
    }

    let summary = runtime.engine.status_summary()?;
    println!("\nApplications by status ({} total)", summary.total);
    for (status, count) in summary.counts.iter().filter(|(_, count)| **count > 0) {
        println!("- {status}: {count}");
    }

    if args.json {
        let listing = runtime
            .engine
            .list_applications(&ApplicationFilter::default(), Page::new(0, Page::MAX_LIMIT))?;
        let rendered =
            serde_json::to_string_pretty(&listing.items).map_err(WorkflowError::from)?;
        println!("\n{rendered}");
    }
    Ok(())
}

fn staff(id: &str) -> StaffId {
    StaffId(id.to_string())
}

fn draft(holder: &str) -> ApplicationDraft {
    ApplicationDraft {
        application_type: ApplicationType::New,
        applicant_type: ApplicantType::Individual,
        holder_name: holder.to_string(),
        farm: FarmInformation {
            farm_name: format!("{holder} Farm"),
            province: "Chiang Mai".to_string(),
            region: RegionCode(String::new()),
            coordinates: Some(Coordinates {
                latitude: 18.79,
                longitude: 98.98,
            }),
            total_area_rai: 15.0,
            land_ownership_documents: vec!["chanote".to_string()],
            water_quality: Some(WaterQuality::Good),
            soil_ph: Some(6.4),
            contamination_risk: false,
            farming_system: FarmingSystem::Organic,
        },
        crops: vec![CropInformation {
            crop_type: "cannabis".to_string(),
            cultivated_area_rai: 10.0,
        }],
        replacement: None,
    }
}

fn paid(reference: String) -> PaymentConfirmation {
    PaymentConfirmation {
        transaction_id: reference,
        method: PaymentMethod::QrCode,
    }
}

fn attach(runtime: &Runtime, id: &ApplicationId, kinds: &[DocumentKind]) -> Result<(), AppError> {
    for (index, kind) in kinds.iter().enumerate() {
        let locator = format!("s3://gacp-demo/{id}/{}-{index}.pdf", kind.label());
        runtime.engine.attach_document(id, *kind, &locator)?;
    }
    Ok(())
}

fn print_status(runtime: &Runtime, id: &ApplicationId) -> Result<ApplicationStatus, AppError> {
    let application = runtime.engine.get_application(id)?;
    println!(
        "  {} -> {} (revisions: {})",
        application.application_number, application.status, application.revision_count
    );
    Ok(application.status)
}

/// Create, pay phase 1, upload, and submit; returns once review has begun.
async fn open_for_review(
    runtime: &Runtime,
    owner: &str,
    holder: &str,
) -> Result<ApplicationId, AppError> {
    let application = runtime
        .engine
        .create_application(&ApplicantId(owner.to_string()), draft(holder))?;
    let id = application.application_id;
    println!(
        "- Created {} for {holder} (region {})",
        application.application_number, application.farm.region
    );

    runtime.engine.confirm_payment(
        &id,
        PaymentPhase::Phase1,
        &paid(format!("{owner}-phase1")),
    )?;
    let mut documents = vec![
        DocumentKind::FarmLicense,
        DocumentKind::LandDeed,
        DocumentKind::FarmerId,
        DocumentKind::WaterTestReport,
    ];
    documents.extend([DocumentKind::FarmPhotos; 5]);
    attach(runtime, &id, &documents)?;

    runtime.engine.submit_application(&id, owner)?;
    runtime.settle().await?;
    print_status(runtime, &id)?;
    Ok(id)
}

async fn certify(runtime: &Runtime, owner: &str, holder: &str) -> Result<String, AppError> {
    let id = open_for_review(runtime, owner, holder).await?;

    let (_, assessment) = runtime.engine.review_application(
        &id,
        &staff(OFFICER),
        DocumentReview {
            verified_documents: 5,
            practice_score: 88.0,
            comments: vec!["records complete".to_string()],
        },
    )?;
    println!(
        "- Preliminary score {:.1} ({:?})",
        assessment.total, assessment.decision
    );

    runtime.engine.confirm_payment(
        &id,
        PaymentPhase::Phase2,
        &paid(format!("{owner}-phase2")),
    )?;
    let (_, slot) = runtime
        .engine
        .schedule_inspection(&id, &staff(OFFICER), None)?;
    println!(
        "- Inspection by {} on {} ({} hours)",
        slot.auditor,
        slot.date.format("%Y-%m-%d"),
        slot.estimated_hours
    );

    let points: BTreeMap<ComplianceCategory, f64> = ComplianceCategory::ALL
        .iter()
        .map(|category| (*category, 13.5))
        .collect();
    let (_, compliance) = runtime
        .engine
        .complete_inspection(&id, &staff(&slot.auditor.0), points)?;
    println!("- Compliance score {:.1}", compliance.score);
    runtime.settle().await?;

    let approval = runtime.engine.final_approval(&id, &staff(APPROVER))?;
    runtime.settle().await?;
    print_status(runtime, &id)?;

    let number = approval.certificate.certificate_number;
    let verification = runtime.engine.verify_certificate(&number, None)?;
    println!(
        "- Certificate {number}: valid={} expires {}",
        verification.valid,
        verification
            .expiry_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    Ok(number)
}

async fn penalty(runtime: &Runtime) -> Result<(), AppError> {
    let owner = "farmer-demo-02";
    let id = open_for_review(runtime, owner, "Malee Srisuk").await?;

    for round in 1..=3 {
        let application = runtime.engine.request_revision(
            &id,
            &staff(OFFICER),
            vec![format!("round {round}: drying area photos missing")],
        )?;
        println!("- Revision {round} requested -> {}", application.status);
        if application.status == ApplicationStatus::RevisionRequired {
            runtime.engine.submit_application(&id, owner)?;
            runtime.settle().await?;
        }
    }

    let pending = runtime.engine.get_application(&id)?;
    if let Some(record) = pending.payment_for(PaymentPhase::Penalty) {
        println!("- Penalty due: {} {}", record.amount, record.currency);
    }
    runtime
        .engine
        .process_payment(&id, "penalty", &paid(format!("{owner}-penalty")))?;
    runtime.settle().await?;
    print_status(runtime, &id)?;
    Ok(())
}

async fn replacement(runtime: &Runtime) -> Result<(), AppError> {
    let owner = "farmer-demo-03";
    let original = certify(runtime, owner, "Nattapong Inthra").await?;

    let mut request = draft("Nattapong Inthra");
    request.application_type = ApplicationType::Replacement;
    request.replacement = Some(ReplacementRequest {
        previous_certificate_number: original.clone(),
        reason: "original lost in flood".to_string(),
    });
    let id = runtime
        .engine
        .create_application(&ApplicantId(owner.to_string()), request)?
        .application_id;
    attach(
        runtime,
        &id,
        &[DocumentKind::PoliceReport, DocumentKind::FarmerId],
    )?;
    runtime.engine.submit_application(&id, owner)?;
    runtime.settle().await?;
    print_status(runtime, &id)?;

    runtime.engine.confirm_payment(
        &id,
        PaymentPhase::Replacement,
        &paid(format!("{owner}-replacement")),
    )?;
    let approval = runtime.engine.final_approval(&id, &staff(APPROVER))?;
    runtime.settle().await?;
    print_status(runtime, &id)?;

    let retired = runtime.engine.verify_certificate(&original, None)?;
    println!(
        "- Replacement {} issued; {original} now {}",
        approval.certificate.certificate_number,
        retired
            .reason
            .map(|reason| reason.code())
            .unwrap_or("valid")
    );
    Ok(())
}
