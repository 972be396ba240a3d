use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::certification::cache::InMemoryCache;
use crate::workflows::certification::certificates::HmacSha256Signer;
use crate::workflows::certification::clock::{Clock, ManualClock};
use crate::workflows::certification::config::WorkflowConfig;
use crate::workflows::certification::domain::{
    ApplicantId, ApplicantType, Application, ApplicationDraft, ApplicationId, ApplicationType,
    Certificate, Coordinates, CropInformation, DocumentKind, FarmInformation, FarmingSystem,
    PaymentMethod, PaymentPhase, RegionCode, ReplacementRequest, StaffId, WaterQuality,
};
use crate::workflows::certification::engine::{CertificationEngine, Collaborators};
use crate::workflows::certification::memory::{
    InMemoryApplicationRepository, InMemoryCertificateRepository, InMemoryStaffDirectory,
    RecordingNotifier,
};
use crate::workflows::certification::notifications::NotificationEvent;
use crate::workflows::certification::payments::{LedgerPaymentGate, PaymentConfirmation};
use crate::workflows::certification::queue::{
    InMemoryTaskQueue, JobHandle, JobId, JobOptions, JobPayload, JobStatus, JobWorker, QueueError,
    RetryPolicy, TaskQueue,
};
use crate::workflows::certification::repository::CertificateRepository;
use crate::workflows::certification::scheduler::AuditorPoolScheduler;
use crate::workflows::certification::scoring::ComplianceCategory;
use crate::workflows::certification::staff::{StaffProfile, StaffRole};

pub(super) type Engine = CertificationEngine<InMemoryApplicationRepository, InMemoryCertificateRepository>;

pub(super) const SIGNING_KEY: &str = "test-signing-key";
pub(super) const OFFICER: &str = "officer-cm-b";
pub(super) const AUDITOR: &str = "auditor-cm-b";
pub(super) const APPROVER: &str = "director-01";

const SETTLE_ROUNDS: usize = 64;

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0)
        .single()
        .expect("valid start time")
}

pub(super) fn staff(id: &str) -> StaffId {
    StaffId(id.to_string())
}

pub(super) fn applicant(id: &str) -> ApplicantId {
    ApplicantId(id.to_string())
}

fn profile(id: &str, role: StaffRole, region: &str, expertise: &[&str], workload: u32) -> StaffProfile {
    StaffProfile {
        staff_id: staff(id),
        name: id.replace('-', " "),
        role,
        region: RegionCode(region.to_string()),
        expertise: expertise.iter().map(|skill| skill.to_string()).collect(),
        active_workload: workload,
    }
}

pub(super) fn staff_roster() -> Vec<StaffProfile> {
    vec![
        profile("officer-cm-a", StaffRole::Officer, "CM", &[], 3),
        profile(OFFICER, StaffRole::Officer, "CM", &[], 0),
        profile("officer-bk", StaffRole::Officer, "BK", &[], 0),
        profile("auditor-cm-a", StaffRole::Auditor, "CM", &["cannabis", "hemp"], 2),
        profile(AUDITOR, StaffRole::Auditor, "CM", &["Cannabis"], 0),
        profile("auditor-cm-c", StaffRole::Auditor, "CM", &["kratom"], 0),
        profile("auditor-bk", StaffRole::Auditor, "BK", &["cannabis"], 0),
    ]
}

pub(super) fn farm() -> FarmInformation {
    FarmInformation {
        farm_name: "Doi Saket Green Farm".to_string(),
        province: "Chiang Mai".to_string(),
        region: RegionCode(String::new()),
        coordinates: Some(Coordinates {
            latitude: 18.87,
            longitude: 99.13,
        }),
        total_area_rai: 12.0,
        land_ownership_documents: vec!["chanote-55012".to_string()],
        water_quality: Some(WaterQuality::Good),
        soil_ph: Some(6.5),
        contamination_risk: false,
        farming_system: FarmingSystem::Organic,
    }
}

pub(super) fn new_draft() -> ApplicationDraft {
    ApplicationDraft {
        application_type: ApplicationType::New,
        applicant_type: ApplicantType::Individual,
        holder_name: "Somchai Jaidee".to_string(),
        farm: farm(),
        crops: vec![CropInformation {
            crop_type: "cannabis".to_string(),
            cultivated_area_rai: 8.0,
        }],
        replacement: None,
    }
}

pub(super) fn replacement_draft(previous_certificate_number: &str) -> ApplicationDraft {
    ApplicationDraft {
        application_type: ApplicationType::Replacement,
        crops: Vec::new(),
        replacement: Some(ReplacementRequest {
            previous_certificate_number: previous_certificate_number.to_string(),
            reason: "original certificate lost in flood".to_string(),
        }),
        ..new_draft()
    }
}

pub(super) fn confirmation(phase: PaymentPhase) -> PaymentConfirmation {
    PaymentConfirmation {
        transaction_id: format!("txn-{}", phase.key()),
        method: PaymentMethod::QrCode,
    }
}

/// Same points in every category.
pub(super) fn uniform_points(value: f64) -> BTreeMap<ComplianceCategory, f64> {
    ComplianceCategory::ALL
        .iter()
        .map(|category| (*category, value))
        .collect()
}

/// 6 x 13 + 2 x 8 = 94 of 120, a conditional approval with two weak categories.
pub(super) fn conditional_points() -> BTreeMap<ComplianceCategory, f64> {
    let mut points = uniform_points(13.0);
    points.insert(ComplianceCategory::RecordKeeping, 8.0);
    points.insert(ComplianceCategory::WorkerTraining, 8.0);
    points
}

pub(super) fn count_events(harness: &Harness, event: NotificationEvent) -> usize {
    harness
        .notifier
        .sent()
        .iter()
        .filter(|notification| notification.event == event)
        .count()
}

/// Queue that refuses every job, forcing inline fallback.
#[derive(Default)]
pub(super) struct UnavailableQueue;

impl TaskQueue for UnavailableQueue {
    fn submit(
        &self,
        _payload: JobPayload,
        _options: JobOptions,
        _worker: &dyn JobWorker,
    ) -> Result<JobHandle, QueueError> {
        Err(QueueError::Unavailable("broker offline".to_string()))
    }

    fn status(&self, _job_id: JobId) -> Result<Option<JobStatus>, QueueError> {
        Err(QueueError::Unavailable("broker offline".to_string()))
    }
}

pub(super) struct Harness {
    pub(super) engine: Engine,
    pub(super) applications: Arc<InMemoryApplicationRepository>,
    pub(super) certificates: Arc<InMemoryCertificateRepository>,
    pub(super) staff: Arc<InMemoryStaffDirectory>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) queue: Arc<InMemoryTaskQueue>,
    pub(super) cache: Arc<InMemoryCache>,
    pub(super) clock: Arc<ManualClock>,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_config(WorkflowConfig::default())
    }

    pub(super) fn with_config(config: WorkflowConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let queue = Arc::new(InMemoryTaskQueue::new(clock.clone(), RetryPolicy::default()));
        Self::assemble(config, clock, queue.clone(), queue)
    }

    /// Engine wired to `active` instead of the deferred in-memory queue.
    pub(super) fn with_task_queue(active: Arc<dyn TaskQueue>) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let idle = Arc::new(InMemoryTaskQueue::new(clock.clone(), RetryPolicy::default()));
        Self::assemble(WorkflowConfig::default(), clock, idle, active)
    }

    fn assemble(
        config: WorkflowConfig,
        clock: Arc<ManualClock>,
        queue: Arc<InMemoryTaskQueue>,
        active: Arc<dyn TaskQueue>,
    ) -> Self {
        let applications = Arc::new(InMemoryApplicationRepository::new());
        let certificates = Arc::new(InMemoryCertificateRepository::new());
        let staff = Arc::new(InMemoryStaffDirectory::with_staff(staff_roster()));
        let notifier = Arc::new(RecordingNotifier::default());
        let cache = Arc::new(InMemoryCache::new(clock.clone()));
        let signer = HmacSha256Signer::new(SIGNING_KEY).expect("signing key accepted");

        let collaborators = Collaborators {
            staff: staff.clone(),
            scheduler: Arc::new(AuditorPoolScheduler::new(
                staff.clone(),
                config.minimum_notice_days,
            )),
            payments: Arc::new(LedgerPaymentGate),
            notifier: notifier.clone(),
            queue: active,
            cache: cache.clone(),
            clock: clock.clone(),
            signer: Arc::new(signer),
        };
        let engine = CertificationEngine::new(
            applications.clone(),
            certificates.clone(),
            collaborators,
            config,
        );

        Self {
            engine,
            applications,
            certificates,
            staff,
            notifier,
            queue,
            cache,
            clock,
        }
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run queued work, jumping the clock to each delayed job until nothing is pending.
    pub(super) fn settle(&self) {
        for _ in 0..SETTLE_ROUNDS {
            self.queue.drain(&self.engine).expect("queue drains");
            match self.queue.next_due_at().expect("queue readable") {
                Some(due) if due > self.clock.now() => self.clock.set(due),
                _ => return,
            }
        }
        panic!("queue did not settle after {SETTLE_ROUNDS} rounds");
    }

    pub(super) fn application(&self, id: &ApplicationId) -> Application {
        self.engine.get_application(id).expect("application exists")
    }

    pub(super) fn create(&self, owner: &str) -> Application {
        self.engine
            .create_application(&applicant(owner), new_draft())
            .expect("draft accepted")
    }

    pub(super) fn attach_new_documents(&self, id: &ApplicationId) {
        let mut uploads = vec![
            DocumentKind::FarmLicense,
            DocumentKind::LandDeed,
            DocumentKind::FarmerId,
            DocumentKind::WaterTestReport,
        ];
        uploads.extend([DocumentKind::FarmPhotos; 5]);
        for (index, kind) in uploads.into_iter().enumerate() {
            let locator = format!("s3://gacp-docs/{id}/{}-{index}", kind.label());
            self.engine
                .attach_document(id, kind, &locator)
                .expect("document attached");
        }
    }

    /// Created, phase 1 paid, documents attached, submitted, and picked up for review.
    pub(super) fn under_review(&self, owner: &str) -> Application {
        let draft = self.create(owner);
        let id = draft.application_id;
        self.engine
            .confirm_payment(&id, PaymentPhase::Phase1, &confirmation(PaymentPhase::Phase1))
            .expect("phase1 confirmed");
        self.attach_new_documents(&id);
        self.engine
            .submit_application(&id, owner)
            .expect("submission accepted");
        self.settle();
        self.application(&id)
    }

    /// Documents approved and phase 2 paid; ready to book the inspection.
    pub(super) fn payment_verified(&self, owner: &str) -> Application {
        let id = self.under_review(owner).application_id;
        self.engine
            .approve_for_payment(&id, &staff(OFFICER))
            .expect("documents approved");
        self.engine
            .confirm_payment(&id, PaymentPhase::Phase2, &confirmation(PaymentPhase::Phase2))
            .expect("phase2 confirmed")
    }

    /// Inspection booked and recorded with `points`, background work settled.
    pub(super) fn inspected(
        &self,
        owner: &str,
        points: BTreeMap<ComplianceCategory, f64>,
    ) -> Application {
        let id = self.payment_verified(owner).application_id;
        self.engine
            .schedule_inspection(&id, &staff(OFFICER), None)
            .expect("inspection scheduled");
        self.engine
            .complete_inspection(&id, &staff(AUDITOR), points)
            .expect("inspection recorded");
        self.settle();
        self.application(&id)
    }

    /// Full NEW path through certificate issuance.
    pub(super) fn issued(&self, owner: &str) -> (Application, Certificate) {
        let id = self.inspected(owner, uniform_points(14.0)).application_id;
        self.engine
            .final_approval(&id, &staff(APPROVER))
            .expect("final approval granted");
        self.settle();
        let certificate = self
            .certificates
            .find_by_application(&id)
            .expect("certificate store readable")
            .expect("certificate issued");
        (self.application(&id), certificate)
    }
}
