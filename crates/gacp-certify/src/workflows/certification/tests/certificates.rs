use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use chrono::Duration;

use super::common::*;
use crate::workflows::certification::cache::keys;
use crate::workflows::certification::config::WorkflowConfig;
use crate::workflows::certification::certificates::{
    add_months, CertificateIssuer, CertificateNumber, HmacSha256Signer, PayloadSigner,
    SigningError, VerificationFailure,
};
use crate::workflows::certification::domain::{
    ApplicationStatus, CertificateStatus, RegionCode,
};
use crate::workflows::certification::errors::{
    BusinessRuleViolation, ValidationError, WorkflowError,
};
use crate::workflows::certification::memory::InMemoryCertificateRepository;
use crate::workflows::certification::repository::CertificateRepository;

const NUMBER: &str = "GACP-2025-CM-0001";

#[test]
fn certificate_numbers_format_and_parse() {
    let number = CertificateNumber::new("GACP", 2025, RegionCode("CM".to_string()), 7);
    assert_eq!(number.to_string(), "GACP-2025-CM-0007");
    assert_eq!(CertificateNumber::parse(" GACP-2025-CM-0007 "), Some(number));

    for malformed in [
        "",
        "GACP-2025-CM",
        "GACP-20x5-CM-0001",
        "GACP-2025-CM-0001-9",
        "-2025-CM-0001",
        "GACP-2025--0001",
        "GACP-2025-C-M-0001",
        "GACP--2025-CM-0001",
    ] {
        assert_eq!(CertificateNumber::parse(malformed), None, "{malformed}");
    }

    let hyphenated = CertificateNumber::new("TH-GACP", 2025, RegionCode("CM".to_string()), 12);
    assert_eq!(hyphenated.to_string(), "TH-GACP-2025-CM-0012");
    assert_eq!(
        CertificateNumber::parse("TH-GACP-2025-CM-0012"),
        Some(hyphenated)
    );
}

#[test]
fn hyphenated_prefix_still_issues_certificates() {
    let mut config = WorkflowConfig::default();
    config.certificates.prefix = "TH-GACP".to_string();
    let harness = Harness::with_config(config);

    let (application, certificate) = harness.issued("farmer-1");
    assert_eq!(application.status, ApplicationStatus::CertificateIssued);
    assert_eq!(certificate.certificate_number, "TH-GACP-2025-CM-0001");
    assert!(harness.queue.failed_jobs().expect("queue readable").is_empty());
    assert!(harness
        .engine
        .verify_certificate("TH-GACP-2025-CM-0001", None)
        .expect("verification runs")
        .valid);
}

#[test]
fn unusable_farm_region_falls_back_to_province() {
    let harness = Harness::new();

    let mut draft = new_draft();
    draft.farm.region = RegionCode("C-M".to_string());
    let hyphenated = harness
        .engine
        .create_application(&applicant("farmer-1"), draft)
        .expect("application created");
    assert_eq!(hyphenated.farm.region, RegionCode("CM".to_string()));

    let mut draft = new_draft();
    draft.farm.region = RegionCode(" bk ".to_string());
    let explicit = harness
        .engine
        .create_application(&applicant("farmer-2"), draft)
        .expect("application created");
    assert_eq!(explicit.farm.region, RegionCode("BK".to_string()));
}

#[test]
fn hmac_signer_detects_tampering() {
    match HmacSha256Signer::new("") {
        Err(SigningError::InvalidKey(_)) => {}
        other => panic!("expected invalid key, got {other:?}"),
    }

    let signer = HmacSha256Signer::new(SIGNING_KEY).expect("key accepted");
    let signature = signer.sign(b"certificate payload").expect("signed");
    assert_eq!(signature.len(), 64);
    assert_eq!(
        signer.sign(b"certificate payload").expect("signed"),
        signature
    );
    assert!(signer
        .verify(b"certificate payload", &signature)
        .expect("verified"));
    assert!(!signer
        .verify(b"certificate paylaod", &signature)
        .expect("verified"));
    assert!(!signer
        .verify(b"certificate payload", "not-hex")
        .expect("verified"));

    let other = HmacSha256Signer::new("another-key").expect("key accepted");
    assert!(!other
        .verify(b"certificate payload", &signature)
        .expect("verified"));
}

#[test]
fn issued_certificate_verifies_and_is_cached() {
    let harness = Harness::new();
    let (_, certificate) = harness.issued("farmer-1");
    assert_eq!(certificate.certificate_number, NUMBER);

    let result = harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs");
    assert!(result.valid);
    assert_eq!(result.reason, None);
    assert_eq!(result.status, Some(CertificateStatus::Active));
    assert_eq!(result.holder_name.as_deref(), Some("Somchai Jaidee"));
    assert_eq!(result.farm_name.as_deref(), Some("Doi Saket Green Farm"));
    assert_eq!(result.expiry_date, Some(certificate.expiry_date));
    assert!(harness
        .cache
        .contains(&keys::certificate_verification(NUMBER, None)));

    let lowercase = certificate.verification_code.to_ascii_lowercase();
    let with_code = harness
        .engine
        .verify_certificate(NUMBER, Some(&lowercase))
        .expect("verification runs");
    assert!(with_code.valid);
}

#[test]
fn wrong_code_and_unknown_number_fail_verification() {
    let harness = Harness::new();
    harness.issued("farmer-1");

    let wrong = harness
        .engine
        .verify_certificate(NUMBER, Some("0000"))
        .expect("verification runs");
    assert!(!wrong.valid);
    assert_eq!(wrong.reason, Some(VerificationFailure::InvalidCode));
    assert_eq!(wrong.holder_name, None);
    assert!(harness
        .cache
        .contains(&keys::certificate_verification(NUMBER, Some("0000"))));

    let missing = harness
        .engine
        .verify_certificate("GACP-2025-CM-9999", None)
        .expect("verification runs");
    assert_eq!(missing.reason, Some(VerificationFailure::NotFound));
    assert_eq!(missing.status, None);
    assert!(!harness
        .cache
        .contains(&keys::certificate_verification("GACP-2025-CM-9999", None)));
}

#[test]
fn tampered_certificate_fails_signature_check() {
    let harness = Harness::new();
    let (_, certificate) = harness.issued("farmer-1");

    let mut forged = certificate.clone();
    forged.holder_name = "Someone Else".to_string();
    harness
        .certificates
        .save(forged)
        .expect("certificate store writable");

    let result = harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs");
    assert!(!result.valid);
    assert_eq!(result.reason, Some(VerificationFailure::SignatureMismatch));
    assert!(!harness
        .cache
        .contains(&keys::certificate_verification(NUMBER, None)));
}

#[test]
fn revocation_is_permanent_and_invalidates_cache() {
    let harness = Harness::new();
    let (application, _) = harness.issued("farmer-1");
    harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs");

    match harness
        .engine
        .revoke_certificate(NUMBER, &staff(APPROVER), "   ")
    {
        Err(WorkflowError::Validation(ValidationError::MissingReason)) => {}
        other => panic!("expected missing reason, got {other:?}"),
    }

    let revoked = harness
        .engine
        .revoke_certificate(NUMBER, &staff(APPROVER), "  falsified harvest records ")
        .expect("certificate revoked");
    assert_eq!(revoked.status, CertificateStatus::Revoked);
    assert_eq!(revoked.revoked_at, Some(harness.now()));
    assert_eq!(
        revoked.revocation_reason.as_deref(),
        Some("falsified harvest records")
    );
    assert!(!harness
        .cache
        .contains(&keys::certificate_verification(NUMBER, None)));

    let result = harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs");
    assert_eq!(result.reason, Some(VerificationFailure::NotActive));
    assert_eq!(result.status, Some(CertificateStatus::Revoked));

    let annotated = harness.application(&application.application_id);
    assert_eq!(annotated.status, ApplicationStatus::CertificateIssued);
    let note = &annotated
        .status_history
        .last()
        .expect("history recorded")
        .note;
    assert_eq!(
        note,
        "certificate GACP-2025-CM-0001 revoked: falsified harvest records"
    );

    match harness
        .engine
        .revoke_certificate(NUMBER, &staff(APPROVER), "again")
    {
        Err(WorkflowError::BusinessLogic(
            BusinessRuleViolation::CertificateTransitionNotAllowed {
                operation: "revoked",
                status: CertificateStatus::Revoked,
                ..
            },
        )) => {}
        other => panic!("expected refused revocation, got {other:?}"),
    }
    match harness
        .engine
        .reactivate_certificate(NUMBER, &staff(APPROVER))
    {
        Err(WorkflowError::BusinessLogic(
            BusinessRuleViolation::CertificateTransitionNotAllowed { .. },
        )) => {}
        other => panic!("expected refused reactivation, got {other:?}"),
    }
}

#[test]
fn suspension_can_be_lifted() {
    let harness = Harness::new();
    harness.issued("farmer-1");

    match harness
        .engine
        .suspend_certificate(NUMBER, &staff(APPROVER), vec![String::new()])
    {
        Err(WorkflowError::Validation(ValidationError::MissingReason)) => {}
        other => panic!("expected missing reason, got {other:?}"),
    }

    let suspended = harness
        .engine
        .suspend_certificate(
            NUMBER,
            &staff(APPROVER),
            vec!["pesticide residue above limit".to_string()],
        )
        .expect("certificate suspended");
    assert_eq!(suspended.status, CertificateStatus::Suspended);
    let result = harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs");
    assert_eq!(result.reason, Some(VerificationFailure::NotActive));

    match harness
        .engine
        .renew_certificate(NUMBER, &staff(APPROVER), None)
    {
        Err(WorkflowError::BusinessLogic(
            BusinessRuleViolation::CertificateTransitionNotAllowed {
                operation: "renewed",
                ..
            },
        )) => {}
        other => panic!("expected refused renewal, got {other:?}"),
    }

    let reactivated = harness
        .engine
        .reactivate_certificate(NUMBER, &staff(APPROVER))
        .expect("certificate reactivated");
    assert_eq!(reactivated.status, CertificateStatus::Active);
    assert!(harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs")
        .valid);
}

#[test]
fn renewal_only_inside_the_window() {
    let harness = Harness::new();
    let (_, certificate) = harness.issued("farmer-1");

    match harness
        .engine
        .renew_certificate(NUMBER, &staff(APPROVER), None)
    {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::RenewalWindowClosed {
            days_to_expiry,
            ..
        })) => assert!(days_to_expiry > 90),
        other => panic!("expected closed window, got {other:?}"),
    }

    harness
        .clock
        .set(certificate.expiry_date - Duration::days(30));
    assert_eq!(
        CertificateIssuer::days_to_expiry(&certificate, harness.now()),
        30
    );

    match harness
        .engine
        .renew_certificate(NUMBER, &staff(APPROVER), Some(&uniform_points(8.0)))
    {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::ScoreBelowThreshold {
            required,
            ..
        })) => assert_eq!(required, 70.0),
        other => panic!("expected low recheck score, got {other:?}"),
    }

    let renewed = harness
        .engine
        .renew_certificate(NUMBER, &staff(APPROVER), Some(&uniform_points(15.0)))
        .expect("certificate renewed");
    assert_eq!(
        renewed.expiry_date,
        add_months(certificate.expiry_date, 24)
    );
    assert_eq!(renewed.score, 100.0);
    assert_eq!(renewed.renewal_history.len(), 1);
    assert_eq!(
        renewed.renewal_history[0].previous_expiry,
        certificate.expiry_date
    );
    assert_ne!(renewed.digital_signature, certificate.digital_signature);
    assert!(harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs")
        .valid);
}

#[test]
fn lapsed_certificates_report_expired_and_are_swept() {
    let harness = Harness::new();
    let (_, certificate) = harness.issued("farmer-1");

    harness
        .clock
        .set(certificate.expiry_date + Duration::days(1));
    let lapsed = harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs");
    assert_eq!(lapsed.reason, Some(VerificationFailure::Expired));
    assert_eq!(lapsed.status, Some(CertificateStatus::Active));

    let swept = harness.engine.expire_certificates().expect("sweep runs");
    assert_eq!(swept, vec![NUMBER.to_string()]);
    assert!(harness
        .engine
        .expire_certificates()
        .expect("sweep runs")
        .is_empty());

    let stored = harness
        .certificates
        .find_by_number(NUMBER)
        .expect("certificate store readable")
        .expect("certificate kept");
    assert_eq!(stored.status, CertificateStatus::Expired);

    let result = harness
        .engine
        .verify_certificate(NUMBER, None)
        .expect("verification runs");
    assert_eq!(result.reason, Some(VerificationFailure::Expired));
    assert_eq!(result.status, Some(CertificateStatus::Expired));
}

#[test]
fn unknown_certificate_operations_are_refused() {
    let harness = Harness::new();
    match harness
        .engine
        .suspend_certificate("GACP-2025-CM-0404", &staff(APPROVER), vec!["audit".to_string()])
    {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::CertificateNotFound(number))) => {
            assert_eq!(number, "GACP-2025-CM-0404")
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn sequences_never_repeat_under_contention() {
    let store = Arc::new(InMemoryCertificateRepository::new());
    let region = RegionCode("CM".to_string());

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let region = region.clone();
            thread::spawn(move || {
                (0..25)
                    .map(|_| store.next_sequence(2025, &region).expect("sequence issued"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let issued: BTreeSet<u32> = workers
        .into_iter()
        .flat_map(|worker| worker.join().expect("worker finished"))
        .collect();
    assert_eq!(issued, (1..=200).collect::<BTreeSet<u32>>());

    assert_eq!(
        store
            .next_sequence(2025, &RegionCode("BK".to_string()))
            .expect("sequence issued"),
        1
    );
    assert_eq!(
        store
            .next_sequence(2026, &region)
            .expect("sequence issued"),
        1
    );
}
