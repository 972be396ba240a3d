use chrono::Duration;

use super::common::*;
use crate::workflows::certification::domain::{
    ApplicationStatus, ApplicationType, PaymentMethod, PaymentPhase, PaymentStatus,
};
use crate::workflows::certification::errors::{
    BusinessRuleViolation, ValidationError, WorkflowError,
};
use crate::workflows::certification::notifications::NotificationEvent;
use crate::workflows::certification::payments::{
    parse_phase, LedgerPaymentGate, PaymentConfirmation, PaymentGate,
};

#[test]
fn phase1_payment_is_recorded_once() {
    let harness = Harness::new();
    let id = harness.create("farmer-1").application_id;

    let paid = harness
        .engine
        .process_payment(
            &id,
            "phase1",
            &PaymentConfirmation {
                transaction_id: "  PP-000123  ".to_string(),
                method: PaymentMethod::BankTransfer,
            },
        )
        .expect("phase1 confirmed");
    assert_eq!(paid.status, ApplicationStatus::Draft);

    let record = paid
        .payment_for(PaymentPhase::Phase1)
        .expect("phase1 record");
    assert_eq!(record.status, PaymentStatus::Completed);
    assert_eq!(record.transaction_id.as_deref(), Some("PP-000123"));
    assert_eq!(record.method, Some(PaymentMethod::BankTransfer));
    assert_eq!(record.paid_at, Some(start()));

    match harness
        .engine
        .confirm_payment(&id, PaymentPhase::Phase1, &confirmation(PaymentPhase::Phase1))
    {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::PaymentAlreadyCompleted {
            phase: PaymentPhase::Phase1,
        })) => {}
        other => panic!("expected duplicate payment refusal, got {other:?}"),
    }

    let unchanged = harness.application(&id);
    let record = unchanged
        .payment_for(PaymentPhase::Phase1)
        .expect("phase1 record");
    assert_eq!(record.transaction_id.as_deref(), Some("PP-000123"));

    harness.settle();
    let confirmed: Vec<_> = harness
        .notifier
        .sent()
        .into_iter()
        .filter(|notification| notification.event == NotificationEvent::PaymentConfirmed)
        .collect();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(
        confirmed[0].details.get("amount").map(String::as_str),
        Some("5000")
    );
}

#[test]
fn payment_keys_are_validated() {
    let harness = Harness::new();
    let id = harness.create("farmer-1").application_id;

    match harness
        .engine
        .process_payment(&id, "deposit", &confirmation(PaymentPhase::Phase1))
    {
        Err(WorkflowError::Validation(ValidationError::UnknownPaymentPhase(key))) => {
            assert_eq!(key, "deposit")
        }
        other => panic!("expected unknown phase, got {other:?}"),
    }

    match harness.engine.confirm_payment(
        &id,
        PaymentPhase::Phase1,
        &PaymentConfirmation {
            transaction_id: " ".to_string(),
            method: PaymentMethod::Counter,
        },
    ) {
        Err(WorkflowError::Validation(ValidationError::MissingField("transaction_id"))) => {}
        other => panic!("expected missing transaction id, got {other:?}"),
    }

    assert!(matches!(parse_phase("2"), Ok(PaymentPhase::Phase2)));
    assert!(matches!(parse_phase(" Penalty "), Ok(PaymentPhase::Penalty)));
}

#[test]
fn payments_out_of_sequence_are_refused() {
    let harness = Harness::new();
    let id = harness.create("farmer-1").application_id;

    match harness
        .engine
        .confirm_payment(&id, PaymentPhase::Phase2, &confirmation(PaymentPhase::Phase2))
    {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::InvalidState {
            operation: "confirm_payment",
            status: ApplicationStatus::Draft,
        })) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }

    let reviewing = harness.under_review("farmer-2").application_id;
    match harness.engine.confirm_payment(
        &reviewing,
        PaymentPhase::Penalty,
        &confirmation(PaymentPhase::Penalty),
    ) {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::InvalidState { .. })) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn phase2_payment_unlocks_inspection_and_is_not_charged_twice() {
    let harness = Harness::new();
    let id = harness.under_review("farmer-1").application_id;

    let pending = harness
        .engine
        .approve_for_payment(&id, &staff(OFFICER))
        .expect("documents approved");
    assert_eq!(pending.status, ApplicationStatus::PaymentPending);
    let due = pending
        .payment_for(PaymentPhase::Phase2)
        .and_then(|record| record.due_date)
        .expect("phase2 due date");
    assert_eq!(due, harness.now() + Duration::days(7));

    let verified = harness
        .engine
        .confirm_payment(&id, PaymentPhase::Phase2, &confirmation(PaymentPhase::Phase2))
        .expect("phase2 confirmed");
    assert_eq!(verified.status, ApplicationStatus::PaymentVerified);

    harness
        .engine
        .schedule_inspection(&id, &staff(OFFICER), None)
        .expect("inspection scheduled");
    harness
        .engine
        .complete_inspection(&id, &staff(AUDITOR), uniform_points(14.0))
        .expect("inspection recorded");
    harness.settle();

    let settled = harness.application(&id);
    assert_eq!(settled.status, ApplicationStatus::Phase2PaymentVerified);
    let phase2_entries = settled
        .status_history
        .iter()
        .filter(|entry| entry.state == ApplicationStatus::Phase2PaymentPending)
        .count();
    assert_eq!(phase2_entries, 1);

    match harness
        .engine
        .confirm_payment(&id, PaymentPhase::Phase2, &confirmation(PaymentPhase::Phase2))
    {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::PaymentAlreadyCompleted {
            phase: PaymentPhase::Phase2,
        })) => {}
        other => panic!("expected duplicate payment refusal, got {other:?}"),
    }
}

#[test]
fn unpaid_payment_pending_application_expires_after_seven_days() {
    let harness = Harness::new();
    let id = harness.under_review("farmer-1").application_id;
    harness
        .engine
        .approve_for_payment(&id, &staff(OFFICER))
        .expect("documents approved");

    harness.clock.advance(Duration::days(6));
    assert!(harness
        .engine
        .expire_stalled_applications()
        .expect("sweep runs")
        .is_empty());

    harness.clock.advance(Duration::days(2));
    let expired = harness
        .engine
        .expire_stalled_applications()
        .expect("sweep runs");
    assert_eq!(expired, vec![id.clone()]);

    match harness
        .engine
        .confirm_payment(&id, PaymentPhase::Phase2, &confirmation(PaymentPhase::Phase2))
    {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::InvalidState {
            status: ApplicationStatus::Expired,
            ..
        })) => {}
        other => panic!("expected expired application to refuse payment, got {other:?}"),
    }
}

#[test]
fn ledger_gate_requires_an_opened_record() {
    let harness = Harness::new();
    let mut application = harness.create("farmer-1");
    let gate = LedgerPaymentGate;

    match gate.ensure_paid(&application, PaymentPhase::Phase1) {
        Err(BusinessRuleViolation::PaymentRequired {
            phase: PaymentPhase::Phase1,
        }) => {}
        other => panic!("expected payment required, got {other:?}"),
    }

    match gate.confirm(
        &mut application,
        PaymentPhase::Penalty,
        &confirmation(PaymentPhase::Penalty),
        start(),
    ) {
        Err(WorkflowError::BusinessLogic(BusinessRuleViolation::PaymentNotOpened {
            phase: PaymentPhase::Penalty,
        })) => {}
        other => panic!("expected unopened record, got {other:?}"),
    }

    gate.confirm(
        &mut application,
        PaymentPhase::Phase1,
        &confirmation(PaymentPhase::Phase1),
        start(),
    )
    .expect("phase1 confirmed");
    assert!(gate.ensure_paid(&application, PaymentPhase::Phase1).is_ok());
}

#[test]
fn fee_quotes_cover_each_application_type() {
    let harness = Harness::new();
    let fees = harness.engine.fees();

    let new = fees.quote(ApplicationType::New);
    assert_eq!(new.total, 35_000);
    assert_eq!(new.lines.len(), 2);

    let replacement = fees.quote(ApplicationType::Replacement);
    assert_eq!(replacement.total, 500);
    assert_eq!(replacement.lines[0].phase, PaymentPhase::Replacement);
    assert_eq!(fees.amount_for(PaymentPhase::Penalty), 5_000);
}
