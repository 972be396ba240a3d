use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationType, PaymentPhase, PaymentRecord, PaymentStatus};

/// Fee amounts (in whole baht) and due-date offsets per payment phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub currency: String,
    pub phase1: u32,
    pub phase2: u32,
    pub penalty: u32,
    pub replacement: u32,
    pub due_days: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            currency: "THB".to_string(),
            phase1: 5_000,
            phase2: 30_000,
            penalty: 5_000,
            replacement: 500,
            due_days: 7,
        }
    }
}

/// Single line of a fee quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeLine {
    pub phase: PaymentPhase,
    pub amount: u32,
    pub currency: String,
    pub description: &'static str,
}

/// Full fee quote for an application type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeQuote {
    pub application_type: ApplicationType,
    pub lines: Vec<FeeLine>,
    pub total: u32,
}

/// Pure fee logic; owns no state beyond the configured schedule.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn amount_for(&self, phase: PaymentPhase) -> u32 {
        match phase {
            PaymentPhase::Phase1 => self.schedule.phase1,
            PaymentPhase::Phase2 => self.schedule.phase2,
            PaymentPhase::Penalty => self.schedule.penalty,
            PaymentPhase::Replacement => self.schedule.replacement,
        }
    }

    /// Phases an application of this type is expected to pay, excluding penalties.
    pub fn phases_for(application_type: ApplicationType) -> &'static [PaymentPhase] {
        match application_type {
            ApplicationType::New | ApplicationType::Renewal => {
                &[PaymentPhase::Phase1, PaymentPhase::Phase2]
            }
            ApplicationType::Replacement => &[PaymentPhase::Replacement],
        }
    }

    pub fn quote(&self, application_type: ApplicationType) -> FeeQuote {
        let lines: Vec<FeeLine> = Self::phases_for(application_type)
            .iter()
            .map(|phase| FeeLine {
                phase: *phase,
                amount: self.amount_for(*phase),
                currency: self.schedule.currency.clone(),
                description: describe(*phase),
            })
            .collect();
        let total = lines.iter().map(|line| line.amount).sum();

        FeeQuote {
            application_type,
            lines,
            total,
        }
    }

    /// Open a pending record for `phase`, due `due_days` from `now`.
    pub fn open_record(&self, phase: PaymentPhase, now: DateTime<Utc>) -> PaymentRecord {
        PaymentRecord {
            amount: self.amount_for(phase),
            currency: self.schedule.currency.clone(),
            status: PaymentStatus::Pending,
            due_date: Some(now + Duration::days(self.schedule.due_days)),
            paid_at: None,
            transaction_id: None,
            method: None,
        }
    }

    /// Records that exist from the moment an application is created.
    pub fn initial_records(
        &self,
        application_type: ApplicationType,
        now: DateTime<Utc>,
    ) -> BTreeMap<PaymentPhase, PaymentRecord> {
        let mut records = BTreeMap::new();
        if matches!(
            application_type,
            ApplicationType::New | ApplicationType::Renewal
        ) {
            records.insert(
                PaymentPhase::Phase1,
                self.open_record(PaymentPhase::Phase1, now),
            );
        }
        records
    }
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self::new(FeeSchedule::default())
    }
}

fn describe(phase: PaymentPhase) -> &'static str {
    match phase {
        PaymentPhase::Phase1 => "application and document review fee",
        PaymentPhase::Phase2 => "inspection and certification fee",
        PaymentPhase::Penalty => "revision penalty fee",
        PaymentPhase::Replacement => "replacement certificate fee",
    }
}
