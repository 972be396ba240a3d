/// Outcome of counting one more revision request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionOutcome {
    ReturnToApplicant { count: u32 },
    PenaltyTriggered { count: u32 },
}

impl RevisionOutcome {
    pub fn count(self) -> u32 {
        match self {
            RevisionOutcome::ReturnToApplicant { count }
            | RevisionOutcome::PenaltyTriggered { count } => count,
        }
    }
}

/// Counter-plus-threshold logic for revision cycles.
///
/// The penalty fires only when the count moves from `threshold - 1` to `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct RevisionTracker {
    threshold: u32,
}

impl RevisionTracker {
    pub const DEFAULT_THRESHOLD: u32 = 3;

    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record(&self, current: u32) -> RevisionOutcome {
        let count = current.saturating_add(1);
        if current < self.threshold && count == self.threshold {
            RevisionOutcome::PenaltyTriggered { count }
        } else {
            RevisionOutcome::ReturnToApplicant { count }
        }
    }
}

impl Default for RevisionTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}
