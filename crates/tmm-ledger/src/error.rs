use chrono::{DateTime, Utc};
use thiserror::Error;

/// Everything the accounting rules can refuse.
///
/// Validation variants come from caller input and are safe to surface as a
/// client error. Invariant variants mean stored state is already wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("initial_shot_count must be >= 0, got {baseline}")]
    NegativeBaseline { baseline: i64 },

    #[error("max_shot_count must be >= 0, got {max}")]
    NegativeMaxShotCount { max: i64 },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("shot count total out of range (baseline={baseline}, ledger_sum={sum}); the total must fit in a signed 64-bit integer")]
    TotalOutOfRange { baseline: i64, sum: i128 },

    #[error("recorded_at {recorded_at} is outside the supported years {min}..={max}")]
    RecordedAtOutOfRange {
        recorded_at: DateTime<Utc>,
        min: i32,
        max: i32,
    },

    #[error("ledger invariant: current_shot_count {current} is below initial_shot_count {initial}")]
    BelowBaseline { initial: i64, current: i64 },
}

impl LedgerError {
    /// True when the error indicates corrupted or impossible state rather
    /// than bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, LedgerError::BelowBaseline { .. })
    }
}
