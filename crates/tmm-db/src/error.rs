use thiserror::Error;
use tmm_ledger::LedgerError;
use uuid::Uuid;

/// Failure taxonomy shared by every [`crate::LedgerStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced tool or entry does not exist. Not retried.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Caller input rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unique key collision (tool asset number).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored or computed state breaks a ledger invariant. Fatal to the
    /// operation; indicates a bug or corrupted data.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// I/O failure inside the transaction. Nothing was committed, and the
    /// whole operation is safe to retry.
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn tool_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "tool", id }
    }

    pub fn entry_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            entity: "shot_counter_entry",
            id,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<LedgerError> for StoreError {
    fn from(e: LedgerError) -> Self {
        if e.is_invariant_violation() {
            StoreError::InvariantViolation(e.to_string())
        } else {
            StoreError::Validation(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_split_into_validation_and_invariant() {
        let v: StoreError = LedgerError::NegativeBaseline { baseline: -1 }.into();
        assert!(matches!(v, StoreError::Validation(_)));

        let i: StoreError = LedgerError::BelowBaseline {
            initial: 5,
            current: 4,
        }
        .into();
        assert!(matches!(i, StoreError::InvariantViolation(_)));
        assert!(!i.is_retryable());
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(StoreError::Transient("io".into()).is_retryable());
        assert!(!StoreError::tool_not_found(Uuid::nil()).is_retryable());
        assert!(!StoreError::Conflict("dup".into()).is_retryable());
    }
}
