//! Full-recompute reconciler.
//!
//! # Rule
//! `current_shot_count = max(initial, initial + Σ entries.shot_count)`
//!
//! The sum is accumulated in `i128` so that no intermediate partial sum can
//! overflow; only the final clamped total has to fit in `i64`. That keeps
//! the result independent of the order the deltas are visited in. A total
//! that does not fit is a rejected submission, not broken state: the write
//! that would produce it never commits.

use tmm_schemas::Tool;

use crate::LedgerError;

/// Fold a tool's ledger deltas into its running total.
pub fn running_total<I>(baseline: i64, deltas: I) -> Result<i64, LedgerError>
where
    I: IntoIterator<Item = i64>,
{
    let sum: i128 = deltas.into_iter().map(i128::from).sum();
    clamp_total(baseline, sum)
}

/// Same rule as [`running_total`], for a ledger sum already computed by the
/// database. Postgres sums `bigint` into `numeric`, so the value is taken
/// as `i128` and never truncated on the way in.
pub fn total_from_sum(baseline: i64, sum: i128) -> Result<i64, LedgerError> {
    clamp_total(baseline, sum)
}

/// Recompute `tool.current_shot_count` from the given deltas.
///
/// `tool` is only modified when the recompute succeeds.
pub fn reconcile_tool<I>(tool: &mut Tool, deltas: I) -> Result<i64, LedgerError>
where
    I: IntoIterator<Item = i64>,
{
    let total = running_total(tool.initial_shot_count, deltas)?;
    tool.current_shot_count = total;
    Ok(total)
}

/// Aggregate invariant: the running total never drops below the baseline.
pub fn check_aggregate(initial: i64, current: i64) -> Result<(), LedgerError> {
    if current < initial {
        return Err(LedgerError::BelowBaseline { initial, current });
    }
    Ok(())
}

fn clamp_total(baseline: i64, sum: i128) -> Result<i64, LedgerError> {
    if baseline < 0 {
        return Err(LedgerError::NegativeBaseline { baseline });
    }

    let base = i128::from(baseline);
    let total = (base + sum).max(base);
    let total = i64::try_from(total).map_err(|_| LedgerError::TotalOutOfRange { baseline, sum })?;

    check_aggregate(baseline, total)?;
    Ok(total)
}
