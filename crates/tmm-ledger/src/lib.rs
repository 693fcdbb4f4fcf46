//! tmm-ledger
//!
//! Shot-counter accounting rules.
//!
//! - A tool's running total is a pure fold over its ledger:
//!   `current = max(initial, initial + Σ shot_count)`.
//! - The fold is recomputed in full on every ledger mutation, so the total
//!   never depends on the order entries were appended or amended in.
//! - `current_shot_count >= initial_shot_count` holds for every tool a
//!   store hands out.
//!
//! Deterministic, pure logic. No IO, no clock.

mod aggregate;
mod error;
mod ordering;
mod reconcile;

pub use aggregate::{apply_patch, check_tool, usage, validate_new_tool, ShotUsage};
pub use error::LedgerError;
pub use ordering::{
    check_recorded_at, ledger_key, sort_entries, truncate_to_micros, RECORDED_AT_MAX_YEAR,
    RECORDED_AT_MIN_YEAR,
};
pub use reconcile::{check_aggregate, reconcile_tool, running_total, total_from_sum};
