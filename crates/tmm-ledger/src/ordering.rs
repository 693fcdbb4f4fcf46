//! Ledger ordering.
//!
//! Entries are listed by `(recorded_at, entry_id)` ascending. Several entries
//! may share a timestamp, so the id tie-break is what makes the order total
//! and stable across calls.

use chrono::{DateTime, Datelike, SubsecRound, Utc};
use tmm_schemas::ShotCounterEntry;
use uuid::Uuid;

use crate::LedgerError;

/// Years a `recorded_at` may fall in. Narrower than both chrono and
/// Postgres `timestamptz`, so every store accepts exactly the same values.
pub const RECORDED_AT_MIN_YEAR: i32 = 1;
pub const RECORDED_AT_MAX_YEAR: i32 = 9999;

pub fn ledger_key(e: &ShotCounterEntry) -> (DateTime<Utc>, Uuid) {
    (e.recorded_at, e.entry_id)
}

pub fn sort_entries(entries: &mut [ShotCounterEntry]) {
    entries.sort_by_key(ledger_key);
}

/// Postgres `timestamptz` keeps microseconds. Truncating at submission keeps
/// the in-memory and database orderings identical.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

pub fn check_recorded_at(ts: DateTime<Utc>) -> Result<(), LedgerError> {
    if (RECORDED_AT_MIN_YEAR..=RECORDED_AT_MAX_YEAR).contains(&ts.year()) {
        return Ok(());
    }
    Err(LedgerError::RecordedAtOutOfRange {
        recorded_at: ts,
        min: RECORDED_AT_MIN_YEAR,
        max: RECORDED_AT_MAX_YEAR,
    })
}
