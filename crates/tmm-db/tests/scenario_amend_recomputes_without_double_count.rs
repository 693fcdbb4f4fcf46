//! Scenario: amending an entry recomputes the total from the whole ledger
//!
//! GREEN when:
//! - Appending [10, 5] then amending the first to 20 yields b + 20 + 5.
//! - Amending only the source leaves the total unchanged.
//! - The amended entry keeps its id and position in the ledger.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tmm_db::{CounterLedger, MemStore, StoreError, Submission};
use tmm_schemas::{CounterEntryPatch, NewTool, ShotSource};
use uuid::Uuid;

#[tokio::test]
async fn amend_replaces_the_historical_value() {
    let ledger = CounterLedger::new(Arc::new(MemStore::new()));
    let tool = ledger
        .create_tool(NewTool::new("M-7", "Bezel mold").with_baseline(100), None)
        .await
        .unwrap();

    let first = ledger
        .append(Submission {
            tool_id: tool.tool_id,
            shot_count: 10,
            source: ShotSource::Manual,
            recorded_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()),
            recorded_by: None,
        })
        .await
        .unwrap();
    ledger
        .append(Submission {
            tool_id: tool.tool_id,
            shot_count: 5,
            source: ShotSource::Manual,
            recorded_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap()),
            recorded_by: None,
        })
        .await
        .unwrap();

    let amended = ledger
        .amend(
            first.entry.entry_id,
            CounterEntryPatch {
                shot_count: Some(20),
                source: None,
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(amended.tool.current_shot_count, 100 + 20 + 5);
    assert_eq!(amended.entry.entry_id, first.entry.entry_id);
    assert_eq!(amended.entry.recorded_at, first.entry.recorded_at);

    let entries = ledger.list(Some(tool.tool_id)).await.unwrap();
    assert_eq!(entries[0].entry_id, first.entry.entry_id);
    assert_eq!(entries[0].shot_count, 20);
}

#[tokio::test]
async fn source_only_amend_keeps_total() {
    let ledger = CounterLedger::new(Arc::new(MemStore::new()));
    let tool = ledger
        .create_tool(NewTool::new("M-8", "Clip mold"), None)
        .await
        .unwrap();
    let w = ledger
        .append(Submission {
            tool_id: tool.tool_id,
            shot_count: 42,
            source: ShotSource::Manual,
            recorded_at: None,
            recorded_by: None,
        })
        .await
        .unwrap();

    let amended = ledger
        .amend(
            w.entry.entry_id,
            CounterEntryPatch {
                shot_count: None,
                source: Some(ShotSource::Imported),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(amended.tool.current_shot_count, 42);
    assert_eq!(amended.entry.source, ShotSource::Imported);
}

#[tokio::test]
async fn amend_of_unknown_entry_is_not_found() {
    let ledger = CounterLedger::new(Arc::new(MemStore::new()));
    let err = ledger
        .amend(Uuid::new_v4(), CounterEntryPatch::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "{err}");
}
