//! Scenario: a failed commit leaves no partial write
//!
//! GREEN when:
//! - An append whose commit fails returns a retryable Transient error.
//! - Neither the entry, the new total, nor an audit row is visible.
//! - Retrying the same submission succeeds and counts exactly once.

use std::sync::Arc;

use tmm_db::{CounterLedger, LedgerStore, MemStore, StoreError, Submission};
use tmm_schemas::{CounterEntryPatch, NewTool, ShotSource};

fn submission(tool_id: uuid::Uuid, shot_count: i64) -> Submission {
    Submission {
        tool_id,
        shot_count,
        source: ShotSource::Manual,
        recorded_at: None,
        recorded_by: None,
    }
}

#[tokio::test]
async fn failed_append_is_invisible_and_retry_is_safe() {
    let store = Arc::new(MemStore::new());
    let ledger = CounterLedger::new(store.clone());
    let tool = ledger
        .create_tool(NewTool::new("M-3", "Gear mold").with_baseline(10), None)
        .await
        .unwrap();
    let audit_before = ledger.audit(None).await.unwrap().len();

    store.fail_next_commit();
    let err = ledger.append(submission(tool.tool_id, 5)).await.unwrap_err();
    assert!(matches!(err, StoreError::Transient(_)), "{err}");
    assert!(err.is_retryable());

    assert!(ledger.list(Some(tool.tool_id)).await.unwrap().is_empty());
    assert_eq!(ledger.tool(tool.tool_id).await.unwrap().current_shot_count, 10);
    assert_eq!(ledger.audit(None).await.unwrap().len(), audit_before);

    let w = ledger.append(submission(tool.tool_id, 5)).await.unwrap();
    assert_eq!(w.tool.current_shot_count, 15);
    assert_eq!(ledger.list(Some(tool.tool_id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_amend_keeps_old_value() {
    let store = Arc::new(MemStore::new());
    let ledger = CounterLedger::new(store.clone());
    let tool = ledger
        .create_tool(NewTool::new("M-4", "Knob mold"), None)
        .await
        .unwrap();
    let w = ledger.append(submission(tool.tool_id, 8)).await.unwrap();

    store.fail_next_commit();
    ledger
        .amend(
            w.entry.entry_id,
            CounterEntryPatch {
                shot_count: Some(80),
                source: None,
            },
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(store.fetch_entry(w.entry.entry_id).await.unwrap().shot_count, 8);
    assert_eq!(store.fetch_tool(tool.tool_id).await.unwrap().current_shot_count, 8);
}
