//! Scenario: concurrent appends on one tool never lose an update
//!
//! GREEN when:
//! - Two concurrent appends (5 and 7) against baseline 0 yield exactly 12.
//! - Many concurrent appends across two tools each land on their own tool
//!   and the totals equal the fold over the committed ledgers.

use std::sync::Arc;

use futures_util::future::join_all;
use tmm_db::{CounterLedger, MemStore, Submission};
use tmm_schemas::{NewTool, ShotSource};
use uuid::Uuid;

fn submission(tool_id: Uuid, shot_count: i64) -> Submission {
    Submission {
        tool_id,
        shot_count,
        source: ShotSource::Automatic,
        recorded_at: None,
        recorded_by: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_concurrent_appends_sum_to_twelve() {
    let ledger = CounterLedger::new(Arc::new(MemStore::new()));
    let tool = ledger
        .create_tool(NewTool::new("M-1", "Cap mold"), None)
        .await
        .unwrap();
    let tool_id = tool.tool_id;

    let a = tokio::spawn({
        let ledger = ledger.clone();
        async move { ledger.append(submission(tool_id, 5)).await }
    });
    let b = tokio::spawn({
        let ledger = ledger.clone();
        async move { ledger.append(submission(tool_id, 7)).await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(ledger.tool(tool_id).await.unwrap().current_shot_count, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_appends_across_tools() {
    let ledger = CounterLedger::new(Arc::new(MemStore::new()));
    let t1 = ledger
        .create_tool(NewTool::new("M-1", "Cap mold").with_baseline(1_000), None)
        .await
        .unwrap();
    let t2 = ledger
        .create_tool(NewTool::new("M-2", "Lid mold"), None)
        .await
        .unwrap();

    let tasks = (1..=100i64).map(|i| {
        let ledger = ledger.clone();
        let tool_id = if i % 2 == 0 { t1.tool_id } else { t2.tool_id };
        tokio::spawn(async move { ledger.append(submission(tool_id, i)).await })
    });
    for res in join_all(tasks).await {
        res.unwrap().unwrap();
    }

    let even: i64 = (1..=100i64).filter(|i| i % 2 == 0).sum();
    let odd: i64 = (1..=100i64).filter(|i| i % 2 == 1).sum();
    assert_eq!(ledger.tool(t1.tool_id).await.unwrap().current_shot_count, 1_000 + even);
    assert_eq!(ledger.tool(t2.tool_id).await.unwrap().current_shot_count, odd);

    assert_eq!(ledger.list(Some(t1.tool_id)).await.unwrap().len(), 50);
    assert_eq!(ledger.list(None).await.unwrap().len(), 100);
}
