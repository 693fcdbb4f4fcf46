//! Scenario: amending an entry re-folds the ledger instead of adding a delta
//!
//! GREEN when:
//! - Ledger [10, 5] on baseline b, first entry amended to 20, yields b + 25.
//! - Re-running the recompute on unchanged state is a no-op.

use chrono::Utc;
use tmm_ledger::{check_tool, reconcile_tool};
use tmm_schemas::{Tool, ToolStatus};
use uuid::Uuid;

fn tool(baseline: i64) -> Tool {
    let now = Utc::now();
    Tool {
        tool_id: Uuid::new_v4(),
        asset_number: "T-7".to_string(),
        name: "Trim die".to_string(),
        description: None,
        manufacturer: None,
        cavity_count: None,
        status: ToolStatus::Active,
        location: None,
        initial_shot_count: baseline,
        max_shot_count: None,
        current_shot_count: baseline,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn amend_replaces_the_historical_value() {
    let b = 1_000;
    let mut t = tool(b);
    let mut ledger = vec![10_i64, 5];

    reconcile_tool(&mut t, ledger.iter().copied()).unwrap();
    assert_eq!(t.current_shot_count, b + 15);

    ledger[0] = 20;
    reconcile_tool(&mut t, ledger.iter().copied()).unwrap();
    assert_eq!(t.current_shot_count, b + 20 + 5);
    assert_ne!(t.current_shot_count, b + 10 + 5 + 10);

    reconcile_tool(&mut t, ledger.iter().copied()).unwrap();
    assert_eq!(t.current_shot_count, b + 25, "recompute must be idempotent");
    check_tool(&t).unwrap();
}

#[test]
fn failed_recompute_leaves_tool_unchanged() {
    let mut t = tool(10);
    reconcile_tool(&mut t, [4]).unwrap();
    let before = t.clone();

    assert!(reconcile_tool(&mut t, [i64::MAX]).is_err());
    assert_eq!(t, before);
}
