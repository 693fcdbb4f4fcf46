//! Storage boundary for tools, the shot-counter ledger and the audit trail.
//!
//! # Contract (every backend)
//! - Each ledger mutation is one atomic unit: entry write, full recompute of
//!   the owning tool's total, tool write and audit row commit together or
//!   not at all.
//! - Mutations touching the same tool serialize. Different tools do not
//!   contend.
//! - `current_shot_count` is only ever written by the recompute.
//! - Entries are listed by `(recorded_at, entry_id)` ascending.

use async_trait::async_trait;
use serde_json::json;
use tmm_schemas::{
    AuditAction, AuditEntity, AuditEvent, CounterEntryPatch, NewCounterEntry, NewTool,
    ShotCounterEntry, Tool, ToolPatch,
};
use uuid::Uuid;

use crate::StoreError;

/// Result of a ledger mutation: the entry and the owning tool exactly as
/// committed in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerWrite {
    pub entry: ShotCounterEntry,
    pub tool: Tool,
}

/// Result of a full recompute. `previous_shot_count` is the stored total read
/// under the same lock, before the recompute replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recomputed {
    pub tool: Tool,
    pub previous_shot_count: i64,
}

impl Recomputed {
    pub fn drifted(&self) -> bool {
        self.previous_shot_count != self.tool.current_shot_count
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Short backend name for health output ("memory" | "postgres").
    fn backend(&self) -> &'static str;

    async fn insert_tool(&self, new: NewTool, actor: Option<Uuid>) -> Result<Tool, StoreError>;

    async fn fetch_tool(&self, tool_id: Uuid) -> Result<Tool, StoreError>;

    /// All tools ordered by `(created_at, tool_id)`.
    async fn list_tools(&self) -> Result<Vec<Tool>, StoreError>;

    /// Administrative edit. A baseline change recomputes the total before
    /// commit.
    async fn update_tool(
        &self,
        tool_id: Uuid,
        patch: ToolPatch,
        actor: Option<Uuid>,
    ) -> Result<Tool, StoreError>;

    /// Deletes the tool's entries, then the tool.
    async fn delete_tool(&self, tool_id: Uuid, actor: Option<Uuid>) -> Result<(), StoreError>;

    /// Fails with `NotFound` (and writes nothing) when the tool is unknown.
    async fn append_entry(&self, entry: NewCounterEntry) -> Result<LedgerWrite, StoreError>;

    async fn amend_entry(
        &self,
        entry_id: Uuid,
        patch: CounterEntryPatch,
        actor: Option<Uuid>,
    ) -> Result<LedgerWrite, StoreError>;

    async fn fetch_entry(&self, entry_id: Uuid) -> Result<ShotCounterEntry, StoreError>;

    /// `Some(tool_id)` restricts to one tool and fails with `NotFound` for an
    /// unknown tool.
    async fn list_entries(&self, tool_id: Option<Uuid>)
        -> Result<Vec<ShotCounterEntry>, StoreError>;

    /// Full recompute of one tool's total from its ledger.
    async fn recompute_tool(
        &self,
        tool_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Recomputed, StoreError>;

    /// Audit events in commit order, optionally for one entity.
    async fn list_audit(&self, entity_id: Option<Uuid>) -> Result<Vec<AuditEvent>, StoreError>;
}

// ---------------------------------------------------------------------------
// Audit payloads (shared so both backends record the same shape)
// ---------------------------------------------------------------------------

pub(crate) fn tool_event(action: AuditAction, tool: &Tool, actor: Option<Uuid>) -> AuditEvent {
    AuditEvent::new(
        AuditEntity::Tool,
        tool.tool_id,
        action,
        actor,
        json!({
            "asset_number": tool.asset_number,
            "initial_shot_count": tool.initial_shot_count,
            "current_shot_count": tool.current_shot_count,
        }),
    )
}

pub(crate) fn recompute_event(before: i64, tool: &Tool, actor: Option<Uuid>) -> AuditEvent {
    AuditEvent::new(
        AuditEntity::Tool,
        tool.tool_id,
        AuditAction::Recompute,
        actor,
        json!({
            "previous_shot_count": before,
            "current_shot_count": tool.current_shot_count,
        }),
    )
}

pub(crate) fn entry_event(
    action: AuditAction,
    entry: &ShotCounterEntry,
    previous_shot_count: Option<i64>,
    tool: &Tool,
    actor: Option<Uuid>,
) -> AuditEvent {
    AuditEvent::new(
        AuditEntity::ShotCounter,
        entry.entry_id,
        action,
        actor,
        json!({
            "tool_id": entry.tool_id,
            "shot_count": entry.shot_count,
            "previous_shot_count": previous_shot_count,
            "source": entry.source,
            "tool_current_shot_count": tool.current_shot_count,
        }),
    )
}
