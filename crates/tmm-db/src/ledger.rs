//! Counter ledger service.
//!
//! Thin layer over a [`LedgerStore`] that assigns entry ids and timestamps,
//! normalises `recorded_at` to storage precision, and logs every mutation.
//! Handlers and the CLI go through this type rather than the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tmm_ledger::{check_recorded_at, truncate_to_micros};
use tmm_schemas::{
    AuditEvent, CounterEntryPatch, NewCounterEntry, NewTool, ShotCounterEntry, ShotSource, Tool,
    ToolPatch,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{LedgerStore, LedgerWrite, StoreError};

/// One counter submission as received from a caller.
#[derive(Debug, Clone)]
pub struct Submission {
    pub tool_id: Uuid,
    pub shot_count: i64,
    pub source: ShotSource,
    /// Defaults to submission time.
    pub recorded_at: Option<DateTime<Utc>>,
    pub recorded_by: Option<Uuid>,
}

#[derive(Clone)]
pub struct CounterLedger {
    store: Arc<dyn LedgerStore>,
}

impl CounterLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    // -----------------------------------------------------------------------
    // Ledger
    // -----------------------------------------------------------------------

    pub async fn append(&self, sub: Submission) -> Result<LedgerWrite, StoreError> {
        let recorded_at = truncate_to_micros(sub.recorded_at.unwrap_or_else(Utc::now));
        check_recorded_at(recorded_at)
            .map_err(StoreError::from)
            .inspect_err(|e| log_failure("append", sub.tool_id, e))?;

        let entry = NewCounterEntry {
            entry_id: Uuid::new_v4(),
            tool_id: sub.tool_id,
            shot_count: sub.shot_count,
            source: sub.source,
            recorded_by: sub.recorded_by,
            recorded_at,
        };

        let w = self
            .store
            .append_entry(entry)
            .await
            .inspect_err(|e| log_failure("append", sub.tool_id, e))?;

        info!(
            tool_id = %w.tool.tool_id,
            entry_id = %w.entry.entry_id,
            shot_count = w.entry.shot_count,
            current_shot_count = w.tool.current_shot_count,
            "ledger append"
        );
        Ok(w)
    }

    pub async fn amend(
        &self,
        entry_id: Uuid,
        patch: CounterEntryPatch,
        actor: Option<Uuid>,
    ) -> Result<LedgerWrite, StoreError> {
        let w = self
            .store
            .amend_entry(entry_id, patch, actor)
            .await
            .inspect_err(|e| log_failure("amend", entry_id, e))?;

        info!(
            tool_id = %w.tool.tool_id,
            entry_id = %w.entry.entry_id,
            shot_count = w.entry.shot_count,
            current_shot_count = w.tool.current_shot_count,
            "ledger amend"
        );
        Ok(w)
    }

    /// Entries in `(recorded_at, entry_id)` order.
    pub async fn list(&self, tool_id: Option<Uuid>) -> Result<Vec<ShotCounterEntry>, StoreError> {
        self.store.list_entries(tool_id).await
    }

    pub async fn entry(&self, entry_id: Uuid) -> Result<ShotCounterEntry, StoreError> {
        self.store.fetch_entry(entry_id).await
    }

    // -----------------------------------------------------------------------
    // Tools
    // -----------------------------------------------------------------------

    pub async fn create_tool(&self, new: NewTool, actor: Option<Uuid>) -> Result<Tool, StoreError> {
        let asset = new.asset_number.clone();
        let tool = self
            .store
            .insert_tool(new, actor)
            .await
            .inspect_err(|e| warn!(asset_number = %asset, error = %e, "tool create rejected"))?;

        info!(
            tool_id = %tool.tool_id,
            asset_number = %tool.asset_number,
            initial_shot_count = tool.initial_shot_count,
            "tool created"
        );
        Ok(tool)
    }

    pub async fn tool(&self, tool_id: Uuid) -> Result<Tool, StoreError> {
        self.store
            .fetch_tool(tool_id)
            .await
            .inspect_err(|e| log_failure("get_tool", tool_id, e))
    }

    pub async fn tools(&self) -> Result<Vec<Tool>, StoreError> {
        self.store.list_tools().await
    }

    pub async fn edit_tool(
        &self,
        tool_id: Uuid,
        patch: ToolPatch,
        actor: Option<Uuid>,
    ) -> Result<Tool, StoreError> {
        let tool = self
            .store
            .update_tool(tool_id, patch, actor)
            .await
            .inspect_err(|e| log_failure("edit_tool", tool_id, e))?;

        info!(
            tool_id = %tool.tool_id,
            initial_shot_count = tool.initial_shot_count,
            current_shot_count = tool.current_shot_count,
            "tool updated"
        );
        Ok(tool)
    }

    pub async fn delete_tool(&self, tool_id: Uuid, actor: Option<Uuid>) -> Result<(), StoreError> {
        self.store
            .delete_tool(tool_id, actor)
            .await
            .inspect_err(|e| log_failure("delete_tool", tool_id, e))?;
        info!(tool_id = %tool_id, "tool deleted with its ledger");
        Ok(())
    }

    /// Administrative full recompute. A changed total is logged as drift,
    /// judged against the stored total the store read under its lock.
    pub async fn recompute(&self, tool_id: Uuid, actor: Option<Uuid>) -> Result<Tool, StoreError> {
        let r = self
            .store
            .recompute_tool(tool_id, actor)
            .await
            .inspect_err(|e| log_failure("recompute", tool_id, e))?;

        if r.drifted() {
            warn!(
                tool_id = %tool_id,
                stored = r.previous_shot_count,
                recomputed = r.tool.current_shot_count,
                "recompute corrected a drifted total"
            );
        } else {
            info!(
                tool_id = %tool_id,
                current_shot_count = r.tool.current_shot_count,
                "recompute"
            );
        }
        Ok(r.tool)
    }

    pub async fn audit(&self, entity_id: Option<Uuid>) -> Result<Vec<AuditEvent>, StoreError> {
        self.store.list_audit(entity_id).await
    }
}

fn log_failure(op: &'static str, id: Uuid, e: &StoreError) {
    match e {
        StoreError::InvariantViolation(_) => error!(op, id = %id, error = %e, "ledger invariant violated"),
        StoreError::Transient(_) => warn!(op, id = %id, error = %e, "store failure; nothing committed"),
        _ => warn!(op, id = %id, error = %e, "rejected"),
    }
}
