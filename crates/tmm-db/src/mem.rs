//! In-memory [`LedgerStore`].
//!
//! Tools live in an arena keyed by id. Each tool slot owns its entries and
//! sits behind its own async mutex, so mutations on one tool serialize while
//! different tools proceed in parallel.
//!
//! Every mutation works on a staged copy of the slot and swaps it in only
//! after the commit point. Any error before that drops the copy, which is
//! the rollback.
//!
//! Lock order: arena map, then slot, then the side indexes, then the audit
//! log. The arena guard is always released before waiting on a slot. Audit
//! events are pushed while the slot guard is still held, so the log follows
//! commit order per tool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tmm_ledger::{
    apply_patch, check_tool, reconcile_tool, sort_entries, truncate_to_micros, validate_new_tool,
};
use tmm_schemas::{
    AuditAction, AuditEvent, CounterEntryPatch, NewCounterEntry, NewTool, ShotCounterEntry, Tool,
    ToolPatch,
};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::store::{entry_event, recompute_event, tool_event};
use crate::{LedgerStore, LedgerWrite, Recomputed, StoreError};

#[derive(Debug, Clone)]
struct ToolSlot {
    tool: Tool,
    /// Kept in ledger order.
    entries: Vec<ShotCounterEntry>,
    /// Set under the slot lock when the tool is deleted, for waiters that
    /// cloned the slot handle before the arena entry was removed.
    deleted: bool,
}

impl ToolSlot {
    /// Policy: full recompute from the whole ledger.
    fn reconcile(&mut self) -> Result<i64, StoreError> {
        let deltas = self.entries.iter().map(|e| e.shot_count);
        Ok(reconcile_tool(&mut self.tool, deltas)?)
    }
}

type SlotHandle = Arc<Mutex<ToolSlot>>;

#[derive(Default)]
pub struct MemStore {
    tools: RwLock<HashMap<Uuid, SlotHandle>>,
    /// asset_number -> tool_id
    assets: Mutex<HashMap<String, Uuid>>,
    /// entry_id -> tool_id
    entry_index: RwLock<HashMap<Uuid, Uuid>>,
    audit: Mutex<Vec<AuditEvent>>,
    fail_next_commit: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: the next mutation fails at its commit point with a
    /// transient error, after all staging work has been done.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn commit_point(&self) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Transient(
                "injected commit failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn slot(&self, tool_id: Uuid) -> Result<SlotHandle, StoreError> {
        let tools = self.tools.read().await;
        tools
            .get(&tool_id)
            .cloned()
            .ok_or_else(|| StoreError::tool_not_found(tool_id))
    }

    async fn tool_of_entry(&self, entry_id: Uuid) -> Result<Uuid, StoreError> {
        let idx = self.entry_index.read().await;
        idx.get(&entry_id)
            .copied()
            .ok_or_else(|| StoreError::entry_not_found(entry_id))
    }

    async fn record(&self, events: impl IntoIterator<Item = AuditEvent>) {
        self.audit.lock().await.extend(events);
    }
}

#[async_trait]
impl LedgerStore for MemStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_tool(&self, new: NewTool, actor: Option<Uuid>) -> Result<Tool, StoreError> {
        validate_new_tool(&new)?;

        let now = truncate_to_micros(Utc::now());
        let mut slot = ToolSlot {
            tool: Tool {
                tool_id: Uuid::new_v4(),
                asset_number: new.asset_number,
                name: new.name,
                description: new.description,
                manufacturer: new.manufacturer,
                cavity_count: new.cavity_count,
                status: new.status,
                location: new.location,
                initial_shot_count: new.initial_shot_count,
                max_shot_count: new.max_shot_count,
                current_shot_count: 0,
                created_at: now,
                updated_at: now,
            },
            entries: Vec::new(),
            deleted: false,
        };
        slot.reconcile()?;
        let tool = slot.tool.clone();

        let mut tools = self.tools.write().await;
        let mut assets = self.assets.lock().await;
        if assets.contains_key(&tool.asset_number) {
            return Err(StoreError::Conflict(format!(
                "asset_number '{}' already exists",
                tool.asset_number
            )));
        }

        self.commit_point()?;
        assets.insert(tool.asset_number.clone(), tool.tool_id);
        tools.insert(tool.tool_id, Arc::new(Mutex::new(slot)));
        self.record([tool_event(AuditAction::Create, &tool, actor)])
            .await;
        Ok(tool)
    }

    async fn fetch_tool(&self, tool_id: Uuid) -> Result<Tool, StoreError> {
        let handle = self.slot(tool_id).await?;
        let slot = handle.lock().await;
        if slot.deleted {
            return Err(StoreError::tool_not_found(tool_id));
        }
        check_tool(&slot.tool)?;
        Ok(slot.tool.clone())
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, StoreError> {
        let handles: Vec<SlotHandle> = self.tools.read().await.values().cloned().collect();

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let slot = handle.lock().await;
            if slot.deleted {
                continue;
            }
            check_tool(&slot.tool)?;
            out.push(slot.tool.clone());
        }
        out.sort_by_key(|t| (t.created_at, t.tool_id));
        Ok(out)
    }

    async fn update_tool(
        &self,
        tool_id: Uuid,
        patch: ToolPatch,
        actor: Option<Uuid>,
    ) -> Result<Tool, StoreError> {
        let handle = self.slot(tool_id).await?;
        let mut slot = handle.lock().await;
        if slot.deleted {
            return Err(StoreError::tool_not_found(tool_id));
        }

        let mut staged = slot.clone();
        let before = staged.tool.current_shot_count;
        let baseline_changed = apply_patch(&mut staged.tool, &patch)?;
        if baseline_changed {
            staged.reconcile()?;
        }
        staged.tool.updated_at = truncate_to_micros(Utc::now());

        self.commit_point()?;
        *slot = staged;
        let tool = slot.tool.clone();

        let mut events = vec![tool_event(AuditAction::Update, &tool, actor)];
        if baseline_changed {
            events.push(recompute_event(before, &tool, actor));
        }
        self.record(events).await;
        Ok(tool)
    }

    async fn delete_tool(&self, tool_id: Uuid, actor: Option<Uuid>) -> Result<(), StoreError> {
        let handle = self.slot(tool_id).await?;
        let mut slot = handle.lock().await;
        if slot.deleted {
            return Err(StoreError::tool_not_found(tool_id));
        }

        self.commit_point()?;

        // Children first, then the tool itself.
        {
            let mut idx = self.entry_index.write().await;
            for e in &slot.entries {
                idx.remove(&e.entry_id);
            }
        }
        slot.entries.clear();
        slot.deleted = true;

        self.tools.write().await.remove(&tool_id);
        self.assets.lock().await.remove(&slot.tool.asset_number);
        self.record([tool_event(AuditAction::Delete, &slot.tool, actor)])
            .await;
        Ok(())
    }

    async fn append_entry(&self, entry: NewCounterEntry) -> Result<LedgerWrite, StoreError> {
        let handle = self.slot(entry.tool_id).await?;
        let mut slot = handle.lock().await;
        if slot.deleted {
            return Err(StoreError::tool_not_found(entry.tool_id));
        }
        if self.entry_index.read().await.contains_key(&entry.entry_id) {
            return Err(StoreError::Conflict(format!(
                "entry {} already exists",
                entry.entry_id
            )));
        }

        let entry = ShotCounterEntry::from(entry);
        let mut staged = slot.clone();
        staged.entries.push(entry.clone());
        sort_entries(&mut staged.entries);
        staged.reconcile()?;
        staged.tool.updated_at = truncate_to_micros(Utc::now());

        self.commit_point()?;
        *slot = staged;
        self.entry_index
            .write()
            .await
            .insert(entry.entry_id, entry.tool_id);
        let tool = slot.tool.clone();

        self.record([entry_event(
            AuditAction::Append,
            &entry,
            None,
            &tool,
            entry.recorded_by,
        )])
        .await;
        Ok(LedgerWrite { entry, tool })
    }

    async fn amend_entry(
        &self,
        entry_id: Uuid,
        patch: CounterEntryPatch,
        actor: Option<Uuid>,
    ) -> Result<LedgerWrite, StoreError> {
        let tool_id = self.tool_of_entry(entry_id).await?;
        let handle = self.slot(tool_id).await?;
        let mut slot = handle.lock().await;
        if slot.deleted {
            return Err(StoreError::entry_not_found(entry_id));
        }

        let mut staged = slot.clone();
        let target = staged
            .entries
            .iter_mut()
            .find(|e| e.entry_id == entry_id)
            .ok_or_else(|| StoreError::entry_not_found(entry_id))?;
        let previous = target.shot_count;
        patch.apply_to(target);
        let entry = target.clone();

        // Always a full recompute: a historical value may have changed.
        staged.reconcile()?;
        staged.tool.updated_at = truncate_to_micros(Utc::now());

        self.commit_point()?;
        *slot = staged;
        let tool = slot.tool.clone();

        self.record([entry_event(
            AuditAction::Amend,
            &entry,
            Some(previous),
            &tool,
            actor,
        )])
        .await;
        Ok(LedgerWrite { entry, tool })
    }

    async fn fetch_entry(&self, entry_id: Uuid) -> Result<ShotCounterEntry, StoreError> {
        let tool_id = self.tool_of_entry(entry_id).await?;
        let handle = self.slot(tool_id).await?;
        let slot = handle.lock().await;
        slot.entries
            .iter()
            .find(|e| e.entry_id == entry_id)
            .cloned()
            .ok_or_else(|| StoreError::entry_not_found(entry_id))
    }

    async fn list_entries(
        &self,
        tool_id: Option<Uuid>,
    ) -> Result<Vec<ShotCounterEntry>, StoreError> {
        let handles: Vec<SlotHandle> = match tool_id {
            Some(id) => vec![self.slot(id).await?],
            None => self.tools.read().await.values().cloned().collect(),
        };

        let mut out = Vec::new();
        for handle in handles {
            let slot = handle.lock().await;
            if slot.deleted {
                if let Some(id) = tool_id {
                    return Err(StoreError::tool_not_found(id));
                }
                continue;
            }
            out.extend(slot.entries.iter().cloned());
        }
        sort_entries(&mut out);
        Ok(out)
    }

    async fn recompute_tool(
        &self,
        tool_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Recomputed, StoreError> {
        let handle = self.slot(tool_id).await?;
        let mut slot = handle.lock().await;
        if slot.deleted {
            return Err(StoreError::tool_not_found(tool_id));
        }

        let mut staged = slot.clone();
        let before = staged.tool.current_shot_count;
        staged.reconcile()?;
        if staged.tool.current_shot_count != before {
            staged.tool.updated_at = truncate_to_micros(Utc::now());
        }

        self.commit_point()?;
        *slot = staged;
        let tool = slot.tool.clone();

        self.record([recompute_event(before, &tool, actor)]).await;
        Ok(Recomputed {
            tool,
            previous_shot_count: before,
        })
    }

    async fn list_audit(&self, entity_id: Option<Uuid>) -> Result<Vec<AuditEvent>, StoreError> {
        let audit = self.audit.lock().await;
        Ok(audit
            .iter()
            .filter(|ev| entity_id.map_or(true, |id| ev.entity_id == id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmm_schemas::ShotSource;

    fn new_entry(tool_id: Uuid, shot_count: i64) -> NewCounterEntry {
        NewCounterEntry {
            entry_id: Uuid::new_v4(),
            tool_id,
            shot_count,
            source: ShotSource::Manual,
            recorded_by: None,
            recorded_at: truncate_to_micros(Utc::now()),
        }
    }

    #[tokio::test]
    async fn duplicate_asset_number_conflicts() {
        let store = MemStore::new();
        store
            .insert_tool(NewTool::new("A-1", "Mold"), None)
            .await
            .unwrap();
        let err = store
            .insert_tool(NewTool::new("A-1", "Other"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "{err}");
    }

    #[tokio::test]
    async fn asset_number_is_released_on_delete() {
        let store = MemStore::new();
        let t = store
            .insert_tool(NewTool::new("A-1", "Mold"), None)
            .await
            .unwrap();
        store.delete_tool(t.tool_id, None).await.unwrap();
        store
            .insert_tool(NewTool::new("A-1", "Mold v2"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn replayed_entry_id_is_rejected() {
        let store = MemStore::new();
        let t = store
            .insert_tool(NewTool::new("A-1", "Mold"), None)
            .await
            .unwrap();
        let e = new_entry(t.tool_id, 10);
        store.append_entry(e.clone()).await.unwrap();
        let err = store.append_entry(e).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.fetch_tool(t.tool_id).await.unwrap().current_shot_count, 10);
    }

    #[tokio::test]
    async fn recompute_is_idempotent() {
        let store = MemStore::new();
        let t = store
            .insert_tool(NewTool::new("A-1", "Mold").with_baseline(50), None)
            .await
            .unwrap();
        store.append_entry(new_entry(t.tool_id, 5)).await.unwrap();
        let a = store.recompute_tool(t.tool_id, None).await.unwrap();
        let b = store.recompute_tool(t.tool_id, None).await.unwrap();
        assert_eq!(a.tool.current_shot_count, 55);
        assert!(!a.drifted());
        assert_eq!(a.tool, b.tool);
    }
}
