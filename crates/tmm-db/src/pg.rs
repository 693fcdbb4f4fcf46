//! Postgres [`LedgerStore`].
//!
//! Every mutation is a single transaction. The owning tool row is locked with
//! `select ... for update` before anything else, which is the point where
//! concurrent mutations of one tool serialize. Dropping the transaction on
//! any error rolls it back.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tmm_ledger::{
    apply_patch, check_tool, total_from_sum, truncate_to_micros, validate_new_tool,
};
use tmm_schemas::{
    AuditAction, AuditEntity, AuditEvent, CounterEntryPatch, NewCounterEntry, NewTool,
    ShotCounterEntry, ShotSource, Tool, ToolPatch, ToolStatus,
};
use uuid::Uuid;

use crate::store::{entry_event, recompute_event, tool_event};
use crate::{LedgerStore, LedgerWrite, Recomputed, StoreError};

const TOOL_COLUMNS: &str = r#"
    tool_id, asset_number, name, description, manufacturer, cavity_count, status,
    location, initial_shot_count, max_shot_count, current_shot_count, created_at,
    updated_at
"#;

const ENTRY_COLUMNS: &str = "entry_id, tool_id, shot_count, source, recorded_by, recorded_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn db_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                // unique_violation
                Some("23505") => return StoreError::Conflict(format!("{op}: {}", db.message())),
                // check_violation: the schema mirrors the ledger invariants
                Some("23514") => {
                    return StoreError::InvariantViolation(format!("{op}: {}", db.message()))
                }
                // data_exception class: the value itself is unacceptable
                Some(code) if code.starts_with("22") => {
                    return StoreError::Validation(format!("{op}: {}", db.message()))
                }
                _ => {}
            }
        }
        StoreError::Transient(format!("{op} failed: {e}"))
    }
}

fn decode_err(op: &'static str, what: &str) -> StoreError {
    StoreError::InvariantViolation(format!("{op}: undecodable {what} in stored row"))
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn tool_from_row(row: &PgRow) -> Result<Tool, StoreError> {
    let status: String = row.try_get("status").map_err(db_err("decode tool"))?;
    let status = ToolStatus::parse(&status).ok_or_else(|| decode_err("decode tool", "status"))?;

    let tool = Tool {
        tool_id: row.try_get("tool_id").map_err(db_err("decode tool"))?,
        asset_number: row.try_get("asset_number").map_err(db_err("decode tool"))?,
        name: row.try_get("name").map_err(db_err("decode tool"))?,
        description: row.try_get("description").map_err(db_err("decode tool"))?,
        manufacturer: row.try_get("manufacturer").map_err(db_err("decode tool"))?,
        cavity_count: row.try_get("cavity_count").map_err(db_err("decode tool"))?,
        status,
        location: row.try_get("location").map_err(db_err("decode tool"))?,
        initial_shot_count: row
            .try_get("initial_shot_count")
            .map_err(db_err("decode tool"))?,
        max_shot_count: row.try_get("max_shot_count").map_err(db_err("decode tool"))?,
        current_shot_count: row
            .try_get("current_shot_count")
            .map_err(db_err("decode tool"))?,
        created_at: row.try_get("created_at").map_err(db_err("decode tool"))?,
        updated_at: row.try_get("updated_at").map_err(db_err("decode tool"))?,
    };
    check_tool(&tool)?;
    Ok(tool)
}

fn entry_from_row(row: &PgRow) -> Result<ShotCounterEntry, StoreError> {
    let source: String = row.try_get("source").map_err(db_err("decode entry"))?;
    let source =
        ShotSource::parse(&source).ok_or_else(|| decode_err("decode entry", "source"))?;

    Ok(ShotCounterEntry {
        entry_id: row.try_get("entry_id").map_err(db_err("decode entry"))?,
        tool_id: row.try_get("tool_id").map_err(db_err("decode entry"))?,
        shot_count: row.try_get("shot_count").map_err(db_err("decode entry"))?,
        source,
        recorded_by: row.try_get("recorded_by").map_err(db_err("decode entry"))?,
        recorded_at: row.try_get("recorded_at").map_err(db_err("decode entry"))?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEvent, StoreError> {
    let entity_type: String = row.try_get("entity_type").map_err(db_err("decode audit"))?;
    let action: String = row.try_get("action").map_err(db_err("decode audit"))?;

    Ok(AuditEvent {
        event_id: row.try_get("event_id").map_err(db_err("decode audit"))?,
        entity_type: AuditEntity::parse(&entity_type)
            .ok_or_else(|| decode_err("decode audit", "entity_type"))?,
        entity_id: row.try_get("entity_id").map_err(db_err("decode audit"))?,
        action: AuditAction::parse(&action).ok_or_else(|| decode_err("decode audit", "action"))?,
        actor: row.try_get("actor").map_err(db_err("decode audit"))?,
        ts_utc: row.try_get("ts_utc").map_err(db_err("decode audit"))?,
        payload: row.try_get("payload").map_err(db_err("decode audit"))?,
    })
}

// ---------------------------------------------------------------------------
// Statements run inside a transaction
// ---------------------------------------------------------------------------

/// Row lock on the tool. Everything after this in the transaction is
/// serialized against other mutations of the same tool.
async fn lock_tool(conn: &mut PgConnection, tool_id: Uuid) -> Result<Tool, StoreError> {
    let sql = format!("select {TOOL_COLUMNS} from tools where tool_id = $1 for update");
    let row = sqlx::query(&sql)
        .bind(tool_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err("lock_tool"))?
        .ok_or_else(|| StoreError::tool_not_found(tool_id))?;
    tool_from_row(&row)
}

/// Full recompute: sum the whole ledger and apply the clamp rule.
async fn reconcile_locked(conn: &mut PgConnection, tool: &mut Tool) -> Result<i64, StoreError> {
    // sum(bigint) is numeric; read it as text so no precision is lost.
    let (sum,): (String,) = sqlx::query_as(
        r#"
        select coalesce(sum(shot_count), 0)::text
        from shot_counter_entries
        where tool_id = $1
        "#,
    )
    .bind(tool.tool_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err("ledger sum"))?;

    let sum: i128 = sum
        .parse()
        .map_err(|_| StoreError::InvariantViolation(format!("ledger sum '{sum}' is not integral")))?;
    let total = total_from_sum(tool.initial_shot_count, sum)?;
    tool.current_shot_count = total;
    Ok(total)
}

async fn write_tool(conn: &mut PgConnection, tool: &Tool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        update tools set
          name = $2,
          description = $3,
          manufacturer = $4,
          cavity_count = $5,
          status = $6,
          location = $7,
          initial_shot_count = $8,
          max_shot_count = $9,
          current_shot_count = $10,
          updated_at = $11
        where tool_id = $1
        "#,
    )
    .bind(tool.tool_id)
    .bind(&tool.name)
    .bind(&tool.description)
    .bind(&tool.manufacturer)
    .bind(tool.cavity_count)
    .bind(tool.status.as_str())
    .bind(&tool.location)
    .bind(tool.initial_shot_count)
    .bind(tool.max_shot_count)
    .bind(tool.current_shot_count)
    .bind(tool.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err("update tool"))?;
    Ok(())
}

async fn insert_audit(conn: &mut PgConnection, ev: &AuditEvent) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        insert into audit_events (event_id, entity_type, entity_id, action, actor, ts_utc, payload)
        values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(ev.event_id)
    .bind(ev.entity_type.as_str())
    .bind(ev.entity_id)
    .bind(ev.action.as_str())
    .bind(ev.actor)
    .bind(ev.ts_utc)
    .bind(&ev.payload)
    .execute(&mut *conn)
    .await
    .map_err(db_err("insert audit event"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn insert_tool(&self, new: NewTool, actor: Option<Uuid>) -> Result<Tool, StoreError> {
        validate_new_tool(&new)?;

        let now = truncate_to_micros(Utc::now());
        let mut tool = Tool {
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
        };
        // A new tool has an empty ledger.
        tool.current_shot_count = total_from_sum(tool.initial_shot_count, 0)?;

        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;
        sqlx::query(
            r#"
            insert into tools (
              tool_id, asset_number, name, description, manufacturer, cavity_count, status,
              location, initial_shot_count, max_shot_count, current_shot_count, created_at,
              updated_at
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(tool.tool_id)
        .bind(&tool.asset_number)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&tool.manufacturer)
        .bind(tool.cavity_count)
        .bind(tool.status.as_str())
        .bind(&tool.location)
        .bind(tool.initial_shot_count)
        .bind(tool.max_shot_count)
        .bind(tool.current_shot_count)
        .bind(tool.created_at)
        .bind(tool.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("insert tool"))?;

        insert_audit(&mut tx, &tool_event(AuditAction::Create, &tool, actor)).await?;
        tx.commit().await.map_err(db_err("commit"))?;
        Ok(tool)
    }

    async fn fetch_tool(&self, tool_id: Uuid) -> Result<Tool, StoreError> {
        let sql = format!("select {TOOL_COLUMNS} from tools where tool_id = $1");
        let row = sqlx::query(&sql)
            .bind(tool_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("fetch tool"))?
            .ok_or_else(|| StoreError::tool_not_found(tool_id))?;
        tool_from_row(&row)
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, StoreError> {
        let sql = format!("select {TOOL_COLUMNS} from tools order by created_at asc, tool_id asc");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list tools"))?;
        rows.iter().map(tool_from_row).collect()
    }

    async fn update_tool(
        &self,
        tool_id: Uuid,
        patch: ToolPatch,
        actor: Option<Uuid>,
    ) -> Result<Tool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;
        let mut tool = lock_tool(&mut tx, tool_id).await?;
        let before = tool.current_shot_count;

        let baseline_changed = apply_patch(&mut tool, &patch)?;
        if baseline_changed {
            reconcile_locked(&mut tx, &mut tool).await?;
        }
        tool.updated_at = truncate_to_micros(Utc::now());

        write_tool(&mut tx, &tool).await?;
        insert_audit(&mut tx, &tool_event(AuditAction::Update, &tool, actor)).await?;
        if baseline_changed {
            insert_audit(&mut tx, &recompute_event(before, &tool, actor)).await?;
        }
        tx.commit().await.map_err(db_err("commit"))?;
        Ok(tool)
    }

    async fn delete_tool(&self, tool_id: Uuid, actor: Option<Uuid>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;
        let tool = lock_tool(&mut tx, tool_id).await?;

        // Children first, then the tool itself.
        sqlx::query("delete from shot_counter_entries where tool_id = $1")
            .bind(tool_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("delete entries"))?;
        sqlx::query("delete from tools where tool_id = $1")
            .bind(tool_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("delete tool"))?;

        insert_audit(&mut tx, &tool_event(AuditAction::Delete, &tool, actor)).await?;
        tx.commit().await.map_err(db_err("commit"))?;
        Ok(())
    }

    async fn append_entry(&self, entry: NewCounterEntry) -> Result<LedgerWrite, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;
        let mut tool = lock_tool(&mut tx, entry.tool_id).await?;

        let entry = ShotCounterEntry::from(entry);
        sqlx::query(
            r#"
            insert into shot_counter_entries (
              entry_id, tool_id, shot_count, source, recorded_by, recorded_at
            ) values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.tool_id)
        .bind(entry.shot_count)
        .bind(entry.source.as_str())
        .bind(entry.recorded_by)
        .bind(entry.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("insert entry"))?;

        reconcile_locked(&mut tx, &mut tool).await?;
        tool.updated_at = truncate_to_micros(Utc::now());
        write_tool(&mut tx, &tool).await?;

        let ev = entry_event(AuditAction::Append, &entry, None, &tool, entry.recorded_by);
        insert_audit(&mut tx, &ev).await?;
        tx.commit().await.map_err(db_err("commit"))?;
        Ok(LedgerWrite { entry, tool })
    }

    async fn amend_entry(
        &self,
        entry_id: Uuid,
        patch: CounterEntryPatch,
        actor: Option<Uuid>,
    ) -> Result<LedgerWrite, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;

        // Resolve the owner, lock it, then re-read the entry under the lock.
        let (tool_id,): (Uuid,) =
            sqlx::query_as("select tool_id from shot_counter_entries where entry_id = $1")
                .bind(entry_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err("resolve entry"))?
                .ok_or_else(|| StoreError::entry_not_found(entry_id))?;
        let mut tool = lock_tool(&mut tx, tool_id).await?;

        let sql = format!("select {ENTRY_COLUMNS} from shot_counter_entries where entry_id = $1");
        let row = sqlx::query(&sql)
            .bind(entry_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("fetch entry"))?
            .ok_or_else(|| StoreError::entry_not_found(entry_id))?;
        let mut entry = entry_from_row(&row)?;
        let previous = entry.shot_count;
        patch.apply_to(&mut entry);

        sqlx::query(
            "update shot_counter_entries set shot_count = $2, source = $3 where entry_id = $1",
        )
        .bind(entry.entry_id)
        .bind(entry.shot_count)
        .bind(entry.source.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err("amend entry"))?;

        reconcile_locked(&mut tx, &mut tool).await?;
        tool.updated_at = truncate_to_micros(Utc::now());
        write_tool(&mut tx, &tool).await?;

        let ev = entry_event(AuditAction::Amend, &entry, Some(previous), &tool, actor);
        insert_audit(&mut tx, &ev).await?;
        tx.commit().await.map_err(db_err("commit"))?;
        Ok(LedgerWrite { entry, tool })
    }

    async fn fetch_entry(&self, entry_id: Uuid) -> Result<ShotCounterEntry, StoreError> {
        let sql = format!("select {ENTRY_COLUMNS} from shot_counter_entries where entry_id = $1");
        let row = sqlx::query(&sql)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("fetch entry"))?
            .ok_or_else(|| StoreError::entry_not_found(entry_id))?;
        entry_from_row(&row)
    }

    async fn list_entries(
        &self,
        tool_id: Option<Uuid>,
    ) -> Result<Vec<ShotCounterEntry>, StoreError> {
        let rows = match tool_id {
            Some(id) => {
                // Unknown tool is NotFound, not an empty ledger.
                self.fetch_tool(id).await?;
                let sql = format!(
                    "select {ENTRY_COLUMNS} from shot_counter_entries \
                     where tool_id = $1 order by recorded_at asc, entry_id asc"
                );
                sqlx::query(&sql)
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err("list entries"))?
            }
            None => {
                let sql = format!(
                    "select {ENTRY_COLUMNS} from shot_counter_entries \
                     order by recorded_at asc, entry_id asc"
                );
                sqlx::query(&sql)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err("list entries"))?
            }
        };
        rows.iter().map(entry_from_row).collect()
    }

    async fn recompute_tool(
        &self,
        tool_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Recomputed, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;
        let mut tool = lock_tool(&mut tx, tool_id).await?;
        let before = tool.current_shot_count;

        reconcile_locked(&mut tx, &mut tool).await?;
        if tool.current_shot_count != before {
            tool.updated_at = truncate_to_micros(Utc::now());
            write_tool(&mut tx, &tool).await?;
        }

        insert_audit(&mut tx, &recompute_event(before, &tool, actor)).await?;
        tx.commit().await.map_err(db_err("commit"))?;
        Ok(Recomputed {
            tool,
            previous_shot_count: before,
        })
    }

    async fn list_audit(&self, entity_id: Option<Uuid>) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            select event_id, entity_type, entity_id, action, actor, ts_utc, payload
            from audit_events
            where ($1::uuid is null or entity_id = $1)
            order by seq asc
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list audit"))?;
        rows.iter().map(audit_from_row).collect()
    }
}
