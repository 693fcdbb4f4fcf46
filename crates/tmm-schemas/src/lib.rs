//! Plain domain records shared by the ledger, the stores and the daemon.
//!
//! Everything here is `Serialize + Deserialize` and carries no behaviour
//! beyond string conversions for the enum columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Where a shot-count observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShotSource {
    #[default]
    Manual,
    Imported,
    Automatic,
}

impl ShotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotSource::Manual => "manual",
            ShotSource::Imported => "imported",
            ShotSource::Automatic => "automatic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(ShotSource::Manual),
            "imported" => Some(ShotSource::Imported),
            "automatic" => Some(ShotSource::Automatic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Active,
    Maintenance,
    Retired,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Active => "active",
            ToolStatus::Maintenance => "maintenance",
            ToolStatus::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ToolStatus::Active),
            "maintenance" => Some(ToolStatus::Maintenance),
            "retired" => Some(ToolStatus::Retired),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

/// A tooling asset. `current_shot_count` is derived from the shot-counter
/// ledger and is only ever written by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub tool_id: Uuid,
    pub asset_number: String,
    pub name: String,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub cavity_count: Option<i32>,
    pub status: ToolStatus,
    pub location: Option<String>,
    /// Usage the tool had before ledger tracking began.
    pub initial_shot_count: i64,
    /// Shot count at which the tool is due for maintenance, if tracked.
    pub max_shot_count: Option<i64>,
    pub current_shot_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Onboarding payload for a new tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTool {
    pub asset_number: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub cavity_count: Option<i32>,
    #[serde(default)]
    pub status: ToolStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub initial_shot_count: i64,
    #[serde(default)]
    pub max_shot_count: Option<i64>,
}

impl NewTool {
    pub fn new(asset_number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            asset_number: asset_number.into(),
            name: name.into(),
            description: None,
            manufacturer: None,
            cavity_count: None,
            status: ToolStatus::Active,
            location: None,
            initial_shot_count: 0,
            max_shot_count: None,
        }
    }

    pub fn with_baseline(mut self, initial_shot_count: i64) -> Self {
        self.initial_shot_count = initial_shot_count;
        self
    }
}

/// Administrative edit of a tool. Absent fields are left unchanged.
///
/// There is no `current_shot_count` here: the running total moves only
/// through ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub cavity_count: Option<i32>,
    #[serde(default)]
    pub status: Option<ToolStatus>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub initial_shot_count: Option<i64>,
    #[serde(default)]
    pub max_shot_count: Option<i64>,
}

// ---------------------------------------------------------------------------
// Shot-counter ledger
// ---------------------------------------------------------------------------

/// One recorded shot-count observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotCounterEntry {
    pub entry_id: Uuid,
    pub tool_id: Uuid,
    /// Delta recorded by this submission. Negative values are corrections.
    pub shot_count: i64,
    pub source: ShotSource,
    pub recorded_by: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

/// A fully resolved entry ready to be written (id and timestamp assigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCounterEntry {
    pub entry_id: Uuid,
    pub tool_id: Uuid,
    pub shot_count: i64,
    pub source: ShotSource,
    pub recorded_by: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

impl From<NewCounterEntry> for ShotCounterEntry {
    fn from(n: NewCounterEntry) -> Self {
        Self {
            entry_id: n.entry_id,
            tool_id: n.tool_id,
            shot_count: n.shot_count,
            source: n.source,
            recorded_by: n.recorded_by,
            recorded_at: n.recorded_at,
        }
    }
}

/// In-place amendment of an entry. `recorded_at` is not amendable so an
/// entry keeps its position in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntryPatch {
    #[serde(default)]
    pub shot_count: Option<i64>,
    #[serde(default)]
    pub source: Option<ShotSource>,
}

impl CounterEntryPatch {
    pub fn apply_to(&self, entry: &mut ShotCounterEntry) {
        if let Some(n) = self.shot_count {
            entry.shot_count = n;
        }
        if let Some(s) = self.source {
            entry.source = s;
        }
    }
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    Tool,
    ShotCounter,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::Tool => "tool",
            AuditEntity::ShotCounter => "shot_counter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(AuditEntity::Tool),
            "shot_counter" => Some(AuditEntity::ShotCounter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Append,
    Amend,
    Recompute,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Append => "append",
            AuditAction::Amend => "amend",
            AuditAction::Recompute => "recompute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(AuditAction::Create),
            "update" => Some(AuditAction::Update),
            "delete" => Some(AuditAction::Delete),
            "append" => Some(AuditAction::Append),
            "amend" => Some(AuditAction::Amend),
            "recompute" => Some(AuditAction::Recompute),
            _ => None,
        }
    }
}

/// Append-only record of a mutation, written in the same transaction as the
/// mutation itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub entity_type: AuditEntity,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub actor: Option<Uuid>,
    pub ts_utc: DateTime<Utc>,
    pub payload: Value,
}

impl AuditEvent {
    pub fn new(
        entity_type: AuditEntity,
        entity_id: Uuid,
        action: AuditAction,
        actor: Option<Uuid>,
        payload: Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            entity_type,
            entity_id,
            action,
            actor,
            ts_utc: Utc::now(),
            payload,
        }
    }
}
