//! Request and response types for the tmm-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tmm_ledger::{usage, ShotUsage};
use tmm_schemas::{CounterEntryPatch, ShotCounterEntry, ShotSource, Tool, ToolPatch};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    /// "memory" | "postgres"
    pub backend: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. "NOT_FOUND".
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// A tool with its derived wear figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolView {
    #[serde(flatten)]
    pub tool: Tool,
    #[serde(flatten)]
    pub usage: ShotUsage,
}

impl From<Tool> for ToolView {
    fn from(tool: Tool) -> Self {
        let usage = usage(&tool);
        Self { tool, usage }
    }
}

/// PATCH /api/tools/:tool_id
///
/// `current_shot_count` is accepted by the parser only so that a request
/// carrying it can be refused explicitly instead of silently dropped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolPatchRequest {
    #[serde(flatten)]
    pub patch: ToolPatch,
    #[serde(default)]
    pub current_shot_count: Option<Value>,
}

// ---------------------------------------------------------------------------
// Shot counters
// ---------------------------------------------------------------------------

/// POST /api/shot-counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCounterRequest {
    pub tool_id: Uuid,
    pub shot_count: i64,
    #[serde(default)]
    pub source: ShotSource,
    /// Defaults to submission time.
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// PATCH /api/shot-counters/:entry_id
///
/// An entry never moves to another tool or another ledger position.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AmendCounterRequest {
    #[serde(flatten)]
    pub patch: CounterEntryPatch,
    #[serde(default)]
    pub tool_id: Option<Value>,
    #[serde(default)]
    pub recorded_at: Option<Value>,
}

/// An entry plus the owning tool's total as committed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntryView {
    #[serde(flatten)]
    pub entry: ShotCounterEntry,
    pub tool_current_shot_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CounterListQuery {
    pub tool_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub entity_id: Option<Uuid>,
}
