//! Shared runtime state for tmm-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The state is built once
//! in `main.rs` from the loaded configuration and never mutated afterwards.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tmm_config::AppConfig;
use tmm_db::CounterLedger;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::IdentityResolver;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    /// A tool's committed total after a ledger mutation, edit or recompute.
    TotalChanged {
        tool_id: Uuid,
        entry_id: Option<Uuid>,
        current_shot_count: i64,
    },
    LogLine {
        level: String,
        msg: String,
    },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub ledger: CounterLedger,
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityResolver>,
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(
        ledger: CounterLedger,
        config: Arc<AppConfig>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            ledger,
            config,
            identity,
            bus,
            build: BuildInfo {
                service: "tmm-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }

    /// Publish to SSE subscribers. No subscribers is not an error.
    pub fn publish(&self, msg: BusMsg) {
        let _ = self.bus.send(msg);
    }
}
