//! Tool aggregate rules.
//!
//! The reconciler is the only writer of `current_shot_count`. Everything in
//! this module validates or reads the other tool fields and never touches the
//! total.

use serde::{Deserialize, Serialize};
use tmm_schemas::{NewTool, Tool, ToolPatch};

use crate::reconcile::check_aggregate;
use crate::LedgerError;

/// Validate an onboarding payload before it reaches a store.
pub fn validate_new_tool(t: &NewTool) -> Result<(), LedgerError> {
    if t.asset_number.trim().is_empty() {
        return Err(LedgerError::EmptyField {
            field: "asset_number",
        });
    }
    if t.name.trim().is_empty() {
        return Err(LedgerError::EmptyField { field: "name" });
    }
    if t.initial_shot_count < 0 {
        return Err(LedgerError::NegativeBaseline {
            baseline: t.initial_shot_count,
        });
    }
    if let Some(max) = t.max_shot_count {
        if max < 0 {
            return Err(LedgerError::NegativeMaxShotCount { max });
        }
    }
    Ok(())
}

/// Apply an administrative edit.
///
/// Returns `true` when the baseline changed, in which case the caller must
/// run a full recompute before committing. On error `tool` is untouched.
pub fn apply_patch(tool: &mut Tool, patch: &ToolPatch) -> Result<bool, LedgerError> {
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(LedgerError::EmptyField { field: "name" });
        }
    }
    if let Some(baseline) = patch.initial_shot_count {
        if baseline < 0 {
            return Err(LedgerError::NegativeBaseline { baseline });
        }
    }
    if let Some(max) = patch.max_shot_count {
        if max < 0 {
            return Err(LedgerError::NegativeMaxShotCount { max });
        }
    }

    if let Some(v) = &patch.name {
        tool.name = v.clone();
    }
    if let Some(v) = &patch.description {
        tool.description = Some(v.clone());
    }
    if let Some(v) = &patch.manufacturer {
        tool.manufacturer = Some(v.clone());
    }
    if let Some(v) = patch.cavity_count {
        tool.cavity_count = Some(v);
    }
    if let Some(v) = patch.status {
        tool.status = v;
    }
    if let Some(v) = &patch.location {
        tool.location = Some(v.clone());
    }
    if let Some(v) = patch.max_shot_count {
        tool.max_shot_count = Some(v);
    }

    let baseline_changed = match patch.initial_shot_count {
        Some(v) if v != tool.initial_shot_count => {
            tool.initial_shot_count = v;
            true
        }
        _ => false,
    };

    Ok(baseline_changed)
}

/// Check a tool handed out by a store.
pub fn check_tool(tool: &Tool) -> Result<(), LedgerError> {
    check_aggregate(tool.initial_shot_count, tool.current_shot_count)
}

/// Wear relative to the configured maintenance limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotUsage {
    /// `max_shot_count - current_shot_count`; negative once the limit is passed.
    pub remaining_shots: Option<i64>,
    pub maintenance_due: bool,
}

pub fn usage(tool: &Tool) -> ShotUsage {
    match tool.max_shot_count {
        Some(max) => ShotUsage {
            remaining_shots: Some(max.saturating_sub(tool.current_shot_count)),
            maintenance_due: tool.current_shot_count >= max,
        },
        None => ShotUsage {
            remaining_shots: None,
            maintenance_due: false,
        },
    }
}
