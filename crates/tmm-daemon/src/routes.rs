//! Axum router and all HTTP handlers for tmm-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers (CORS, tracing). Auth is part of the router itself so
//! tests exercise it too.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use tmm_db::{LedgerWrite, Submission};
use tmm_schemas::{AuditEvent, NewTool, ShotCounterEntry};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{
    api_types::{
        AmendCounterRequest, AuditQuery, CounterEntryView, CounterListQuery, HealthResponse,
        SubmitCounterRequest, ToolPatchRequest, ToolView,
    },
    auth::{require_caller, CallerIdentity},
    error::{ApiError, ApiResult},
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Resource routes are mounted under `service.api_prefix` (default `/api`).
/// Everything except `/v1/health` requires a bearer token.
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth = middleware::from_fn_with_state(Arc::clone(&state), require_caller);

    let api = Router::new()
        .route("/tools", get(list_tools).post(create_tool))
        .route(
            "/tools/:tool_id",
            get(get_tool).patch(patch_tool).delete(delete_tool),
        )
        .route("/tools/:tool_id/recompute", post(recompute_tool))
        .route("/shot-counters", get(list_counters).post(submit_counter))
        .route(
            "/shot-counters/:entry_id",
            get(get_counter).patch(amend_counter),
        )
        .route("/audit", get(list_audit))
        .route_layer(auth.clone());

    let router = Router::new()
        .route("/v1/health", get(health))
        .merge(
            Router::new()
                .route("/v1/stream", get(stream))
                .route_layer(auth),
        );

    let prefix = state.config.api_prefix();
    let router = if prefix.is_empty() {
        router.merge(api)
    } else {
        router.nest(&prefix, api)
    };
    router.with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            backend: st.ledger.backend(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::TotalChanged { .. } => "total_changed",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

fn publish_total(st: &AppState, w: &LedgerWrite) {
    st.publish(BusMsg::TotalChanged {
        tool_id: w.tool.tool_id,
        entry_id: Some(w.entry.entry_id),
        current_shot_count: w.tool.current_shot_count,
    });
}

// ---------------------------------------------------------------------------
// /api/tools
// ---------------------------------------------------------------------------

pub(crate) async fn list_tools(State(st): State<Arc<AppState>>) -> ApiResult<Json<Vec<ToolView>>> {
    let tools = st.ledger.tools().await?;
    Ok(Json(tools.into_iter().map(ToolView::from).collect()))
}

pub(crate) async fn create_tool(
    State(st): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    body: Result<Json<NewTool>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ToolView>)> {
    let Json(new) = body?;
    let tool = st.ledger.create_tool(new, Some(caller.user_id)).await?;

    st.publish(BusMsg::LogLine {
        level: "info".to_string(),
        msg: format!("tool {} created", tool.asset_number),
    });
    Ok((StatusCode::CREATED, Json(ToolView::from(tool))))
}

pub(crate) async fn get_tool(
    State(st): State<Arc<AppState>>,
    tool_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ToolView>> {
    let Path(tool_id) = tool_id?;
    let tool = st.ledger.tool(tool_id).await?;
    Ok(Json(ToolView::from(tool)))
}

/// Administrative edit. The running total is never writable here.
pub(crate) async fn patch_tool(
    State(st): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    tool_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ToolPatchRequest>, JsonRejection>,
) -> ApiResult<Json<ToolView>> {
    let Path(tool_id) = tool_id?;
    let Json(req) = body?;
    if req.current_shot_count.is_some() {
        return Err(ApiError::BadRequest(
            "current_shot_count is derived from the shot-counter ledger; submit or amend entries instead"
                .to_string(),
        ));
    }

    let tool = st
        .ledger
        .edit_tool(tool_id, req.patch, Some(caller.user_id))
        .await?;
    st.publish(BusMsg::TotalChanged {
        tool_id,
        entry_id: None,
        current_shot_count: tool.current_shot_count,
    });
    Ok(Json(ToolView::from(tool)))
}

pub(crate) async fn delete_tool(
    State(st): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    tool_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(tool_id) = tool_id?;
    st.ledger.delete_tool(tool_id, Some(caller.user_id)).await?;

    st.publish(BusMsg::LogLine {
        level: "info".to_string(),
        msg: format!("tool {tool_id} deleted"),
    });
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn recompute_tool(
    State(st): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    tool_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ToolView>> {
    let Path(tool_id) = tool_id?;
    let tool = st.ledger.recompute(tool_id, Some(caller.user_id)).await?;
    st.publish(BusMsg::TotalChanged {
        tool_id,
        entry_id: None,
        current_shot_count: tool.current_shot_count,
    });
    Ok(Json(ToolView::from(tool)))
}

// ---------------------------------------------------------------------------
// /api/shot-counters
// ---------------------------------------------------------------------------

pub(crate) async fn list_counters(
    State(st): State<Arc<AppState>>,
    query: Result<Query<CounterListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ShotCounterEntry>>> {
    let Query(q) = query?;
    Ok(Json(st.ledger.list(q.tool_id).await?))
}

/// Append to the ledger. `recorded_by` is always the authenticated caller.
pub(crate) async fn submit_counter(
    State(st): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    body: Result<Json<SubmitCounterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CounterEntryView>)> {
    let Json(req) = body?;
    let w = st
        .ledger
        .append(Submission {
            tool_id: req.tool_id,
            shot_count: req.shot_count,
            source: req.source,
            recorded_at: req.recorded_at,
            recorded_by: Some(caller.user_id),
        })
        .await?;

    publish_total(&st, &w);
    Ok((StatusCode::CREATED, Json(entry_view(w))))
}

pub(crate) async fn get_counter(
    State(st): State<Arc<AppState>>,
    entry_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ShotCounterEntry>> {
    let Path(entry_id) = entry_id?;
    Ok(Json(st.ledger.entry(entry_id).await?))
}

pub(crate) async fn amend_counter(
    State(st): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    entry_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<AmendCounterRequest>, JsonRejection>,
) -> ApiResult<Json<CounterEntryView>> {
    let Path(entry_id) = entry_id?;
    let Json(req) = body?;
    if req.tool_id.is_some() || req.recorded_at.is_some() {
        return Err(ApiError::BadRequest(
            "tool_id and recorded_at are fixed once an entry is recorded".to_string(),
        ));
    }

    let w = st
        .ledger
        .amend(entry_id, req.patch, Some(caller.user_id))
        .await?;

    publish_total(&st, &w);
    Ok(Json(entry_view(w)))
}

fn entry_view(w: LedgerWrite) -> CounterEntryView {
    CounterEntryView {
        tool_current_shot_count: w.tool.current_shot_count,
        entry: w.entry,
    }
}

// ---------------------------------------------------------------------------
// GET /api/audit
// ---------------------------------------------------------------------------

pub(crate) async fn list_audit(
    State(st): State<Arc<AppState>>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AuditEvent>>> {
    let Query(q) = query?;
    Ok(Json(st.ledger.audit(q.entity_id).await?))
}
