//! Debug/observability surface.
//!
//! Event feed, per-session timeline, NDJSON live stream, override controls
//! and the cascading reset. Demo tooling only - the whole router is guarded
//! outside dev and none of it sits on the authorization path.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::dtos::debug::{
    AuditQuery, EventQuery, OverrideStateResponse, ResetResponse, RiskOverrideRequest,
    TimeOverrideRequest, TimelineQuery,
};
use crate::models::event::{DebugEvent, DebugEventType};
use crate::services::events::EventFilter;
use crate::utils::ValidatedJson;
use crate::AppState;
use service_core::error::AppError;

const DEFAULT_AUDIT_LIMIT: i64 = 50;

/// Polling feed, most recent first.
#[utoipa::path(
    get,
    path = "/debug/events",
    params(EventQuery),
    responses((status = 200, description = "Buffered events, most recent first", body = [DebugEvent])),
    tag = "Debug"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Json<Vec<DebugEvent>> {
    let filter = EventFilter {
        event_type: query.event_type,
        session_id: query.session_id,
        correlation_id: query.correlation_id,
        limit: query.limit,
    };
    Json(state.events.recent(&filter))
}

/// Chronological view of one session's events.
#[utoipa::path(
    get,
    path = "/debug/events/timeline",
    params(TimelineQuery),
    responses((status = 200, description = "Session events in chronological order", body = [DebugEvent])),
    tag = "Debug"
)]
pub async fn event_timeline(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> Json<Vec<DebugEvent>> {
    Json(state.events.timeline(&query.session_id))
}

/// Live push subscription: newline-framed JSON, one event per line.
#[utoipa::path(
    get,
    path = "/debug/events/stream",
    responses((status = 200, description = "Newline-framed JSON event stream")),
    tag = "Debug"
)]
pub async fn stream_events(State(state): State<AppState>) -> Response {
    let receiver = state.events.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(event) => serde_json::to_string(&event)
                .ok()
                .map(|line| Ok::<_, std::convert::Infallible>(format!("{}\n", line))),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event stream subscriber lagged; events skipped");
                None
            }
        }
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Recent audit records (dashboard consumer).
#[utoipa::path(
    get,
    path = "/debug/audit",
    params(AuditQuery),
    responses((status = 200, description = "Recent audit records, most recent first", body = [AuditRecord])),
    tag = "Debug"
)]
pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, AppError> {
    let records = state
        .audit
        .recent(query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT))
        .await
        .map_err(AppError::from)?;
    Ok(Json(records))
}

/// Pin the risk score.
#[utoipa::path(
    put,
    path = "/debug/overrides/risk",
    request_body = RiskOverrideRequest,
    responses((status = 200, description = "Override applied", body = OverrideStateResponse)),
    tag = "Debug"
)]
pub async fn set_risk_override(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RiskOverrideRequest>,
) -> Json<OverrideStateResponse> {
    state.overrides.set_risk_override(Some(request.value));
    state.events.emit(
        DebugEvent::new(DebugEventType::Risk, "risk_override_set")
            .with_detail(serde_json::json!({ "value": request.value })),
    );
    override_state(&state)
}

/// Restore computed risk scoring.
#[utoipa::path(
    delete,
    path = "/debug/overrides/risk",
    responses((status = 200, description = "Override cleared", body = OverrideStateResponse)),
    tag = "Debug"
)]
pub async fn clear_risk_override(State(state): State<AppState>) -> Json<OverrideStateResponse> {
    state.overrides.set_risk_override(None);
    state
        .events
        .emit(DebugEvent::new(DebugEventType::Risk, "risk_override_cleared"));
    override_state(&state)
}

/// Pin "now" for every time-sensitive computation.
#[utoipa::path(
    put,
    path = "/debug/overrides/time",
    request_body = TimeOverrideRequest,
    responses((status = 200, description = "Override applied", body = OverrideStateResponse)),
    tag = "Debug"
)]
pub async fn set_time_override(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<TimeOverrideRequest>,
) -> Json<OverrideStateResponse> {
    state.overrides.set_time_override(Some(request.timestamp));
    state.events.emit(
        DebugEvent::new(DebugEventType::Risk, "time_override_set")
            .with_detail(serde_json::json!({ "timestamp": request.timestamp })),
    );
    override_state(&state)
}

/// Restore the wall clock.
#[utoipa::path(
    delete,
    path = "/debug/overrides/time",
    responses((status = 200, description = "Override cleared", body = OverrideStateResponse)),
    tag = "Debug"
)]
pub async fn clear_time_override(State(state): State<AppState>) -> Json<OverrideStateResponse> {
    state.overrides.set_time_override(None);
    state
        .events
        .emit(DebugEvent::new(DebugEventType::Risk, "time_override_cleared"));
    override_state(&state)
}

/// Current override state.
#[utoipa::path(
    get,
    path = "/debug/overrides",
    responses((status = 200, description = "Current override values", body = OverrideStateResponse)),
    tag = "Debug"
)]
pub async fn get_overrides(State(state): State<AppState>) -> Json<OverrideStateResponse> {
    override_state(&state)
}

/// Cascading reset: overrides, sessions, audit trail and event buffer.
#[utoipa::path(
    post,
    path = "/debug/reset",
    responses((status = 200, description = "Derived state wiped", body = ResetResponse)),
    tag = "Debug"
)]
pub async fn reset_state(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.overrides.clear();

    let sessions_cleared = state.sessions.clear_all().await.is_ok();
    let audit_cleared = state.audit.reset().await.is_ok();
    state.events.clear();

    // Emitted after the wipe so the fresh buffer starts with the reset mark.
    state
        .events
        .emit(DebugEvent::new(DebugEventType::Audit, "state_reset"));

    tracing::info!(sessions_cleared, audit_cleared, "Debug reset executed");

    Ok(Json(ResetResponse {
        overrides_cleared: true,
        sessions_cleared,
        audit_cleared,
        events_cleared: true,
    }))
}

fn override_state(state: &AppState) -> Json<OverrideStateResponse> {
    Json(OverrideStateResponse {
        risk_override: state.overrides.risk_override(),
        time_override: state.overrides.time_override(),
    })
}
