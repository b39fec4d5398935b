//! REST endpoints for the Command Surface.
//!
//! - `GET    /api/sessions`                — list all sessions
//! - `POST   /api/sessions`                — create a session
//! - `GET    /api/sessions/{id}/snapshot`  — last N bytes + lag + foreground
//! - `POST   /api/sessions/{id}/write`     — write base64-encoded bytes to stdin
//! - `POST   /api/sessions/{id}/resize`    — resize the PTY
//! - `POST   /api/sessions/{id}/pause`     — pause output draining
//! - `POST   /api/sessions/{id}/resume`    — resume output draining
//! - `POST   /api/sessions/{id}/signal`    — send a POSIX signal
//! - `GET    /api/sessions/{id}/foreground` — current foreground process name
//! - `DELETE /api/sessions/{id}`           — close (SIGHUP, then SIGKILL after grace)

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::activity::{self, request_id_from_headers, ActivityType};
use crate::error::SessionError;
use crate::sessions::SessionSpec;
use crate::AppState;

type ApiError = (StatusCode, Json<Value>);

fn err_response(e: SessionError) -> ApiError {
    (e.http_status(), Json(e.to_json()))
}

/// `GET /api/sessions` — list all active sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let items = state.session_manager.list().await;
    let sessions_json: Vec<Value> = items
        .iter()
        .map(|s| {
            json!({
                "session_id": s.id,
                "pid": s.pid,
                "cwd": s.cwd,
                "command": s.command,
                "rows": s.rows,
                "cols": s.cols,
                "paused": s.paused,
                "status": s.status,
                "exit_code": s.exit_code,
                "foreground_proc": s.foreground_proc,
                "created_at": s.created_at,
                "structured_output_hint": s.structured_output_hint,
            })
        })
        .collect();

    Json(json!({ "sessions": sessions_json }))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub rows: Option<u16>,
    pub cols: Option<u16>,
    #[serde(default)]
    pub structured_output_hint: bool,
}

/// `POST /api/sessions` — create a new PTY session.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<Value>, ApiError> {
    let source = activity::source_from_headers(&headers);
    let req_id = request_id_from_headers(&headers);

    let spec = SessionSpec {
        command: req.command,
        env: req.env,
        cwd: req.cwd,
        rows: req.rows.unwrap_or(state.config.server.default_terminal_rows),
        cols: req.cols.unwrap_or(state.config.server.default_terminal_cols),
        structured_output_hint: req.structured_output_hint,
    };

    let id = state
        .session_manager
        .create(spec)
        .await
        .map_err(err_response)?;

    state
        .activity_log
        .log(
            ActivityType::SessionCreate,
            source,
            format!("session {}", &id[..8.min(id.len())]),
            Some(json!({ "session_id": id })),
            req_id,
        )
        .await;

    let _ = state.session_events.send(json!({
        "type": "session.created",
        "session_id": id,
    }));

    Ok(Json(json!({ "session_id": id })))
}

// ─── Write ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WriteRequest {
    /// Base64-encoded bytes to write to the session's stdin.
    pub b64: String,
}

/// `POST /api/sessions/{id}/write` — write bytes to a session's stdin.
pub async fn write_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<WriteRequest>,
) -> Result<Json<Value>, ApiError> {
    let source = activity::source_from_headers(&headers);
    let req_id = request_id_from_headers(&headers);

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&req.b64)
        .map_err(|e| {
            err_response(SessionError::Argument {
                field: "b64",
                why: e.to_string(),
            })
        })?;

    state
        .session_manager
        .write(&id, bytes)
        .await
        .map_err(err_response)?;

    state
        .activity_log
        .log(
            ActivityType::SessionWrite,
            source,
            format!("write → {}", &id[..8.min(id.len())]),
            Some(json!({ "session_id": id })),
            req_id,
        )
        .await;

    Ok(Json(json!({ "ok": true })))
}

// ─── Resize ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ResizeRequest {
    pub rows: u16,
    pub cols: u16,
}

/// `POST /api/sessions/{id}/resize` — resize the PTY window.
pub async fn resize_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ResizeRequest>,
) -> Result<Json<Value>, ApiError> {
    let source = activity::source_from_headers(&headers);
    let req_id = request_id_from_headers(&headers);

    state
        .session_manager
        .resize(&id, req.rows, req.cols)
        .await
        .map_err(err_response)?;

    state
        .activity_log
        .log(
            ActivityType::SessionResize,
            source,
            format!("resize {} → {}x{}", &id[..8.min(id.len())], req.rows, req.cols),
            Some(json!({ "session_id": id, "rows": req.rows, "cols": req.cols })),
            req_id,
        )
        .await;

    Ok(Json(json!({ "ok": true })))
}

// ─── Pause / Resume ──────────────────────────────────────────────────────────

/// `POST /api/sessions/{id}/pause` — stop draining PTY output.
pub async fn pause_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let source = activity::source_from_headers(&headers);
    let req_id = request_id_from_headers(&headers);

    state.session_manager.pause(&id).await.map_err(err_response)?;

    state
        .activity_log
        .log(
            ActivityType::SessionPause,
            source,
            format!("session {}", &id[..8.min(id.len())]),
            Some(json!({ "session_id": id })),
            req_id,
        )
        .await;

    Ok(Json(json!({ "ok": true })))
}

/// `POST /api/sessions/{id}/resume` — resume draining PTY output.
pub async fn resume_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let source = activity::source_from_headers(&headers);
    let req_id = request_id_from_headers(&headers);

    state.session_manager.resume(&id).await.map_err(err_response)?;

    state
        .activity_log
        .log(
            ActivityType::SessionResume,
            source,
            format!("session {}", &id[..8.min(id.len())]),
            Some(json!({ "session_id": id })),
            req_id,
        )
        .await;

    Ok(Json(json!({ "ok": true })))
}

// ─── Signal ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SignalRequest {
    pub signal: i32,
}

/// `POST /api/sessions/{id}/signal` — send a POSIX signal to a session's process group.
pub async fn signal_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SignalRequest>,
) -> Result<Json<Value>, ApiError> {
    let source = activity::source_from_headers(&headers);
    let req_id = request_id_from_headers(&headers);

    state
        .session_manager
        .send_signal(&id, payload.signal)
        .await
        .map_err(err_response)?;

    state
        .activity_log
        .log(
            ActivityType::SessionSignal,
            source,
            format!("signal {} → {}", payload.signal, &id[..8.min(id.len())]),
            Some(json!({ "session_id": id, "signal": payload.signal })),
            req_id,
        )
        .await;

    Ok(Json(json!({
        "ok": true,
        "session_id": id,
        "signal": payload.signal,
    })))
}

// ─── Foreground ──────────────────────────────────────────────────────────────

/// `GET /api/sessions/{id}/foreground` — current foreground process name.
pub async fn foreground_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let foreground = state
        .session_manager
        .foreground(&id)
        .await
        .map_err(err_response)?;

    Ok(Json(json!({
        "session_id": id,
        "foreground_proc": foreground,
    })))
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SnapshotQuery {
    #[serde(default = "default_snapshot_n")]
    pub n: usize,
}

fn default_snapshot_n() -> usize {
    64 * 1024
}

/// `GET /api/sessions/{id}/snapshot?n=N` — last N bytes of output, lost-byte
/// count, next sequence number, and current foreground process, for catch-up
/// before subscribing to the WebSocket stream.
pub async fn snapshot_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<SnapshotQuery>,
) -> Result<Json<Value>, ApiError> {
    let (bytes, lost, next_seq, foreground) = state
        .session_manager
        .snapshot(&id, q.n)
        .await
        .map_err(err_response)?;

    Ok(Json(json!({
        "session_id": id,
        "b64": base64::engine::general_purpose::STANDARD.encode(&bytes),
        "dropped": lost,
        "next_seq": next_seq,
        "foreground_proc": foreground,
    })))
}

// ─── Close ───────────────────────────────────────────────────────────────────

/// `DELETE /api/sessions/{id}` — close a session (SIGHUP, then SIGKILL after grace).
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let source = activity::source_from_headers(&headers);
    let req_id = request_id_from_headers(&headers);

    state.session_manager.close(&id).await.map_err(err_response)?;

    let _ = state.session_events.send(json!({
        "type": "session.closed",
        "session_id": id,
    }));

    state
        .activity_log
        .log(
            ActivityType::SessionClose,
            source,
            format!("session {}", &id[..8.min(id.len())]),
            Some(json!({ "session_id": id })),
            req_id,
        )
        .await;

    Ok(Json(json!({
        "ok": true,
        "session_id": id,
    })))
}
