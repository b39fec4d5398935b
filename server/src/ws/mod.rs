//! WebSocket transport: a single multiplexed socket carrying frames for many
//! PTY sessions, addressed by `session_id`.
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /api/ws?token=<api_key>` — token is validated
//!    before the upgrade completes.
//! 2. Control messages are JSON objects with a `"type"` field. An optional
//!    `"request_id"` on any incoming message is echoed on the corresponding
//!    response, enabling correlation in async/multiplexed clients.
//! 3. Per-session output/event/lifecycle frames use the short `"t"` tag from
//!    spec.md's wire format (`opened`, `catchup`, `chunk`, `event`,
//!    `foreground`, `exit`, `lag`), carrying a `session_id` so the client can
//!    demultiplex them on one socket. Sessions are not owned by a connection:
//!    closing the socket does not close any session.
//!
//! ## Message types (client → server)
//!
//! | Type              | Fields                                            | Response type(s)                |
//! |-------------------|----------------------------------------------------|---------------------------------|
//! | `ping`            | —                                                  | `pong`                          |
//! | `session.start`   | `command`, `env?`, `cwd?`, `rows?`, `cols?`, `structured_output_hint?` | `session.started` or `error` |
//! | `session.attach`  | `session_id`, `snapshot_bytes?`                    | `catchup` then live frames, or `error` |
//! | `session.write`   | `session_id`, `b64`                                | (none on success, `error` on failure) |
//! | `session.resize`  | `session_id`, `rows`, `cols`                       | `session.resize.ack` or `error` |
//! | `session.pause`   | `session_id`                                       | `session.pause.ack` or `error`  |
//! | `session.resume`  | `session_id`                                       | `session.resume.ack` or `error` |
//! | `session.signal`  | `session_id`, `signal`                             | `session.signal.ack` or `error` |
//! | `session.close`   | `session_id`                                       | `session.closed` or `error`     |
//! | `session.list`    | —                                                  | `session.listed`                |
//! | `shell.list`      | —                                                  | `shell.listed`                  |
//!
//! ## Per-session frames (server → client), spec.md §6 shape plus `session_id`
//!
//! | `t`          | Fields                                  |
//! |--------------|------------------------------------------|
//! | `catchup`    | `session_id`, `b64`, `dropped`, `foreground` |
//! | `chunk`      | `session_id`, `seq`, `b64`                |
//! | `event`      | `session_id`, `seq`, `event`              |
//! | `foreground` | `session_id`, `name`                      |
//! | `exit`       | `session_id`, `code`                      |
//! | `lag`        | `session_id`, `lost_chunks`, `code`, `closed` — `closed: true` on the third consecutive overflow, which also ends that subscription |

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap as StdHashMap;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::activity::{self, ActivityType};
use crate::sessions::session::SessionEvent;
use crate::sessions::SessionSpec;
use crate::AppState;

/// Query parameters for the WebSocket upgrade request.
#[derive(Deserialize)]
pub struct WsQuery {
    /// API key passed as a query parameter (since HTTP headers aren't available
    /// during a browser WebSocket upgrade).
    pub token: String,
}

/// `GET /api/ws?token=<key>` — WebSocket upgrade handler.
///
/// Validates the token before upgrading. Returns `401 Unauthorized` on auth
/// failure (missing or invalid token).
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if !crate::auth::constant_time_eq(state.config.auth.api_key.as_bytes(), query.token.as_bytes())
    {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Convert a [`SessionEvent`] broadcast value into a per-session wire frame.
fn session_event_to_frame(session_id: &str, event: &SessionEvent) -> Value {
    match event {
        SessionEvent::Chunk { seq, bytes } => json!({
            "t": "chunk",
            "session_id": session_id,
            "seq": seq,
            "b64": base64::engine::general_purpose::STANDARD.encode(bytes),
        }),
        SessionEvent::Event { seq, event } => json!({
            "t": "event",
            "session_id": session_id,
            "seq": seq,
            "event": event,
        }),
        SessionEvent::Foreground { name } => json!({
            "t": "foreground",
            "session_id": session_id,
            "name": name,
        }),
        SessionEvent::Exit { code } => json!({
            "t": "exit",
            "session_id": session_id,
            "code": code,
        }),
        SessionEvent::Lag { lost_chunks } => json!({
            "t": "lag",
            "session_id": session_id,
            "lost_chunks": lost_chunks,
        }),
    }
}

/// Three consecutive buffer overflows close the subscription with `code=lag`.
const MAX_CONSECUTIVE_LAG: u32 = 3;

/// Background task that forwards a session's broadcast events to the socket
/// as wire frames. Dies when the WS sender closes, the session's broadcast
/// channel closes (session fully torn down), or the subscriber falls behind
/// on [`MAX_CONSECUTIVE_LAG`] consecutive overflows in a row.
async fn subscriber_task(
    session_id: String,
    mut rx: tokio::sync::broadcast::Receiver<SessionEvent>,
    ws_tx: mpsc::Sender<Value>,
) {
    let mut consecutive_lag: u32 = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                consecutive_lag = 0;
                let frame = session_event_to_frame(&session_id, &event);
                if ws_tx.send(frame).await.is_err() {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                consecutive_lag += 1;
                let closing = consecutive_lag >= MAX_CONSECUTIVE_LAG;
                let _ = ws_tx
                    .send(json!({
                        "t": "lag",
                        "session_id": session_id,
                        "lost_chunks": n,
                        "code": "lag",
                        "closed": closing,
                    }))
                    .await;
                if closing {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Main WebSocket event loop.
///
/// Splits the socket into a sink (outgoing) and stream (incoming). Outgoing
/// messages are funneled through an mpsc channel so session subscriber tasks
/// can send without holding a reference to the socket.
#[allow(clippy::too_many_lines)]
async fn handle_ws(socket: axum::extract::ws::WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Value>(256);

    // Subscriber tasks per attached session, aborted on detach or disconnect.
    let mut subscriber_tasks: StdHashMap<String, tokio::task::JoinHandle<()>> = StdHashMap::new();

    info!("WS client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    error!("WS send: failed to serialize message: {e}");
                    continue;
                }
            };
            if ws_sink
                .send(axum::extract::ws::Message::Text(text.into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        let axum::extract::ws::Message::Text(text) = msg else {
            if matches!(msg, axum::extract::ws::Message::Close(_)) {
                break;
            }
            continue;
        };

        let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
            let _ = tx
                .send(json!({
                    "type": "error",
                    "code": "ARGUMENT_ERROR",
                    "message": "failed to parse JSON message",
                }))
                .await;
            continue;
        };

        let msg_type = parsed["type"].as_str().unwrap_or("");
        let request_id = parsed["request_id"].as_str().map(ToString::to_string);

        match msg_type {
            "ping" => {
                let mut resp = json!({"type": "pong"});
                if let Some(ref rid) = request_id {
                    resp["request_id"] = json!(rid);
                }
                let _ = tx.send(resp).await;
            }
            "session.start" => {
                handle_session_start(&state, &tx, &parsed, request_id.as_deref()).await;
            }
            "session.attach" => {
                let session_id = parsed["session_id"].as_str().unwrap_or("").to_string();
                if session_id.is_empty() {
                    send_missing_field(&tx, request_id.as_deref(), "session_id is required").await;
                    continue;
                }
                let snapshot_bytes = parsed["snapshot_bytes"].as_u64().unwrap_or(65536) as usize;
                handle_session_attach(
                    &state,
                    &tx,
                    &session_id,
                    snapshot_bytes,
                    request_id.as_deref(),
                    &mut subscriber_tasks,
                )
                .await;
            }
            "session.write" => {
                let session_id = parsed["session_id"].as_str().unwrap_or("");
                let b64 = parsed["b64"].as_str().unwrap_or("");
                if session_id.is_empty() || b64.is_empty() {
                    send_missing_field(&tx, request_id.as_deref(), "session_id and b64 are required").await;
                    continue;
                }
                match base64::engine::general_purpose::STANDARD.decode(b64) {
                    Ok(bytes) => {
                        if let Err(e) = state.session_manager.write(session_id, bytes).await {
                            send_error(&tx, request_id.as_deref(), session_id, &e).await;
                        } else {
                            state
                                .activity_log
                                .log(
                                    ActivityType::SessionWrite,
                                    activity::ActivitySource::Ws,
                                    format!("write → {}", &session_id[..8.min(session_id.len())]),
                                    Some(json!({ "session_id": session_id })),
                                    None,
                                )
                                .await;
                        }
                    }
                    Err(e) => {
                        let mut resp = json!({
                            "type": "error",
                            "code": "ARGUMENT_ERROR",
                            "session_id": session_id,
                            "message": e.to_string(),
                        });
                        if let Some(ref rid) = request_id {
                            resp["request_id"] = json!(rid);
                        }
                        let _ = tx.send(resp).await;
                    }
                }
            }
            "session.resize" => {
                let session_id = parsed["session_id"].as_str().unwrap_or("");
                #[allow(clippy::cast_possible_truncation)]
                let rows = parsed["rows"].as_u64().unwrap_or(0) as u16;
                #[allow(clippy::cast_possible_truncation)]
                let cols = parsed["cols"].as_u64().unwrap_or(0) as u16;
                if session_id.is_empty() || rows == 0 || cols == 0 {
                    send_missing_field(&tx, request_id.as_deref(), "session_id, rows, and cols are required").await;
                    continue;
                }
                match state.session_manager.resize(session_id, rows, cols).await {
                    Ok(()) => {
                        let mut resp = json!({
                            "type": "session.resize.ack",
                            "session_id": session_id,
                            "rows": rows,
                            "cols": cols,
                        });
                        if let Some(ref rid) = request_id {
                            resp["request_id"] = json!(rid);
                        }
                        let _ = tx.send(resp).await;
                        state
                            .activity_log
                            .log(
                                ActivityType::SessionResize,
                                activity::ActivitySource::Ws,
                                format!("resize {} → {rows}x{cols}", &session_id[..8.min(session_id.len())]),
                                Some(json!({ "session_id": session_id, "rows": rows, "cols": cols })),
                                None,
                            )
                            .await;
                    }
                    Err(e) => send_error(&tx, request_id.as_deref(), session_id, &e).await,
                }
            }
            "session.pause" => {
                let session_id = parsed["session_id"].as_str().unwrap_or("");
                if session_id.is_empty() {
                    send_missing_field(&tx, request_id.as_deref(), "session_id is required").await;
                    continue;
                }
                match state.session_manager.pause(session_id).await {
                    Ok(()) => {
                        ack(&tx, "session.pause.ack", session_id, request_id.as_deref()).await;
                        state
                            .activity_log
                            .log(
                                ActivityType::SessionPause,
                                activity::ActivitySource::Ws,
                                format!("session {}", &session_id[..8.min(session_id.len())]),
                                Some(json!({ "session_id": session_id })),
                                None,
                            )
                            .await;
                    }
                    Err(e) => send_error(&tx, request_id.as_deref(), session_id, &e).await,
                }
            }
            "session.resume" => {
                let session_id = parsed["session_id"].as_str().unwrap_or("");
                if session_id.is_empty() {
                    send_missing_field(&tx, request_id.as_deref(), "session_id is required").await;
                    continue;
                }
                match state.session_manager.resume(session_id).await {
                    Ok(()) => {
                        ack(&tx, "session.resume.ack", session_id, request_id.as_deref()).await;
                        state
                            .activity_log
                            .log(
                                ActivityType::SessionResume,
                                activity::ActivitySource::Ws,
                                format!("session {}", &session_id[..8.min(session_id.len())]),
                                Some(json!({ "session_id": session_id })),
                                None,
                            )
                            .await;
                    }
                    Err(e) => send_error(&tx, request_id.as_deref(), session_id, &e).await,
                }
            }
            "session.signal" => {
                let session_id = parsed["session_id"].as_str().unwrap_or("");
                let signal = parsed["signal"].as_i64().unwrap_or(0);
                if session_id.is_empty() || signal == 0 {
                    send_missing_field(&tx, request_id.as_deref(), "session_id and signal are required").await;
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                let signal_i32 = signal as i32;
                match state.session_manager.send_signal(session_id, signal_i32).await {
                    Ok(()) => {
                        let mut resp = json!({
                            "type": "session.signal.ack",
                            "session_id": session_id,
                            "signal": signal_i32,
                        });
                        if let Some(ref rid) = request_id {
                            resp["request_id"] = json!(rid);
                        }
                        let _ = tx.send(resp).await;
                        state
                            .activity_log
                            .log(
                                ActivityType::SessionSignal,
                                activity::ActivitySource::Ws,
                                format!("signal {signal_i32} → {}", &session_id[..8.min(session_id.len())]),
                                Some(json!({ "session_id": session_id, "signal": signal_i32 })),
                                None,
                            )
                            .await;
                    }
                    Err(e) => send_error(&tx, request_id.as_deref(), session_id, &e).await,
                }
            }
            "session.close" => {
                let session_id = parsed["session_id"].as_str().unwrap_or("").to_string();
                if session_id.is_empty() {
                    send_missing_field(&tx, request_id.as_deref(), "session_id is required").await;
                    continue;
                }
                match state.session_manager.close(&session_id).await {
                    Ok(()) => {
                        if let Some(task) = subscriber_tasks.remove(&session_id) {
                            task.abort();
                        }
                        ack(&tx, "session.closed", &session_id, request_id.as_deref()).await;
                        state
                            .activity_log
                            .log(
                                ActivityType::SessionClose,
                                activity::ActivitySource::Ws,
                                format!("session {}", &session_id[..8.min(session_id.len())]),
                                Some(json!({ "session_id": session_id })),
                                None,
                            )
                            .await;
                    }
                    Err(e) => send_error(&tx, request_id.as_deref(), &session_id, &e).await,
                }
            }
            "session.list" => {
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
                let mut resp = json!({
                    "type": "session.listed",
                    "sessions": sessions_json,
                });
                if let Some(ref rid) = request_id {
                    resp["request_id"] = json!(rid);
                }
                let _ = tx.send(resp).await;
            }
            "shell.list" => {
                let shells = crate::shell::detect_shells();
                let mut resp = json!({
                    "type": "shell.listed",
                    "shells": shells,
                    "default_command": &state.config.shell.default_command,
                });
                if let Some(ref rid) = request_id {
                    resp["request_id"] = json!(rid);
                }
                let _ = tx.send(resp).await;
            }
            _ => {
                let mut resp = json!({
                    "type": "error",
                    "code": "ARGUMENT_ERROR",
                    "message": format!("unknown message type: {msg_type}"),
                });
                if let Some(ref rid) = request_id {
                    resp["request_id"] = json!(rid);
                }
                let _ = tx.send(resp).await;
            }
        }
    }

    info!("WS client disconnected ({} session(s) attached)", subscriber_tasks.len());
    for (_, task) in subscriber_tasks {
        task.abort();
    }
    send_task.abort();
}

async fn ack(tx: &mpsc::Sender<Value>, msg_type: &str, session_id: &str, request_id: Option<&str>) {
    let mut resp = json!({
        "type": msg_type,
        "session_id": session_id,
    });
    if let Some(rid) = request_id {
        resp["request_id"] = json!(rid);
    }
    let _ = tx.send(resp).await;
}

async fn send_missing_field(tx: &mpsc::Sender<Value>, request_id: Option<&str>, message: &str) {
    let mut resp = json!({
        "type": "error",
        "code": "ARGUMENT_ERROR",
        "message": message,
    });
    if let Some(rid) = request_id {
        resp["request_id"] = json!(rid);
    }
    let _ = tx.send(resp).await;
}

async fn send_error(
    tx: &mpsc::Sender<Value>,
    request_id: Option<&str>,
    session_id: &str,
    e: &crate::error::SessionError,
) {
    let mut resp = json!({
        "type": "error",
        "code": e.code(),
        "session_id": session_id,
        "message": e.to_string(),
    });
    if let Some(rid) = request_id {
        resp["request_id"] = json!(rid);
    }
    let _ = tx.send(resp).await;
}

/// Handle `session.start` — create a new PTY session.
async fn handle_session_start(
    state: &AppState,
    tx: &mpsc::Sender<Value>,
    parsed: &Value,
    request_id: Option<&str>,
) {
    let command: Vec<String> = parsed
        .get("command")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| state.config.shell.default_command.clone());
    let env: std::collections::HashMap<String, String> = parsed
        .get("env")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let cwd = parsed["cwd"]
        .as_str()
        .map(|d| crate::util::expand_tilde(d).into_owned());
    #[allow(clippy::cast_possible_truncation)]
    let rows = parsed["rows"]
        .as_u64()
        .unwrap_or(u64::from(state.config.server.default_terminal_rows)) as u16;
    #[allow(clippy::cast_possible_truncation)]
    let cols = parsed["cols"]
        .as_u64()
        .unwrap_or(u64::from(state.config.server.default_terminal_cols)) as u16;
    let structured_output_hint = parsed["structured_output_hint"].as_bool().unwrap_or(false);

    let spec = SessionSpec {
        command,
        env,
        cwd,
        rows,
        cols,
        structured_output_hint,
    };

    match state.session_manager.create(spec).await {
        Ok(session_id) => {
            let mut resp = json!({
                "type": "session.started",
                "session_id": session_id,
            });
            if let Some(rid) = request_id {
                resp["request_id"] = json!(rid);
            }
            let _ = tx.send(resp).await;

            let _ = state.session_events.send(json!({
                "type": "session.created",
                "session_id": session_id,
            }));

            state
                .activity_log
                .log(
                    ActivityType::SessionCreate,
                    activity::ActivitySource::Ws,
                    format!("session {}", &session_id[..8.min(session_id.len())]),
                    Some(json!({ "session_id": session_id })),
                    None,
                )
                .await;
        }
        Err(e) => {
            let mut resp = json!({
                "type": "error",
                "code": e.code(),
                "message": e.to_string(),
            });
            if let Some(rid) = request_id {
                resp["request_id"] = json!(rid);
            }
            let _ = tx.send(resp).await;
        }
    }
}

/// Handle `session.attach` — subscribe to a session's stream, sending a
/// `catchup` frame with the last `snapshot_bytes` before live frames.
async fn handle_session_attach(
    state: &AppState,
    tx: &mpsc::Sender<Value>,
    session_id: &str,
    snapshot_bytes: usize,
    request_id: Option<&str>,
    subscriber_tasks: &mut StdHashMap<String, tokio::task::JoinHandle<()>>,
) {
    if let Some(task) = subscriber_tasks.remove(session_id) {
        task.abort();
    }

    // Subscribe before snapshotting so no live chunk is missed in the gap.
    let receiver = match state.session_manager.subscribe(session_id).await {
        Ok(r) => r,
        Err(e) => {
            send_error(tx, request_id, session_id, &e).await;
            return;
        }
    };

    let (bytes, dropped, _next_seq, foreground) = state
        .session_manager
        .snapshot(session_id, snapshot_bytes)
        .await
        .unwrap_or_default();

    let mut resp = json!({
        "t": "catchup",
        "session_id": session_id,
        "b64": base64::engine::general_purpose::STANDARD.encode(&bytes),
        "dropped": dropped,
        "foreground": foreground,
    });
    if let Some(rid) = request_id {
        resp["request_id"] = json!(rid);
    }
    let _ = tx.send(resp).await;

    let task = tokio::spawn(subscriber_task(session_id.to_string(), receiver, tx.clone()));
    subscriber_tasks.insert(session_id.to_string(), task);
}
