//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::activity::ActivityLog;
use crate::config::Config;
use crate::sessions::SessionManager;

/// Shared application state for the ptyd server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Manages the pool of PTY sessions.
    pub session_manager: SessionManager,
    /// Broadcast channel for session lifecycle events (created/closed/swept).
    /// All connected WebSocket clients subscribe to receive real-time updates.
    pub session_events: broadcast::Sender<Value>,
    /// In-memory activity journal for REST/WS operation tracking.
    pub activity_log: Arc<ActivityLog>,
    /// Current number of SSE connections (for connection limiting).
    pub sse_connections: Arc<AtomicU32>,
}
