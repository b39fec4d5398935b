//! Typed error taxonomy for the session engine.
//!
//! Every public operation on [`crate::sessions::SessionManager`] returns
//! [`SessionError`] instead of a bare `String` or a panic. Transports map
//! these to their own wire codes: HTTP status + JSON body, WebSocket
//! `{"type":"error","code":...}` frames, and JSON-RPC error objects.

use std::fmt;

/// Errors produced by the Command Surface.
#[derive(Debug, Clone)]
pub enum SessionError {
    /// `id` not found in the registry.
    NoSuchSession,
    /// Spawn failed: binary not resolvable, cwd invalid, permission denied.
    Spawn { reason: String },
    /// The working directory does not exist or is not a directory.
    Cwd { path: String },
    /// PTY allocation or FD exhaustion.
    Resource { reason: String },
    /// Read/write failure on the PTY.
    Io { op: &'static str, detail: String },
    /// Operation attempted on an exited session.
    ChildExited { code: Option<i32> },
    /// Invalid rows/cols, malformed bytes, missing action, etc.
    Argument { field: &'static str, why: String },
    /// Remote/MCP invocation lacks required permission.
    CapabilityDenied { capability: String },
    /// Close, write, or catch-up exceeded its bound.
    Timeout { op: &'static str },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchSession => write!(f, "session not found"),
            Self::Spawn { reason } => write!(f, "failed to spawn session: {reason}"),
            Self::Cwd { path } => write!(f, "invalid working directory: {path}"),
            Self::Resource { reason } => write!(f, "resource error: {reason}"),
            Self::Io { op, detail } => write!(f, "io error during {op}: {detail}"),
            Self::ChildExited { code } => match code {
                Some(c) => write!(f, "session already exited with code {c}"),
                None => write!(f, "session already exited"),
            },
            Self::Argument { field, why } => write!(f, "invalid argument {field}: {why}"),
            Self::CapabilityDenied { capability } => {
                write!(f, "capability denied: {capability}")
            }
            Self::Timeout { op } => write!(f, "operation timed out: {op}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl SessionError {
    /// Stable machine-readable code, shared by the WS, REST, and MCP transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchSession => "NO_SUCH_SESSION",
            Self::Spawn { .. } => "SPAWN_ERROR",
            Self::Cwd { .. } => "CWD_ERROR",
            Self::Resource { .. } => "RESOURCE_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::ChildExited { .. } => "CHILD_EXITED",
            Self::Argument { .. } => "ARGUMENT_ERROR",
            Self::CapabilityDenied { .. } => "CAPABILITY_DENIED",
            Self::Timeout { .. } => "TIMEOUT",
        }
    }

    /// HTTP status code for the REST transport.
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::NoSuchSession => StatusCode::NOT_FOUND,
            Self::Spawn { .. } | Self::Resource { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cwd { .. } | Self::Argument { .. } => StatusCode::BAD_REQUEST,
            Self::Io { .. } => StatusCode::BAD_GATEWAY,
            Self::ChildExited { .. } => StatusCode::CONFLICT,
            Self::CapabilityDenied { .. } => StatusCode::FORBIDDEN,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Render as the JSON body shape used by REST error responses.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        })
    }
}
