//! HTTP client for the ptyd Command Surface.
//!
//! [`PtydClient`] wraps `reqwest::Client` and provides typed methods for
//! each `/api/sessions` endpoint. All responses are returned as
//! `serde_json::Value` — the MCP tools layer handles formatting for the AI
//! agent.
//!
//! ## Authentication
//!
//! All endpoints except `/api/health` use Bearer token authentication.
//!
//! ## Error handling
//!
//! Non-2xx responses are parsed for an `error` field in the JSON body
//! (the shape `ptyd` emits via `SessionError::to_json`). If parsing fails,
//! the raw response body is returned as the error message.

use serde_json::{json, Value};
use std::collections::HashMap;

/// HTTP client for a single ptyd server.
pub struct PtydClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PtydClient {
    /// Create a new client for a ptyd server at the given URL.
    pub fn new(base_url: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            api_key,
        }
    }

    /// `GET /api/health` — liveness probe (no auth required).
    pub async fn health(&self) -> Result<Value, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// `GET /api/sessions` — list all active sessions.
    pub async fn list(&self) -> Result<Value, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// `POST /api/sessions` — create a new PTY session.
    pub async fn create(
        &self,
        command: &[String],
        env: Option<&HashMap<String, String>>,
        cwd: Option<&str>,
        rows: Option<u16>,
        cols: Option<u16>,
    ) -> Result<Value, ClientError> {
        let mut body = json!({ "command": command });
        if let Some(e) = env {
            body["env"] = json!(e);
        }
        if let Some(d) = cwd {
            body["cwd"] = json!(d);
        }
        if let Some(r) = rows {
            body["rows"] = json!(r);
        }
        if let Some(c) = cols {
            body["cols"] = json!(c);
        }

        let resp = self
            .http
            .post(format!("{}/api/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// `POST /api/sessions/{id}/write` — write base64-encoded bytes to stdin.
    pub async fn write(&self, id: &str, b64: &str) -> Result<Value, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/sessions/{}/write", self.base_url, id))
            .bearer_auth(&self.api_key)
            .json(&json!({ "b64": b64 }))
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// `POST /api/sessions/{id}/resize` — resize the PTY window.
    pub async fn resize(&self, id: &str, rows: u16, cols: u16) -> Result<Value, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/sessions/{}/resize", self.base_url, id))
            .bearer_auth(&self.api_key)
            .json(&json!({ "rows": rows, "cols": cols }))
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// `POST /api/sessions/{id}/pause` — stop draining PTY output.
    pub async fn pause(&self, id: &str) -> Result<Value, ClientError> {
        self.post_empty(&format!("/api/sessions/{}/pause", id)).await
    }

    /// `POST /api/sessions/{id}/resume` — resume draining PTY output.
    pub async fn resume(&self, id: &str) -> Result<Value, ClientError> {
        self.post_empty(&format!("/api/sessions/{}/resume", id)).await
    }

    /// `GET /api/sessions/{id}/foreground` — current foreground process name.
    pub async fn foreground(&self, id: &str) -> Result<Value, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/sessions/{}/foreground", self.base_url, id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// `GET /api/sessions/{id}/snapshot?n=N` — last N bytes, lost count, next
    /// sequence number, and current foreground process.
    pub async fn snapshot(&self, id: &str, n: usize) -> Result<Value, ClientError> {
        let resp = self
            .http
            .get(format!(
                "{}/api/sessions/{}/snapshot?n={}",
                self.base_url, id, n
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// `DELETE /api/sessions/{id}` — close a session.
    pub async fn close(&self, id: &str) -> Result<Value, ClientError> {
        let resp = self
            .http
            .delete(format!("{}/api/sessions/{}", self.base_url, id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    async fn post_empty(&self, path: &str) -> Result<Value, ClientError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await
    }

    /// Parse an HTTP response — returns the JSON body on success, or a
    /// [`ClientError`] with the error message on failure.
    async fn handle_response(resp: reqwest::Response) -> Result<Value, ClientError> {
        let status = resp.status();
        let body = resp.text().await.map_err(ClientError::Request)?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| ClientError::Protocol(format!("Invalid JSON from server: {}", e)))
        } else {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(String::from))
                .unwrap_or(body);
            Err(ClientError::Server {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Errors returned by [`PtydClient`] methods.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP transport error (connection refused, timeout, DNS failure, etc.).
    Request(reqwest::Error),
    /// The server returned a non-2xx HTTP status.
    Server { status: u16, message: String },
    /// The response body was not valid JSON.
    Protocol(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Request(e) => write!(f, "HTTP request failed: {}", e),
            ClientError::Server { status, message } => {
                write!(f, "Server error (HTTP {}): {}", status, message)
            }
            ClientError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}
