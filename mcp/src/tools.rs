//! MCP tool definitions and handlers.
//!
//! Five consolidated tools, each with an `action` parameter dispatched to a
//! handler function:
//!
//! - **`session`** — the Command Surface, over HTTP, via [`PtydClient`]
//! - **`git`** — read-only repository inspection via [`crate::git`]
//! - **`agent`** — coding-agent discovery and spawn via [`crate::agent`]
//! - **`config`** — a small persisted key/value store via [`crate::kv_store`]
//! - **`plugin_dev_guide`** — static bundled documentation via [`crate::plugin_docs`]

use serde_json::{json, Value};

use crate::client::PtydClient;
use crate::config::Config;
use crate::{agent, git, kv_store, plugin_docs};

/// Returns all five tool definitions.
pub fn all_tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "session",
            "description": "Create and control PTY-backed sessions on the ptyd server. Actions: list, create, write, resize, pause, resume, foreground, snapshot, close.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["list", "create", "write", "resize", "pause", "resume", "foreground", "snapshot", "close"]
                    },
                    "session_id": { "type": "string", "description": "Required for all actions except list/create." },
                    "command": { "type": "array", "items": { "type": "string" }, "description": "Argv for 'create'." },
                    "env": { "type": "object", "additionalProperties": { "type": "string" } },
                    "cwd": { "type": "string" },
                    "rows": { "type": "integer" },
                    "cols": { "type": "integer" },
                    "b64": { "type": "string", "description": "Base64-encoded stdin bytes for 'write'." },
                    "n": { "type": "integer", "description": "Byte count for 'snapshot' (default 65536)." }
                },
                "required": ["action"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "git",
            "description": "Read-only git repository inspection. Actions: status, branches, recent_commits, diff, file_diff, changed_files.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["status", "branches", "recent_commits", "diff", "file_diff", "changed_files"]
                    },
                    "cwd": { "type": "string", "description": "Path to the git working tree." },
                    "count": { "type": "integer", "description": "Commit count for 'recent_commits' (default 20)." },
                    "staged": { "type": "boolean", "description": "For 'diff'/'file_diff', diff the index instead of the working tree." },
                    "path": { "type": "string", "description": "File path for 'file_diff'." },
                    "rev": { "type": "string", "description": "Commit ref for 'changed_files' (default HEAD)." }
                },
                "required": ["action", "cwd"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "agent",
            "description": "Discover coding-agent binaries on PATH and launch one as a ptyd session. Actions: list, spawn.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["list", "spawn"] },
                    "name": { "type": "string", "description": "Agent binary name for 'spawn', e.g. 'claude'." },
                    "args": { "type": "array", "items": { "type": "string" } },
                    "cwd": { "type": "string" }
                },
                "required": ["action"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "config",
            "description": "Persisted key/value store scoped to this MCP bridge. Actions: get, set, delete.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["get", "set", "delete"] },
                    "key": { "type": "string", "description": "Omit for 'get' to read all entries." },
                    "value": { "description": "Arbitrary JSON value for 'set'." }
                },
                "required": ["action"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "plugin_dev_guide",
            "description": "Static documentation for this plugin's tools. Omit 'topic' to list available topics.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "topic": { "type": "string", "enum": ["overview", "session", "git", "agent", "config"] }
                },
                "additionalProperties": false
            }
        }),
    ]
}

/// Result of an MCP tool call, ready to be serialized into a JSON-RPC response.
pub struct ToolResult {
    /// MCP content blocks (typically a single `{"type":"text","text":"..."}` entry).
    pub content: Vec<Value>,
    /// Whether the tool call failed (maps to `isError` in the MCP response).
    pub is_error: bool,
}

impl ToolResult {
    fn success(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        Self {
            content: vec![json!({ "type": "text", "text": text })],
            is_error: false,
        }
    }

    fn text(message: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": message.into() })],
            is_error: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": message.into() })],
            is_error: true,
        }
    }
}

fn get_action(args: &Value) -> Result<&str, ToolResult> {
    args.get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolResult::error("Missing required parameter: action"))
}

fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolResult> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolResult::error(format!("Missing required parameter: {field}")))
}

/// Handle a tool call and return MCP content.
pub async fn handle_tool_call(
    name: &str,
    args: &Value,
    client: &PtydClient,
    config: &Config,
) -> ToolResult {
    match name {
        "session" => handle_session(args, client).await,
        "git" => handle_git(args).await,
        "agent" => handle_agent(args, client).await,
        "config" => handle_config(args, config),
        "plugin_dev_guide" => handle_plugin_dev_guide(args),
        _ => ToolResult::error(format!("Unknown tool: {}", name)),
    }
}

// --- session ---

async fn handle_session(args: &Value, client: &PtydClient) -> ToolResult {
    let action = match get_action(args) {
        Ok(a) => a,
        Err(e) => return e,
    };

    let result = match action {
        "list" => client.list().await,
        "create" => {
            let command: Vec<String> = match args.get("command").and_then(Value::as_array) {
                Some(c) => c
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
                None => return ToolResult::error("Missing required parameter: command (array)"),
            };
            let env = args
                .get("env")
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            let cwd = args.get("cwd").and_then(Value::as_str);
            let rows = args.get("rows").and_then(Value::as_u64).map(|r| r as u16);
            let cols = args.get("cols").and_then(Value::as_u64).map(|c| c as u16);
            client.create(&command, env.as_ref(), cwd, rows, cols).await
        }
        "write" => {
            let id = match require_str(args, "session_id") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let b64 = match require_str(args, "b64") {
                Ok(v) => v,
                Err(e) => return e,
            };
            client.write(id, b64).await
        }
        "resize" => {
            let id = match require_str(args, "session_id") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let rows = match args.get("rows").and_then(Value::as_u64) {
                Some(r) => r as u16,
                None => return ToolResult::error("Missing required parameter: rows"),
            };
            let cols = match args.get("cols").and_then(Value::as_u64) {
                Some(c) => c as u16,
                None => return ToolResult::error("Missing required parameter: cols"),
            };
            client.resize(id, rows, cols).await
        }
        "pause" => {
            let id = match require_str(args, "session_id") {
                Ok(v) => v,
                Err(e) => return e,
            };
            client.pause(id).await
        }
        "resume" => {
            let id = match require_str(args, "session_id") {
                Ok(v) => v,
                Err(e) => return e,
            };
            client.resume(id).await
        }
        "foreground" => {
            let id = match require_str(args, "session_id") {
                Ok(v) => v,
                Err(e) => return e,
            };
            client.foreground(id).await
        }
        "snapshot" => {
            let id = match require_str(args, "session_id") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let n = args
                .get("n")
                .and_then(Value::as_u64)
                .unwrap_or(64 * 1024) as usize;
            client.snapshot(id, n).await
        }
        "close" => {
            let id = match require_str(args, "session_id") {
                Ok(v) => v,
                Err(e) => return e,
            };
            client.close(id).await
        }
        other => return ToolResult::error(format!("Unknown session action: {other}")),
    };

    match result {
        Ok(v) => ToolResult::success(v),
        Err(e) => ToolResult::error(e.to_string()),
    }
}

// --- git ---

async fn handle_git(args: &Value) -> ToolResult {
    let action = match get_action(args) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let cwd = match require_str(args, "cwd") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let result = match action {
        "status" => git::status(cwd).await,
        "branches" => git::branches(cwd).await,
        "recent_commits" => {
            let count = args.get("count").and_then(Value::as_u64).unwrap_or(20) as usize;
            git::recent_commits(cwd, count).await
        }
        "diff" => {
            let staged = args.get("staged").and_then(Value::as_bool).unwrap_or(false);
            git::diff(cwd, staged).await
        }
        "file_diff" => {
            let path = match require_str(args, "path") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let staged = args.get("staged").and_then(Value::as_bool).unwrap_or(false);
            git::file_diff(cwd, path, staged).await
        }
        "changed_files" => {
            let rev = args.get("rev").and_then(Value::as_str).unwrap_or("HEAD");
            git::changed_files(cwd, rev).await
        }
        other => return ToolResult::error(format!("Unknown git action: {other}")),
    };

    match result {
        Ok(v) => ToolResult::success(v),
        Err(e) => ToolResult::error(e),
    }
}

// --- agent ---

async fn handle_agent(args: &Value, client: &PtydClient) -> ToolResult {
    let action = match get_action(args) {
        Ok(a) => a,
        Err(e) => return e,
    };

    match action {
        "list" => ToolResult::success(agent::list()),
        "spawn" => {
            let name = match require_str(args, "name") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let extra_args: Vec<String> = args
                .get("args")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            let cwd = args.get("cwd").and_then(Value::as_str);
            match agent::spawn(client, name, &extra_args, cwd).await {
                Ok(v) => ToolResult::success(v),
                Err(e) => ToolResult::error(e),
            }
        }
        other => ToolResult::error(format!("Unknown agent action: {other}")),
    }
}

// --- config ---

fn handle_config(args: &Value, config: &Config) -> ToolResult {
    let action = match get_action(args) {
        Ok(a) => a,
        Err(e) => return e,
    };

    match action {
        "get" => {
            let key = args.get("key").and_then(Value::as_str);
            ToolResult::success(kv_store::get(&config.store_path, key))
        }
        "set" => {
            let key = match require_str(args, "key") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let value = args.get("value").cloned().unwrap_or(Value::Null);
            match kv_store::set(&config.store_path, key, &value) {
                Ok(()) => ToolResult::success(json!({ "ok": true, "key": key })),
                Err(e) => ToolResult::error(e),
            }
        }
        "delete" => {
            let key = match require_str(args, "key") {
                Ok(v) => v,
                Err(e) => return e,
            };
            match kv_store::delete(&config.store_path, key) {
                Ok(removed) => ToolResult::success(json!({ "ok": true, "removed": removed })),
                Err(e) => ToolResult::error(e),
            }
        }
        other => ToolResult::error(format!("Unknown config action: {other}")),
    }
}

// --- plugin_dev_guide ---

fn handle_plugin_dev_guide(args: &Value) -> ToolResult {
    match args.get("topic").and_then(Value::as_str) {
        Some(topic) => match plugin_docs::get(topic) {
            Some(text) => ToolResult::text(text),
            None => ToolResult::error(format!(
                "Unknown topic '{topic}'. Available topics: {}",
                plugin_docs::TOPICS.join(", ")
            )),
        },
        None => ToolResult::success(json!({ "topics": plugin_docs::TOPICS })),
    }
}
