//! Coding-agent discovery and spawn helper backing the `agent` MCP tool.
//!
//! Scans `PATH` for known coding-agent binaries and, on request, starts one
//! as an ordinary PTY session through the Command Surface — it's just
//! another `create` call with `agent` resolved to a binary path on PATH.

use crate::client::PtydClient;
use serde_json::{json, Value};

/// Binaries recognized as coding agents, checked against `PATH` in order.
const KNOWN_AGENTS: &[&str] = &["claude", "codex", "aider", "cursor-agent", "gemini", "amp"];

fn which(binary: &str) -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(binary);
        candidate.is_file().then(|| candidate.to_string_lossy().into_owned())
    })
}

/// `list` — known coding-agent binaries found on `PATH`.
pub fn list() -> Value {
    let found: Vec<Value> = KNOWN_AGENTS
        .iter()
        .filter_map(|name| which(name).map(|path| json!({ "name": name, "path": path })))
        .collect();
    json!({ "agents": found })
}

/// `spawn` — start a known agent binary as a new PTY session.
pub async fn spawn(
    client: &PtydClient,
    name: &str,
    args: &[String],
    cwd: Option<&str>,
) -> Result<Value, String> {
    let binary = which(name).ok_or_else(|| format!("agent binary '{name}' not found on PATH"))?;

    let mut command = vec![binary];
    command.extend(args.iter().cloned());

    client
        .create(&command, None, cwd, None, None)
        .await
        .map_err(|e| e.to_string())
}
