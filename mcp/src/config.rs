//! Configuration loading for mcp-ptyd.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `PTYD_URL`, `PTYD_API_KEY`
//! 2. **Config file** — TOML, path via `--config <path>`
//! 3. **Compiled defaults** — `http://127.0.0.1:7331`, `change-me`
//!
//! ```toml
//! server_url = "http://127.0.0.1:7331"
//! api_key = "your-secret-key"
//! store_path = "/home/me/.config/mcp-ptyd/store.toml"
//! ```

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// CLI arguments parsed by `clap`.
#[derive(Parser)]
#[command(name = "mcp-ptyd", about = "MCP stdio bridge for ptyd sessions")]
pub struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Base URL of the ptyd server. Overrides config file and env.
    #[arg(long)]
    pub server_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    server_url: Option<String>,
    api_key: Option<String>,
    store_path: Option<String>,
}

/// Resolved configuration used by the rest of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: String,
    pub api_key: String,
    /// Where the `config` tool persists its key/value store.
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".config/mcp-ptyd/store.toml"))
        .unwrap_or_else(|_| PathBuf::from("mcp-ptyd-store.toml"))
}

/// Load and resolve configuration from CLI args, env vars, and an optional file.
pub fn load(cli: &Cli) -> Config {
    let file: FileConfig = cli
        .config
        .clone()
        .or_else(|| std::env::var("MCP_PTYD_CONFIG").ok().map(PathBuf::from))
        .and_then(|path| match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).ok(),
            Err(_) => None,
        })
        .unwrap_or_default();

    let server_url = cli
        .server_url
        .clone()
        .or_else(|| std::env::var("PTYD_URL").ok())
        .or(file.server_url)
        .unwrap_or_else(|| "http://127.0.0.1:7331".to_string());

    let api_key = std::env::var("PTYD_API_KEY")
        .ok()
        .or(file.api_key)
        .unwrap_or_else(|| "change-me".to_string());

    let store_path = file
        .store_path
        .map(PathBuf::from)
        .unwrap_or_else(default_store_path);

    Config {
        server_url: server_url.trim_end_matches('/').to_string(),
        api_key,
        store_path,
    }
}
