//! # mcp-ptyd
//!
//! MCP (Model Context Protocol) server that bridges an AI agent host (e.g.
//! Claude Code) to a `ptyd` session engine over stdio JSON-RPC.
//!
//! ## Architecture
//!
//! ```text
//! main.rs        — entry point, config loading, MCP server launch
//! config.rs       — TOML file / env-var configuration loading
//! client.rs       — HTTP client for the ptyd Command Surface
//! mcp.rs          — MCP JSON-RPC protocol handler (stdio)
//! tools.rs        — tool definitions and handlers
//! git.rs          — read-only git subprocess calls
//! agent.rs        — coding-agent discovery and spawn helper
//! kv_store.rs     — persisted key/value store
//! plugin_docs.rs  — static bundled documentation
//! ```
//!
//! ## Tools
//!
//! `session`, `git`, `agent`, `config`, `plugin_dev_guide` — see
//! `tools.rs` for each tool's `action` table.
//!
//! ## Exit codes
//!
//! `0` on clean EOF, `2` on bad invocation (config error), `64` on an I/O
//! failure partway through the stdio loop.

mod agent;
mod client;
mod config;
mod git;
mod kv_store;
mod mcp;
mod plugin_docs;
mod tools;

use clap::Parser;
use client::PtydClient;
use config::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let resolved = config::load(&cli);

    eprintln!("mcp-ptyd: bridging to {}", resolved.server_url);

    let ptyd = PtydClient::new(resolved.server_url.clone(), resolved.api_key.clone());

    let exit_code = mcp::run_stdio(ptyd, resolved).await;
    std::process::exit(exit_code);
}
