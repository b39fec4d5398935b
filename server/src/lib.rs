#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! ptyd library — a PTY session engine exposed over HTTP, WebSocket, and SSE.
//!
//! - `sessions` — session lifecycle, I/O pump, output buffering
//! - `parser` — output line classification into typed events
//! - `process` — cross-platform foreground-process resolution
//! - `shell` — PTY allocation and one-shot command execution
//! - `ws` — per-session WebSocket streaming transport
//! - `routes` — REST API route handlers + SSE
//! - `auth` — bearer token authentication middleware
//! - `config` — configuration loading
//! - `activity` — in-memory activity journal
//! - `error` — the `SessionError` taxonomy shared by every transport

pub mod activity;
pub mod auth;
pub mod config;
pub mod error;
pub mod parser;
pub mod process;
pub mod routes;
pub mod sessions;
pub mod shell;
pub mod state;
pub mod util;
pub mod ws;

pub use activity::ActivityLog;
pub use auth::ApiKey;
pub use config::Config;
pub use error::SessionError;
pub use sessions::SessionManager;
pub use state::AppState;
