//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `PTYD_API_KEY`, `PTYD_LISTEN`
//! 2. **Config file** — path via `--config <path>`, or `ptyd.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:7331"
//! max_sessions = 64
//! session_buffer_size_kib = 256
//! close_grace_ms = 2000
//! idle_flush_ms = 250
//!
//! [auth]
//! api_key = "your-secret-key"
//!
//! [shell]
//! default_command = ["/bin/sh", "-l"]
//! default_working_dir = "/"
//!
//! [process_inspector]
//! poll_interval_ms = 3000
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub process_inspector: ProcessInspectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server and resource-limit settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:7331`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum concurrent PTY sessions (default 64).
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Per-session output ring buffer size in KiB (default 256).
    #[serde(default = "default_session_buffer_size_kib")]
    pub session_buffer_size_kib: usize,
    /// Time to wait after SIGHUP before force-killing a closing session, in
    /// milliseconds (default 2000, matches `T_kill`).
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
    /// Default terminal rows for new sessions (default 24).
    #[serde(default = "default_terminal_rows")]
    pub default_terminal_rows: u16,
    /// Default terminal columns for new sessions (default 80).
    #[serde(default = "default_terminal_cols")]
    pub default_terminal_cols: u16,
    /// How long the PTY reader waits with no new bytes before flushing a
    /// partial trailing line to the parser, in milliseconds (default 250,
    /// matches `T_idle`).
    #[serde(default = "default_idle_flush_ms")]
    pub idle_flush_ms: u64,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Pre-shared Bearer token. Override with `PTYD_API_KEY` env var.
    /// Defaults to `"change-me"` which triggers a startup warning.
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

/// Shell defaults used when a `session` create request omits overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// Command + args spawned when a session doesn't specify its own
    /// (default `["/bin/sh", "-l"]`).
    #[serde(default = "default_command")]
    pub default_command: Vec<String>,
    /// Working directory for sessions that don't specify one (default `/`).
    #[serde(default = "default_working_dir")]
    pub default_working_dir: String,
}

/// Process Inspector polling cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessInspectorConfig {
    /// Milliseconds between foreground-process polls (default 3000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:7331".to_string()
}
fn default_max_sessions() -> usize {
    64
}
fn default_session_buffer_size_kib() -> usize {
    256
}
fn default_close_grace_ms() -> u64 {
    2000
}
fn default_api_key() -> String {
    "change-me".to_string()
}
fn default_command() -> Vec<String> {
    vec!["/bin/sh".to_string(), "-l".to_string()]
}
fn default_working_dir() -> String {
    "/".to_string()
}
fn default_poll_interval_ms() -> u64 {
    3000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_terminal_rows() -> u16 {
    24
}
fn default_terminal_cols() -> u16 {
    80
}
fn default_idle_flush_ms() -> u64 {
    250
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_sessions: default_max_sessions(),
            session_buffer_size_kib: default_session_buffer_size_kib(),
            close_grace_ms: default_close_grace_ms(),
            default_terminal_rows: default_terminal_rows(),
            default_terminal_cols: default_terminal_cols(),
            idle_flush_ms: default_idle_flush_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_command: default_command(),
            default_working_dir: default_working_dir(),
        }
    }
}

impl Default for ProcessInspectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `ptyd.toml` in the current directory, falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("ptyd.toml").exists() {
            let content = std::fs::read_to_string("ptyd.toml").expect("Failed to read ptyd.toml");
            toml::from_str(&content).expect("Failed to parse ptyd.toml")
        } else {
            Config {
                server: ServerConfig::default(),
                auth: AuthConfig::default(),
                shell: ShellConfig::default(),
                process_inspector: ProcessInspectorConfig::default(),
                logging: LoggingConfig::default(),
            }
        };

        if let Ok(key) = std::env::var("PTYD_API_KEY") {
            config.auth.api_key = key;
        }
        if let Ok(listen) = std::env::var("PTYD_LISTEN") {
            config.server.listen = listen;
        }

        config
    }
}
