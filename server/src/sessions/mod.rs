//! Session lifecycle management: the Session Manager and Command Surface.
//!
//! [`SessionManager`] is the single authority for creating, accessing, and
//! destroying PTY sessions. The registry is a single `RwLock<HashMap>` —
//! read operations (write to stdin, status, list) take a read lock;
//! mutating operations (create, close, sweep) take a write lock.
//! `create` holds the write lock across the limit-check and insert to
//! prevent a TOCTOU race past `max_sessions`.

pub mod buffer;
pub mod framing;
pub mod session;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::error::SessionError;
use crate::shell::pty::{allocate_pty, spawn_shell_pty};
use session::{ManagedSession, SessionEvent, SessionStatus};

/// Parameters for [`SessionManager::create`].
pub struct SessionSpec {
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub rows: u16,
    pub cols: u16,
    pub structured_output_hint: bool,
}

/// Summary of a session returned by [`SessionManager::list`].
pub struct SessionSummary {
    pub id: String,
    pub cwd: String,
    pub pid: u32,
    pub command: Vec<String>,
    pub exit_code: Option<i32>,
    pub foreground_proc: Option<String>,
    pub rows: u16,
    pub cols: u16,
    pub paused: bool,
    pub status: &'static str,
    pub created_at: u64,
    pub structured_output_hint: bool,
}

/// The registry's single entry type.
struct SessionEntry {
    session: ManagedSession,
}

/// Events produced by [`SessionManager::sweep`] for callers to broadcast.
pub enum SweepEvent {
    /// A session's child exited and it was reaped. `(session_id, code)`.
    Reaped(String, Option<i32>),
}

/// Manages the pool of active PTY sessions.
///
/// Cloneable — all clones share the same inner `Arc<RwLock<...>>`.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    max_sessions: usize,
    buffer_size: usize,
    t_kill: std::time::Duration,
    idle_flush: std::time::Duration,
}

impl SessionManager {
    pub fn new(
        max_sessions: usize,
        buffer_size: usize,
        t_kill: std::time::Duration,
        idle_flush: std::time::Duration,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            buffer_size,
            t_kill,
            idle_flush,
        }
    }

    /// Create a new PTY session. Holds the write lock across the
    /// check-and-insert to prevent a TOCTOU race past `max_sessions`.
    pub async fn create(&self, spec: SessionSpec) -> Result<String, SessionError> {
        if spec.rows == 0 || spec.cols == 0 {
            return Err(SessionError::Argument {
                field: "rows/cols",
                why: "must be non-zero".to_string(),
            });
        }
        if spec.command.is_empty() {
            return Err(SessionError::Argument {
                field: "command",
                why: "must not be empty".to_string(),
            });
        }

        let cwd = spec.cwd.unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "/".to_string())
        });
        let cwd_path = Path::new(&cwd);
        if !cwd_path.is_dir() {
            return Err(SessionError::Cwd { path: cwd });
        }

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::Resource {
                reason: format!("session limit reached (max {})", self.max_sessions),
            });
        }

        let session_id = Uuid::new_v4().to_string();

        let pty_pair = allocate_pty(spec.rows, spec.cols).map_err(|e| SessionError::Resource {
            reason: format!("PTY allocation failed: {e}"),
        })?;

        let mut env = spec.env.clone();
        env.entry("TERM".to_string())
            .or_insert_with(|| "xterm-256color".to_string());

        let program = spec.command[0].clone();
        let args = spec.command[1..].to_vec();
        let child = spawn_shell_pty(&pty_pair, &program, &cwd, Some(&env), &args).map_err(|e| {
            SessionError::Spawn {
                reason: e.to_string(),
            }
        })?;

        let session = ManagedSession::spawn(
            session_id.clone(),
            child,
            pty_pair,
            cwd,
            spec.command,
            spec.env,
            spec.rows,
            spec.cols,
            spec.structured_output_hint,
            self.buffer_size,
            self.idle_flush,
        )
        .map_err(|reason| SessionError::Spawn { reason })?;

        info!(
            "session {session_id} created (pid {}), total: {}",
            session.pid,
            sessions.len() + 1
        );
        sessions.insert(session_id.clone(), SessionEntry { session });
        Ok(session_id)
    }

    pub async fn write(&self, id: &str, bytes: Vec<u8>) -> Result<(), SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        if !entry.session.is_running().await {
            return Err(SessionError::ChildExited {
                code: match entry.session.status().await {
                    SessionStatus::Exited { code, .. } => code,
                    SessionStatus::Running => None,
                },
            });
        }
        entry
            .session
            .write(bytes)
            .await
            .map_err(|_| SessionError::Timeout { op: "write" })
    }

    pub async fn resize(&self, id: &str, rows: u16, cols: u16) -> Result<(), SessionError> {
        if rows == 0 || cols == 0 {
            return Err(SessionError::Argument {
                field: "rows/cols",
                why: "must be non-zero".to_string(),
            });
        }
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        entry
            .session
            .resize(rows, cols)
            .map_err(|reason| SessionError::Io { op: "resize", detail: reason })
    }

    pub async fn pause(&self, id: &str) -> Result<(), SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        entry.session.pause();
        Ok(())
    }

    pub async fn resume(&self, id: &str) -> Result<(), SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        entry.session.resume();
        Ok(())
    }

    /// Close protocol: SIGHUP, wait up to `t_kill`, force-kill if still
    /// alive, then drop the entry. Idempotent — closing an already-closed
    /// (or never-existing) session returns success.
    pub async fn close(&self, id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.remove(id) else {
            return Ok(());
        };
        drop(sessions);
        entry.session.close(self.t_kill).await;
        info!("session {id} closed");
        Ok(())
    }

    /// Last `n` bytes of output plus dropped-byte count and current
    /// foreground process, for remote catch-up before subscribing.
    pub async fn snapshot(
        &self,
        id: &str,
        n: usize,
    ) -> Result<(Vec<u8>, u64, u64, Option<String>), SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        let (bytes, lost, seq) = entry.session.snapshot(n).await;
        let foreground = entry.session.foreground_proc.read().await.clone();
        Ok((bytes, lost, seq, foreground))
    }

    pub async fn subscribe(&self, id: &str) -> Result<broadcast::Receiver<SessionEvent>, SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        Ok(entry.session.subscribe())
    }

    pub async fn foreground(&self, id: &str) -> Result<Option<String>, SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        let foreground = entry.session.foreground_proc.read().await.clone();
        Ok(foreground)
    }

    pub async fn send_signal(&self, id: &str, signal: i32) -> Result<(), SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(SessionError::NoSuchSession)?;
        entry
            .session
            .send_signal(signal)
            .map_err(|reason| SessionError::Io { op: "signal", detail: reason })
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut items = Vec::with_capacity(sessions.len());
        for (id, entry) in sessions.iter() {
            let status = entry.session.status().await;
            let (status_str, exit_code) = match status {
                SessionStatus::Running => ("running", None),
                SessionStatus::Exited { code, .. } => ("exited", code),
            };
            items.push(SessionSummary {
                id: id.clone(),
                cwd: entry.session.cwd.clone(),
                pid: entry.session.pid,
                command: entry.session.command.clone(),
                exit_code,
                foreground_proc: entry.session.foreground_proc.read().await.clone(),
                rows: entry.session.rows.load(std::sync::atomic::Ordering::Relaxed),
                cols: entry.session.cols.load(std::sync::atomic::Ordering::Relaxed),
                paused: entry.session.is_paused(),
                status: status_str,
                created_at: entry.session.created_at,
                structured_output_hint: entry.session.structured_output_hint,
            });
        }
        items
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Gracefully close every session (used during shutdown). SIGHUP-then-wait
    /// runs concurrently across all sessions rather than serially.
    pub async fn kill_all(&self) {
        let mut sessions = self.sessions.write().await;
        let entries: Vec<(String, ManagedSession)> = sessions
            .drain()
            .map(|(id, entry)| (id, entry.session))
            .collect();
        drop(sessions);

        let t_kill = self.t_kill;
        let closers = entries
            .into_iter()
            .map(|(id, session)| async move {
                session.close(t_kill).await;
                info!("session {id} closed (shutdown)");
            });
        futures::future::join_all(closers).await;
    }

    /// Poll the Process Inspector for every running session and update its
    /// `foreground_proc`, broadcasting a `foreground` event when the value
    /// changes. Called on a timer by the owning binary.
    pub async fn refresh_foreground(&self) {
        let sessions = self.sessions.read().await;
        for entry in sessions.values() {
            if !entry.session.is_running().await {
                continue;
            }
            let pid = entry.session.pid;
            if let Some(name) = tokio::task::spawn_blocking(move || crate::process::poll_foreground(pid))
                .await
                .unwrap_or(None)
            {
                let mut current = entry.session.foreground_proc.write().await;
                if *current != Some(name.clone()) {
                    *current = Some(name.clone());
                    let _ = entry
                        .session
                        .events_tx
                        .send(SessionEvent::Foreground { name: Some(name) });
                }
            }
        }
    }

    /// Reap sessions whose child already exited. Returns events for callers
    /// to broadcast.
    pub async fn sweep(&self) -> Vec<SweepEvent> {
        let sessions = self.sessions.read().await;
        if sessions.is_empty() {
            return Vec::new();
        }
        let mut dead = Vec::new();
        for (id, entry) in sessions.iter() {
            if let SessionStatus::Exited { code, .. } = entry.session.status().await {
                dead.push((id.clone(), code));
            }
        }
        drop(sessions);

        if dead.is_empty() {
            return Vec::new();
        }

        let mut sessions = self.sessions.write().await;
        let mut events = Vec::with_capacity(dead.len());
        for (id, code) in dead {
            if sessions.remove(&id).is_some() {
                info!("swept exited session {id} (code {:?})", code);
                events.push(SweepEvent::Reaped(id, code));
            }
        }
        events
    }
}
