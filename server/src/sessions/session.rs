//! A single managed PTY session: process group, buffered output, and the
//! reader/writer tasks that pump bytes between the two.
//!
//! ## Process groups
//!
//! The child is a session leader on its PTY (`setsid()` + `TIOCSCTTY` in
//! [`crate::shell::pty::spawn_shell_pty`]), so signals sent to `-pgid` reach
//! the whole process tree, giving real Ctrl-C / job-control behavior.
//!
//! ## UTF-8 framing
//!
//! The reader task owns a private [`LineFramer`] — framing state is never
//! shared, so there is exactly one writer into it, matching the session
//! invariant that `line_frame_state` is reader-exclusive.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use super::buffer::OutputLog;
use super::framing::LineFramer;
use crate::parser::{self, ParsedEvent};
use crate::shell::pty::{self, PtyPair};

/// Session lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Exited { code: Option<i32>, reason: Option<String> },
}

/// Broadcast payload pushed to WebSocket/SSE subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Chunk { seq: u64, bytes: Vec<u8> },
    Event { seq: u64, event: ParsedEvent },
    Foreground { name: Option<String> },
    Exit { code: Option<i32> },
    Lag { lost_chunks: u64 },
}

/// A running PTY session.
pub struct ManagedSession {
    pub pid: u32,
    pub pgid: u32,
    pub cwd: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub created_at: u64,
    pub rows: AtomicU16,
    pub cols: AtomicU16,
    paused: Arc<AtomicBool>,
    pub structured_output_hint: bool,
    resume_notify: Arc<Notify>,
    pub output_log: Arc<Mutex<OutputLog>>,
    pub status: Arc<RwLock<SessionStatus>>,
    pub foreground_proc: Arc<RwLock<Option<String>>>,
    stdin_tx: mpsc::Sender<Vec<u8>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    pty_master: Option<OwnedFd>,
    pub events_tx: broadcast::Sender<SessionEvent>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| {
            #[allow(clippy::cast_possible_truncation)]
            let ms = d.as_millis() as u64;
            ms
        })
}

impl ManagedSession {
    /// Spawn a PTY-backed session from an already-created child and PTY pair.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        session_id: String,
        mut child: Child,
        pty: PtyPair,
        cwd: String,
        command: Vec<String>,
        env: HashMap<String, String>,
        rows: u16,
        cols: u16,
        structured_output_hint: bool,
        buffer_size: usize,
        idle_flush: std::time::Duration,
    ) -> Result<Self, String> {
        let process_id = child.id().unwrap_or(0);
        let process_group_id = process_id;

        let output_log = Arc::new(Mutex::new(OutputLog::new(buffer_size)));
        let status = Arc::new(RwLock::new(SessionStatus::Running));
        let foreground_proc = Arc::new(RwLock::new(None));
        let (events_tx, _) = broadcast::channel(256);
        let resume_notify = Arc::new(Notify::new());
        let paused = Arc::new(AtomicBool::new(false));

        let master_raw: RawFd = pty.master.as_raw_fd();
        let writer_fd: RawFd = unsafe { libc::dup(master_raw) };
        if writer_fd < 0 {
            return Err(format!(
                "dup() failed for PTY master writer: {}",
                std::io::Error::last_os_error()
            ));
        }
        let reader_fd: RawFd = unsafe { libc::dup(master_raw) };
        if reader_fd < 0 {
            unsafe {
                libc::close(writer_fd);
            }
            return Err(format!(
                "dup() failed for PTY master reader: {}",
                std::io::Error::last_os_error()
            ));
        }

        // SAFETY: writer_fd/reader_fd are freshly dup'd, uniquely owned fds.
        let master_write =
            tokio::fs::File::from_std(unsafe { std::fs::File::from_raw_fd(writer_fd) });
        let master_read =
            tokio::fs::File::from_std(unsafe { std::fs::File::from_raw_fd(reader_fd) });

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(64);
        let stdin_task = tokio::spawn(async move {
            let mut writer = master_write;
            while let Some(data) = stdin_rx.recv().await {
                if writer.write_all(&data).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        let sid_out = session_id.clone();
        let log_out = Arc::clone(&output_log);
        let events_out = events_tx.clone();
        let paused_out = Arc::clone(&paused);
        let resume_out = Arc::clone(&resume_notify);
        let output_task = tokio::spawn(async move {
            let mut reader = master_read;
            let mut tmp = [0u8; 4096];
            let mut framer = LineFramer::new();
            let mut last_seq: u64 = 0;
            loop {
                if paused_out.load(Ordering::Acquire) {
                    resume_out.notified().await;
                    continue;
                }
                match tokio::time::timeout(idle_flush, reader.read(&mut tmp)).await {
                    // No bytes within idle_flush: flush the partial trailing
                    // line (if any) to the parser without touching output_log.
                    Err(_) => {
                        if let Some(line) = framer.flush() {
                            let cleaned = parser::strip_ansi(&line);
                            for event in parser::classify_line(&cleaned, &line) {
                                let _ = events_out.send(SessionEvent::Event {
                                    seq: last_seq,
                                    event,
                                });
                            }
                        }
                        continue;
                    }
                    Ok(Ok(0)) | Ok(Err(_)) => break,
                    Ok(Ok(n)) => {
                        let chunk = tmp[..n].to_vec();
                        let seq = {
                            let mut log = log_out.lock().await;
                            let seq = log.push(chunk.clone());
                            if log.lost_bytes() > 0 && seq % 64 == 0 {
                                let _ = events_out.send(SessionEvent::Lag {
                                    lost_chunks: log.lost_bytes(),
                                });
                            }
                            seq
                        };
                        last_seq = seq;
                        let _ = events_out.send(SessionEvent::Chunk {
                            seq,
                            bytes: chunk.clone(),
                        });

                        for line in framer.push(&chunk) {
                            let cleaned = parser::strip_ansi(&line);
                            for event in parser::classify_line(&cleaned, &line) {
                                let _ = events_out.send(SessionEvent::Event {
                                    seq,
                                    event,
                                });
                            }
                        }
                    }
                }
            }
            info!("session {sid_out} PTY output closed");
        });

        let sid_exit = session_id;
        let status_exit = Arc::clone(&status);
        let events_exit = events_tx.clone();
        let exit_task = tokio::spawn(async move {
            match child.wait().await {
                Ok(s) => {
                    let code = s.code();
                    info!("session {sid_exit} exited with code {:?}", code);
                    *status_exit.write().await = SessionStatus::Exited { code, reason: None };
                    let _ = events_exit.send(SessionEvent::Exit { code });
                }
                Err(e) => {
                    warn!("session {sid_exit} wait error: {e}");
                    *status_exit.write().await = SessionStatus::Exited {
                        code: None,
                        reason: Some(e.to_string()),
                    };
                    let _ = events_exit.send(SessionEvent::Exit { code: None });
                }
            }
        });

        Ok(ManagedSession {
            pid: process_id,
            pgid: process_group_id,
            cwd,
            command,
            env,
            created_at: now_ms(),
            rows: AtomicU16::new(rows),
            cols: AtomicU16::new(cols),
            paused,
            structured_output_hint,
            resume_notify,
            output_log,
            status,
            foreground_proc,
            events_tx,
            stdin_tx,
            tasks: vec![stdin_task, output_task, exit_task],
            pty_master: Some(pty.master),
        })
    }

    pub async fn status(&self) -> SessionStatus {
        self.status.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.status().await, SessionStatus::Running)
    }

    /// Write raw bytes to the session's stdin. Order is preserved because the
    /// mpsc channel is FIFO and has exactly one reader (the stdin task).
    pub async fn write(&self, data: Vec<u8>) -> Result<(), String> {
        tokio::time::timeout(std::time::Duration::from_secs(1), self.stdin_tx.send(data))
            .await
            .map_err(|_| "write timed out".to_string())?
            .map_err(|_| "session stdin closed".to_string())
    }

    /// Toggle pause. While paused the reader blocks and drains no bytes.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), String> {
        if let Some(ref master) = self.pty_master {
            pty::resize_pty(master, rows, cols).map_err(|e| e.to_string())?;
            self.rows.store(rows, Ordering::Relaxed);
            self.cols.store(cols, Ordering::Relaxed);
            Ok(())
        } else {
            Err("session has no PTY".into())
        }
    }

    pub fn send_signal(&self, signal: i32) -> Result<(), String> {
        #[allow(clippy::cast_possible_wrap)]
        let pgid = self.pgid as i32;
        let ret = unsafe { libc::kill(-pgid, signal) };
        if ret == 0 {
            Ok(())
        } else {
            Err(format!(
                "kill(-{}, {}) failed: {}",
                self.pgid,
                signal,
                std::io::Error::last_os_error()
            ))
        }
    }

    /// Immediate SIGKILL to the process group, tasks aborted without waiting.
    pub fn kill(&self) {
        #[allow(clippy::cast_possible_wrap)]
        let pgid = self.pgid as i32;
        if pgid > 0 {
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Close protocol: SIGHUP, wait up to `t_kill`, force-kill if still alive.
    /// Idempotent — calling this on an already-exited session is a no-op wait.
    pub async fn close(&self, t_kill: std::time::Duration) {
        #[allow(clippy::cast_possible_wrap)]
        let pgid = self.pgid as i32;
        if pgid <= 0 || !self.is_running().await {
            for task in &self.tasks {
                task.abort();
            }
            return;
        }

        unsafe {
            libc::kill(-pgid, libc::SIGHUP);
        }

        let deadline = tokio::time::Instant::now() + t_kill;
        loop {
            if !self.is_running().await {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!("session pgid {pgid} did not exit after SIGHUP, sending SIGKILL");
                unsafe {
                    libc::kill(-pgid, libc::SIGKILL);
                }
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        for task in &self.tasks {
            task.abort();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Last `n` raw bytes plus the dropped-byte count, for catch-up frames.
    pub async fn snapshot(&self, n: usize) -> (Vec<u8>, u64, u64) {
        let log = self.output_log.lock().await;
        (log.tail_bytes(n), log.lost_bytes(), log.next_seq())
    }
}
