//! Process Inspector: resolves the deepest descendant process of a PTY
//! session's root PID, polled on a cadence rather than watched.
//!
//! Grounded on a desktop multi-session orchestrator's process-tree walker:
//! build a parent→children map once per poll with `sysinfo`, then follow the
//! chain down from the root PID. A poll failure keeps the caller's
//! last-known value and logs at `debug!` rather than propagating an error.

use std::collections::HashMap;

use sysinfo::{Pid, System};
use tracing::debug;

/// A single process in a session's tree.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Build a full parent→children map, then walk from `root_pid` to the
/// deepest still-running descendant. Returns `None` if `root_pid` itself is
/// gone (the session has already exited).
pub fn deepest_descendant(root_pid: u32) -> Option<ProcessInfo> {
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let root = Pid::from_u32(root_pid);
    system.process(root)?;

    let mut children_of: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, proc) in system.processes() {
        if let Some(parent) = proc.parent() {
            children_of.entry(parent).or_default().push(*pid);
        }
    }

    let mut current = root;
    loop {
        let children = children_of.get(&current);
        let Some(next) = children.and_then(|kids| kids.iter().max_by_key(|p| p.as_u32())) else {
            break;
        };
        current = *next;
    }

    system.process(current).map(|proc| ProcessInfo {
        pid: current.as_u32(),
        name: proc.name().to_string_lossy().into_owned(),
    })
}

/// Poll the process tree for `root_pid`, returning `None` (and logging at
/// debug) on any failure so callers can keep their last-known value.
pub fn poll_foreground(root_pid: u32) -> Option<String> {
    match std::panic::catch_unwind(|| deepest_descendant(root_pid)) {
        Ok(Some(info)) => Some(info.name),
        Ok(None) => {
            debug!("process inspector: pid {root_pid} has no resolvable descendant");
            None
        }
        Err(_) => {
            debug!("process inspector: panic while inspecting pid {root_pid}");
            None
        }
    }
}
