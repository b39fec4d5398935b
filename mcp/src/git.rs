//! Read-only git subprocess calls backing the `git` MCP tool.
//!
//! Every action shells out to the real `git` binary and parses its plumbing
//! output. No mutation actions (checkout, commit, push) are exposed — this
//! is a query surface for an agent to orient itself in a repository, not a
//! replacement for running `git` directly in a session.

use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;

/// Run a git subcommand in `cwd` and capture stdout.
async fn run(cwd: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to spawn git: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

fn trimmed(s: String) -> String {
    s.trim().to_string()
}

/// `status` — porcelain status plus the current branch name.
pub async fn status(cwd: &str) -> Result<Value, String> {
    let porcelain = run(cwd, &["status", "--porcelain"]).await?;
    let branch = match run(cwd, &["symbolic-ref", "--short", "HEAD"]).await {
        Ok(b) => trimmed(b),
        Err(_) => trimmed(run(cwd, &["rev-parse", "--short", "HEAD"]).await?),
    };

    let changed: Vec<Value> = porcelain
        .lines()
        .filter(|l| !l.is_empty())
        .map(|line| {
            let (code, path) = line.split_at(2.min(line.len()));
            json!({ "code": code.trim(), "path": path.trim() })
        })
        .collect();

    Ok(json!({
        "branch": branch,
        "changed_files": changed,
        "clean": changed.is_empty(),
    }))
}

/// `branches` — local and remote branches, excluding `HEAD` pointer entries.
pub async fn branches(cwd: &str) -> Result<Value, String> {
    let output = run(
        cwd,
        &[
            "branch",
            "-a",
            "--no-color",
            "--format=%(HEAD)|%(refname:short)|%(refname:rstrip=-2)",
        ],
    )
    .await?;

    let mut result = Vec::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.splitn(3, '|').collect();
        if parts.len() < 2 {
            continue;
        }
        let name = parts[1].trim();
        if name == "HEAD" || name.ends_with("/HEAD") {
            continue;
        }
        let is_remote = parts.get(2).is_some_and(|r| r.trim() == "remotes");
        result.push(json!({
            "name": name,
            "is_remote": is_remote,
            "is_current": parts[0].trim() == "*",
        }));
    }
    Ok(json!({ "branches": result }))
}

/// `recent_commits` — up to `count` commits in topological order.
pub async fn recent_commits(cwd: &str, count: usize) -> Result<Value, String> {
    let count_arg = format!("-{}", count.max(1));
    let output = run(
        cwd,
        &[
            "log",
            "--format=%H|%h|%an|%at|%s",
            &count_arg,
            "--topo-order",
        ],
    )
    .await?;

    let commits: Vec<Value> = output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.splitn(5, '|').collect();
            if parts.len() < 5 {
                return None;
            }
            Some(json!({
                "hash": parts[0],
                "short_hash": parts[1],
                "author": parts[2],
                "timestamp": parts[3].parse::<i64>().unwrap_or(0),
                "summary": parts[4],
            }))
        })
        .collect();

    Ok(json!({ "commits": commits }))
}

/// `diff` — unstaged (or staged, if `staged` is true) diff as unified text.
pub async fn diff(cwd: &str, staged: bool) -> Result<Value, String> {
    let mut args = vec!["diff"];
    if staged {
        args.push("--staged");
    }
    let text = run(cwd, &args).await?;
    Ok(json!({ "diff": text }))
}

/// `file_diff` — unified diff for a single path.
pub async fn file_diff(cwd: &str, path: &str, staged: bool) -> Result<Value, String> {
    let mut args = vec!["diff"];
    if staged {
        args.push("--staged");
    }
    args.push("--");
    args.push(path);
    let text = run(cwd, &args).await?;
    Ok(json!({ "path": path, "diff": text }))
}

/// `changed_files` — files touched by a specific commit (default `HEAD`).
pub async fn changed_files(cwd: &str, rev: &str) -> Result<Value, String> {
    let output = run(cwd, &["show", "--name-status", "--format=", rev]).await?;
    let files: Vec<Value> = output
        .lines()
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            let status = parts.first()?.chars().next()?;
            let path = parts.get(1)?;
            Some(json!({ "status": status.to_string(), "path": path }))
        })
        .collect();
    Ok(json!({ "rev": rev, "files": files }))
}
