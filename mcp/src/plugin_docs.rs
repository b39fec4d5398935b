//! Static documentation bundled into the binary, served by the
//! `plugin_dev_guide` MCP tool.
//!
//! Keyed by topic name; each topic is a Markdown file under `docs/`
//! pulled in at compile time via `include_str!` so the bridge never reads
//! from disk at runtime for this tool.

const OVERVIEW: &str = include_str!("../docs/overview.md");
const SESSION: &str = include_str!("../docs/session.md");
const GIT: &str = include_str!("../docs/git.md");
const AGENT: &str = include_str!("../docs/agent.md");
const CONFIG: &str = include_str!("../docs/config.md");

/// Known topics, in the order shown when no `topic` is given.
pub const TOPICS: &[&str] = &["overview", "session", "git", "agent", "config"];

/// Returns the Markdown content for `topic`, or `None` if unrecognized.
pub fn get(topic: &str) -> Option<&'static str> {
    match topic {
        "overview" => Some(OVERVIEW),
        "session" => Some(SESSION),
        "git" => Some(GIT),
        "agent" => Some(AGENT),
        "config" => Some(CONFIG),
        _ => None,
    }
}
