//! Small persisted key/value store backing the `config` MCP tool.
//!
//! Stored as TOML next to the bridge's own config file. Values are opaque
//! JSON, serialized to a TOML string on disk so arbitrary shapes can be
//! round-tripped without a fixed schema.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    entries: HashMap<String, String>,
}

fn load(path: &Path) -> StoreFile {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}

fn save(path: &Path, store: &StoreFile) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let text = toml::to_string_pretty(store).map_err(|e| e.to_string())?;
    std::fs::write(path, text).map_err(|e| e.to_string())
}

/// `get` — read one key, or all entries if `key` is `None`.
pub fn get(path: &Path, key: Option<&str>) -> serde_json::Value {
    let store = load(path);
    match key {
        Some(k) => store
            .entries
            .get(k)
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or(serde_json::Value::Null),
        None => {
            let mut map = serde_json::Map::new();
            for (k, v) in store.entries {
                let parsed = serde_json::from_str(&v).unwrap_or(serde_json::Value::Null);
                map.insert(k, parsed);
            }
            serde_json::Value::Object(map)
        }
    }
}

/// `set` — write one key.
pub fn set(path: &Path, key: &str, value: &serde_json::Value) -> Result<(), String> {
    let mut store = load(path);
    let encoded = serde_json::to_string(value).map_err(|e| e.to_string())?;
    store.entries.insert(key.to_string(), encoded);
    save(path, &store)
}

/// `delete` — remove one key. Returns whether it was present.
pub fn delete(path: &Path, key: &str) -> Result<bool, String> {
    let mut store = load(path);
    let removed = store.entries.remove(key).is_some();
    save(path, &store)?;
    Ok(removed)
}
