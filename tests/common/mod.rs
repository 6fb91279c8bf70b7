#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, value.to_string()).unwrap();
    path
}

/// Splits launcher output into one JSON value per line.
pub fn parse_messages(out: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(out)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

pub fn of_type<'a>(messages: &'a [Value], kind: &str) -> Vec<&'a Value> {
    messages.iter().filter(|m| m["type"] == kind).collect()
}

/// A configured catalog selecting `(stream, sync_mode)` pairs in order.
pub fn configured_catalog(streams: &[(&str, &str)]) -> Value {
    let streams: Vec<Value> = streams
        .iter()
        .map(|(name, sync_mode)| {
            json!({
                "stream": {
                    "name": name,
                    "json_schema": {},
                    "supported_sync_modes": ["full_refresh", "incremental"]
                },
                "sync_mode": sync_mode,
                "destination_sync_mode": "append"
            })
        })
        .collect();
    json!({ "streams": streams })
}
