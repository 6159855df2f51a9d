//! Small filesystem helpers shared by the file-backed stores.
//!
//! Shared mutable JSON files (session map, subscriptions, delegations) are
//! written via a sibling temp file and an atomic rename so concurrent
//! readers never observe a half-written file.

use std::path::Path;

/// Writes `contents` to `path` atomically: write to `<path>.tmp`, then
/// rename over the destination. The temp file lives in the same directory
/// so the rename stays on one filesystem.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.tmp", ext),
        None => "tmp".to_string(),
    });
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

/// Current time as an ISO-8601 UTC string with millisecond precision,
/// e.g. `2024-06-01T12:00:00.000Z`. Sorts lexicographically.
pub fn iso_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
