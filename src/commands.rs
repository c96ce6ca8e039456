pub mod config;
pub mod dlq;
pub mod enqueue;
pub mod list;
pub mod logs;
pub mod status;
pub mod worker;

/// Render a stored timestamp the way the store defines them: ISO-8601 UTC
/// at second resolution.
pub(crate) fn format_ts(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
