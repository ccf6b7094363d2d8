//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string is a URL that needs a network connection rather than a local file.
pub fn is_remote_url(value: &str) -> bool {
    ["libsql://", "http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
