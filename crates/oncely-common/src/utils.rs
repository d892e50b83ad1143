//! Utility functions for Oncely

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix milliseconds
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Trim a caller-supplied key, returning `None` when nothing usable is left
///
/// # Examples
///
/// ```
/// use oncely_common::normalize_key;
///
/// assert_eq!(normalize_key("  order:42 "), Some("order:42"));
/// assert_eq!(normalize_key("   "), None);
/// ```
pub fn normalize_key(key: &str) -> Option<&str> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
