//! Shared utility functions.

/// Truncate a string to at most `max_bytes` without splitting a UTF-8
/// character, appending `…` when anything was cut.
pub fn truncate_str(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
