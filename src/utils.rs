//! Small helpers for board-local time and log formatting.

use chrono::{DateTime, FixedOffset, Utc};

/// The board's local offset (Taipei, UTC+8, no DST).
pub fn board_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

/// Current time in the board's local offset.
pub fn board_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&board_offset())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a char
/// boundary, since board titles are mostly CJK) with an ellipsis and byte
/// count appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}
