//! Output normalization
//!
//! Turns raw combined process output into the lines callers see.

/// Split raw output into trimmed, non-empty lines, preserving order.
pub fn normalize(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
