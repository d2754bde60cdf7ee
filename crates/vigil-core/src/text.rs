//! Text utilities: UTF-8-safe truncation and token estimation.
//!
//! Slicing `&str[..n]` panics when `n` lands inside a multi-byte character,
//! so truncation here always snaps back to a char boundary. Token estimation
//! uses the supervisor-wide `bytes / 4` heuristic — good enough for budgeting
//! memory context, not a tokenizer.

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
#[inline]
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate `s` and append `suffix` when the original exceeds `max_bytes`.
///
/// The result is at most `max_bytes` bytes including the suffix; a string
/// that already fits is returned unchanged.
#[must_use]
pub fn truncate_with_suffix(s: &str, max_bytes: usize, suffix: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let body = truncate_str(s, max_bytes.saturating_sub(suffix.len()));
    format!("{body}{suffix}")
}

/// Estimate token count for budgeting: one token per four bytes, rounded up.
#[inline]
#[must_use]
pub fn estimate_tokens(s: &str) -> usize {
    s.len().div_ceil(4)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
