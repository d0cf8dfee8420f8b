//! Text budget enforcement.
//!
//! Tokens here are whitespace-delimited words, not model subwords.

use std::borrow::Cow;

/// Bounds `text` to at most `max_tokens` whitespace-delimited words.
///
/// Text within budget is returned unchanged (borrowed). Longer text is cut
/// to its first `max_tokens` words, rejoined with single spaces.
pub fn normalize(text: &str, max_tokens: usize) -> Cow<'_, str> {
    if text.split_whitespace().nth(max_tokens).is_none() {
        return Cow::Borrowed(text);
    }

    let truncated: Vec<&str> = text.split_whitespace().take(max_tokens).collect();
    Cow::Owned(truncated.join(" "))
}

/// Number of whitespace-delimited words in `text`.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}
