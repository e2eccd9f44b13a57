//! Display-title derivation.
//!
//! Every title that reaches storage goes through [`derive_title`], so a stored
//! title is always a single trimmed line of at most
//! [`TITLE_MAX_LENGTH`](crate::constants::TITLE_MAX_LENGTH) characters.

use crate::constants::{NO_TITLE, TITLE_MAX_LENGTH};

/// Derive a bounded display title from `primary`, falling back to each entry
/// of `fallbacks` in order.
///
/// For each candidate: skip it if absent or blank, otherwise take its first
/// non-blank line (trimmed) and cut it to 120 characters. Returns
/// [`NO_TITLE`] when no candidate yields text.
///
/// # Examples
/// ```
/// use markback_core::title::derive_title;
///
/// assert_eq!(derive_title(None, &[Some("  \nfoo\nbar  "), Some("")]), "foo");
/// assert_eq!(derive_title(Some("Capitals"), &[Some("ignored")]), "Capitals");
/// ```
pub fn derive_title(primary: Option<&str>, fallbacks: &[Option<&str>]) -> String {
    std::iter::once(primary)
        .chain(fallbacks.iter().copied())
        .flatten()
        .find_map(title_from_candidate)
        .unwrap_or_else(|| NO_TITLE.to_string())
}

fn title_from_candidate(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }

    let first_line = trimmed
        .split('\n')
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(trimmed);

    Some(truncate_chars(first_line, TITLE_MAX_LENGTH).to_string())
}

/// Apply the answer of a title prompt.
///
/// `None` means the user cancelled and the bookmark must not be saved. A blank
/// answer keeps `default_title`.
pub fn accept_prompted_title(default_title: &str, response: Option<&str>) -> Option<String> {
    let trimmed = response?.trim();
    if trimmed.is_empty() {
        return Some(default_title.to_string());
    }
    Some(truncate_chars(trimmed, TITLE_MAX_LENGTH).to_string())
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
