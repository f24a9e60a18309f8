//! Keyword matching against article titles.

use std::collections::BTreeSet;

/// True iff any keyword is a case-insensitive substring of `title`.
///
/// Keywords are expected to be lowercased already (see [`crate::cli`]); they
/// are lowercased again here so callers can't get that wrong. An empty set
/// matches nothing.
pub fn matches(title: &str, keywords: &BTreeSet<String>) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let title = title.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| title.contains(&k.to_lowercase()))
}
