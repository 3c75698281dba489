//! Text helpers shared by every backend
//!
//! Tokenization for full-text matching splits at every character that is not
//! alphanumeric and lowercases the pieces, keeping diacritics. This mirrors
//! the SQLite FTS5 `unicode61 remove_diacritics 0` tokenizer, so the durable
//! and process-local backends agree on which entries match a query.

use std::collections::HashSet;

/// First `n` characters of `s` (not bytes)
pub fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Lowercased alphanumeric tokens in first-seen order, without repeats
pub fn fts_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// True when every query token occurs as a token of one of the fields.
/// An empty token list matches nothing.
pub fn matches_all_tokens(query_tokens: &[String], fields: &[&str]) -> bool {
    if query_tokens.is_empty() {
        return false;
    }
    let haystack: HashSet<String> = fields.iter().flat_map(|f| fts_tokens(f)).collect();
    query_tokens.iter().all(|t| haystack.contains(t))
}

/// Fraction of whitespace-separated query words that appear as whole
/// whitespace-separated words of the content, case-insensitive.
pub fn relevance_score(query: &str, content: &str) -> f64 {
    let query_words: HashSet<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let content_words: HashSet<String> = content.split_whitespace().map(str::to_lowercase).collect();

    let hits = query_words.intersection(&content_words).count();
    hits as f64 / query_words.len() as f64
}

/// Cut content to `max_chars` characters, marking the cut with `...`
pub fn truncate_for_display(content: &str, max_chars: usize) -> String {
    let head = prefix_chars(content, max_chars);
    if head.len() < content.len() {
        format!("{}...", head)
    } else {
        content.to_string()
    }
}
