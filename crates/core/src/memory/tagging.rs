//! Fixed keyword tagging
//!
//! Tags are derived from content with a static lookup table: a category tag
//! when any of its words appears as a whole word, plus a literal technology
//! tag when the technology name appears anywhere in the text.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

const CATEGORY_RULES: [(&str, &str); 5] = [
    ("technical", r"\b(api|database|server|client|framework|library)\b"),
    ("programming", r"\b(python|javascript|react|node|sql)\b"),
    ("development", r"\b(build|implement|deploy|test|debug)\b"),
    ("analysis", r"\b(analyze|data|metrics|performance)\b"),
    ("design", r"\b(design|architecture|pattern|structure)\b"),
];

const TECH_KEYWORDS: [&str; 8] = [
    "react",
    "vue",
    "angular",
    "python",
    "javascript",
    "sql",
    "api",
    "database",
];

static CATEGORY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    CATEGORY_RULES
        .iter()
        .filter_map(|(tag, pattern)| Regex::new(pattern).ok().map(|re| (*tag, re)))
        .collect()
});

/// Derive tags from content. Deterministic, deduplicated and sorted.
pub fn extract_tags(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut tags = BTreeSet::new();

    for (tag, re) in CATEGORY_PATTERNS.iter() {
        if re.is_match(&lower) {
            tags.insert(tag.to_string());
        }
    }

    for keyword in TECH_KEYWORDS {
        if lower.contains(keyword) {
            tags.insert(keyword.to_string());
        }
    }

    tags.into_iter().collect()
}

/// Clean caller-supplied tags: trimmed, non-empty, unique, sorted
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_category_tags() {
        let tags = extract_tags("We need to DEBUG the Server before we deploy");
        assert_eq!(tags, vec!["development".to_string(), "technical".to_string()]);
    }

    #[test]
    fn test_extract_requires_whole_words_for_categories() {
        // "testing" is not the word "test", "databases" still contains "database"
        let tags = extract_tags("testing databases");
        assert_eq!(tags, vec!["database".to_string()]);
    }

    #[test]
    fn test_extract_tech_keywords() {
        let tags = extract_tags("Ported the Vue app to React with a Python api");
        assert_eq!(
            tags,
            vec!["api", "programming", "python", "react", "technical", "vue"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_extract_nothing() {
        assert!(extract_tags("Had lunch").is_empty());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["z", " a", "a ", "", "  "]);
        assert_eq!(tags, vec!["a".to_string(), "z".to_string()]);
    }
}
