//! Memory types, identity and aggregates

mod tagging;
mod text;

pub use tagging::*;
pub use text::*;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use crate::CoreError;

/// Category used when the caller does not supply one
pub const DEFAULT_CATEGORY: &str = "general";

/// Number of leading characters of content that take part in the context hash
pub const CONTEXT_PREFIX_CHARS: usize = 100;

/// Importance level of a memory, always within `1..=5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Importance(u8);

impl Importance {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Validate a raw importance value. Out-of-range values are rejected, not clamped.
    pub fn new(value: i64) -> Result<Self, CoreError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(CoreError::InvalidImportance(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Lowest importance an existing near-duplicate may have and still block
    /// an insert at this importance. One point of improvement is tolerated,
    /// so only a jump of two or more gets past an existing duplicate.
    pub fn dedup_floor(self) -> u8 {
        self.0.saturating_sub(1)
    }
}

impl TryFrom<u8> for Importance {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as i64)
    }
}

impl From<Importance> for u8 {
    fn from(value: Importance) -> Self {
        value.0
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller input for a new memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    pub importance: i64,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>, importance: i64) -> Self {
        Self {
            content: content.into(),
            importance,
            category: None,
            tags: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// A persisted memory entry. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub timestamp: String,
    pub importance: Importance,
    pub category: String,
    pub tags: Vec<String>,
    pub context_hash: String,
}

impl MemoryEntry {
    /// Build the entry that `record` would persist for `input` at instant `now`.
    pub fn prepare(input: NewMemory, now: DateTime<Utc>) -> Result<Self, CoreError> {
        let importance = Importance::new(input.importance)?;

        let category = match input.category {
            Some(c) if !c.trim().is_empty() => c.trim().to_string(),
            _ => DEFAULT_CATEGORY.to_string(),
        };

        let tags = match input.tags {
            Some(tags) => normalize_tags(tags),
            None => extract_tags(&input.content),
        };

        let timestamp = format_timestamp(now);
        let context_hash = context_hash(&input.content, &category);
        let id = derive_entry_id(&input.content, &timestamp, importance);

        Ok(Self {
            id,
            content: input.content,
            timestamp,
            importance,
            category,
            tags,
            context_hash,
        })
    }
}

/// Render an instant the way entries store it: UTC, nanosecond precision,
/// fixed width, so lexical order matches chronological order.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Dedup digest over the first 100 characters of content plus the category
pub fn context_hash(content: &str, category: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix_chars(content, CONTEXT_PREFIX_CHARS).as_bytes());
    hasher.update(category.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `<YYYY-MM-DD>_<16 hex>` where the hex part digests content, timestamp and importance
pub fn derive_entry_id(content: &str, timestamp: &str, importance: Importance) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update([importance.get()]);
    let digest = format!("{:x}", hasher.finalize());
    let day = timestamp.get(..10).unwrap_or(timestamp);
    format!("{}_{}", day, &digest[..16])
}

/// Entry projection handed back to callers of search and insight queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryView {
    pub id: String,
    pub content: String,
    pub timestamp: String,
    pub importance: Importance,
    pub category: String,
    pub tags: Vec<String>,
    /// Search only. Advisory; never used for ordering.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relevance_score: Option<f64>,
}

impl MemoryView {
    pub fn with_relevance(mut self, query: &str) -> Self {
        self.relevance_score = Some(relevance_score(query, &self.content));
        self
    }

    pub fn truncated(mut self, max_chars: usize) -> Self {
        self.content = truncate_for_display(&self.content, max_chars);
        self
    }
}

impl From<MemoryEntry> for MemoryView {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            id: entry.id,
            content: entry.content,
            timestamp: entry.timestamp,
            importance: entry.importance,
            category: entry.category,
            tags: entry.tags,
            relevance_score: None,
        }
    }
}

/// Store-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: u64,
    pub total_size_mb: f64,
    /// `None` when the store is empty
    pub oldest_entry: Option<String>,
    pub newest_entry: Option<String>,
    pub categories: BTreeMap<String, u64>,
    pub importance_distribution: BTreeMap<u8, u64>,
    pub location: Option<String>,
}

/// Size in megabytes rounded to two decimals
pub fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / (1024.0 * 1024.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Minimal per-entry data needed for pattern analysis
#[derive(Debug, Clone)]
pub struct PatternSample {
    pub timestamp: String,
    pub importance: Importance,
    pub category: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTrend {
    /// Calendar day, `YYYY-MM-DD`
    pub date: String,
    pub category: String,
    pub count: u64,
}

/// Usage patterns across stored memories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPatterns {
    pub top_tags: Vec<TagCount>,
    pub category_trends: Vec<CategoryTrend>,
    pub quality_score: f64,
    pub analysis_timestamp: Option<String>,
}

const TOP_TAGS: usize = 10;
const TREND_WINDOW_DAYS: i64 = 30;
const QUALITY_WINDOW_DAYS: i64 = 90;

impl MemoryPatterns {
    /// Aggregate samples as of `now`.
    ///
    /// `quality_score` averages `importance * (age_days / -365)` over the last
    /// 90 days, so fresher and more important memories pull it towards zero
    /// from below.
    pub fn analyze(samples: &[PatternSample], now: DateTime<Utc>) -> Self {
        let mut tag_counts: HashMap<&str, u64> = HashMap::new();
        let mut trends: BTreeMap<(String, String), u64> = BTreeMap::new();
        let mut quality_sum = 0.0;
        let mut quality_n = 0u64;

        let trend_start = (now - Duration::days(TREND_WINDOW_DAYS)).date_naive();
        let quality_start = now - Duration::days(QUALITY_WINDOW_DAYS);

        for sample in samples {
            for tag in &sample.tags {
                *tag_counts.entry(tag.as_str()).or_default() += 1;
            }

            let Ok(ts) = DateTime::parse_from_rfc3339(&sample.timestamp) else {
                continue;
            };
            let ts = ts.with_timezone(&Utc);

            if ts.date_naive() >= trend_start {
                let day = ts.date_naive().format("%Y-%m-%d").to_string();
                *trends.entry((day, sample.category.clone())).or_default() += 1;
            }

            if ts >= quality_start {
                let age_days = (now - ts).num_milliseconds() as f64 / 86_400_000.0;
                quality_sum += sample.importance.get() as f64 * (age_days / -365.0);
                quality_n += 1;
            }
        }

        let mut top_tags: Vec<TagCount> = tag_counts
            .into_iter()
            .map(|(tag, count)| TagCount { tag: tag.to_string(), count })
            .collect();
        top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        top_tags.truncate(TOP_TAGS);

        // newest day first, categories alphabetical within a day
        let mut category_trends: Vec<CategoryTrend> = trends
            .into_iter()
            .map(|((date, category), count)| CategoryTrend { date, category, count })
            .collect();
        category_trends.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.category.cmp(&b.category)));

        let quality_score = if quality_n == 0 {
            0.0
        } else {
            round2(quality_sum / quality_n as f64)
        };

        Self {
            top_tags,
            category_trends,
            quality_score,
            analysis_timestamp: Some(format_timestamp(now)),
        }
    }
}
