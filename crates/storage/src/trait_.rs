//! Memory backend trait definition
//!
//! Abstract interface between the public store and a storage engine.
//! Every method executes as one atomic unit: a concurrent caller never
//! observes a record without its index entry or the reverse.

use async_trait::async_trait;
use sca_core::{MemoryEntry, MemoryStats, PatternSample};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::StorageError;

/// Result of a dedup-checked insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A near-duplicate of sufficient importance already exists
    Duplicate,
}

/// Full-text search request. `tokens` come from `sca_core::fts_tokens`.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub tokens: Vec<String>,
    pub category: Option<String>,
    pub limit: usize,
}

/// Disagreement between the record table and the full-text index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDrift {
    pub records_without_index: u64,
    pub index_without_record: u64,
}

impl IndexDrift {
    pub fn is_clean(&self) -> bool {
        self.records_without_index == 0 && self.index_without_record == 0
    }
}

#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Insert `entry` and its index entry unless an entry with the same
    /// context hash and importance >= `entry.importance.dedup_floor()` exists.
    /// Never overwrites: an id collision is an error.
    async fn insert_if_novel(&self, entry: &MemoryEntry) -> Result<InsertOutcome, StorageError>;

    /// Entries matching every query token, importance desc then newest first
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryEntry>, StorageError>;

    /// Entries with importance >= `min_importance`, newest first
    async fn recent(&self, min_importance: u8, limit: usize) -> Result<Vec<MemoryEntry>, StorageError>;

    async fn stats(&self) -> Result<MemoryStats, StorageError>;

    async fn pattern_samples(&self) -> Result<Vec<PatternSample>, StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;

    /// Delete the oldest entries with importance <= `max_importance` (records
    /// and index entries together) until at most `max_entries` remain or no
    /// candidates are left. Returns how many entries were removed.
    async fn evict_oldest(&self, max_entries: u64, max_importance: u8) -> Result<usize, StorageError>;

    async fn check_index(&self) -> Result<IndexDrift, StorageError>;

    /// Backing file, if any
    fn location(&self) -> Option<&Path>;
}

/// Shared backend reference
pub type SharedBackend = Arc<dyn MemoryBackend>;
