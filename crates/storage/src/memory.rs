//! Process-local memory backend
//!
//! Keeps records and their token index behind one mutex. Same observable
//! semantics as the SQLite backend, minus durability.

use async_trait::async_trait;
use sca_core::{fts_tokens, MemoryEntry, MemoryStats, PatternSample};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::trait_::{IndexDrift, InsertOutcome, MemoryBackend, SearchQuery, SharedBackend};
use crate::StorageError;

#[derive(Debug, Default)]
struct Tables {
    /// Insertion sequence -> record
    records: BTreeMap<u64, MemoryEntry>,
    /// Record id -> indexed tokens of content, tags and category
    index: HashMap<String, HashSet<String>>,
    next_seq: u64,
}

impl Tables {
    fn index_tokens(entry: &MemoryEntry) -> HashSet<String> {
        let tags = entry.tags.join(" ");
        [entry.content.as_str(), tags.as_str(), entry.category.as_str()]
            .iter()
            .flat_map(|field| fts_tokens(field))
            .collect()
    }

    /// Records newest-last, i.e. (timestamp, seq) ascending
    fn by_age(&self) -> Vec<(u64, &MemoryEntry)> {
        let mut rows: Vec<(u64, &MemoryEntry)> = self.records.iter().map(|(s, e)| (*s, e)).collect();
        rows.sort_by(|(sa, a), (sb, b)| a.timestamp.cmp(&b.timestamp).then(sa.cmp(sb)));
        rows
    }
}

/// In-memory backend implementation
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: Mutex<Tables>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn insert_if_novel(&self, entry: &MemoryEntry) -> Result<InsertOutcome, StorageError> {
        let mut tables = self.lock()?;

        let floor = entry.importance.dedup_floor();
        let duplicate = tables
            .records
            .values()
            .any(|e| e.context_hash == entry.context_hash && e.importance.get() >= floor);
        if duplicate {
            return Ok(InsertOutcome::Duplicate);
        }

        if tables.index.contains_key(&entry.id) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("memory id already used: {}", entry.id),
            )));
        }

        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.index.insert(entry.id.clone(), Tables::index_tokens(entry));
        tables.records.insert(seq, entry.clone());

        Ok(InsertOutcome::Inserted)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryEntry>, StorageError> {
        if query.tokens.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }
        let tables = self.lock()?;

        let mut hits: Vec<(u64, &MemoryEntry)> = tables
            .records
            .iter()
            .filter(|(_, e)| query.category.as_ref().is_none_or(|c| &e.category == c))
            .filter(|(_, e)| {
                tables
                    .index
                    .get(&e.id)
                    .is_some_and(|tokens| query.tokens.iter().all(|t| tokens.contains(t)))
            })
            .map(|(s, e)| (*s, e))
            .collect();

        hits.sort_by(|(sa, a), (sb, b)| {
            b.importance
                .cmp(&a.importance)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| sb.cmp(sa))
        });

        Ok(hits.into_iter().take(query.limit).map(|(_, e)| e.clone()).collect())
    }

    async fn recent(&self, min_importance: u8, limit: usize) -> Result<Vec<MemoryEntry>, StorageError> {
        let tables = self.lock()?;
        Ok(tables
            .by_age()
            .into_iter()
            .rev()
            .filter(|(_, e)| e.importance.get() >= min_importance)
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn stats(&self) -> Result<MemoryStats, StorageError> {
        let tables = self.lock()?;

        let mut stats = MemoryStats {
            total_entries: tables.records.len() as u64,
            ..Default::default()
        };
        for entry in tables.records.values() {
            *stats.categories.entry(entry.category.clone()).or_default() += 1;
            *stats.importance_distribution.entry(entry.importance.get()).or_default() += 1;
        }
        stats.oldest_entry = tables.records.values().map(|e| &e.timestamp).min().cloned();
        stats.newest_entry = tables.records.values().map(|e| &e.timestamp).max().cloned();

        Ok(stats)
    }

    async fn pattern_samples(&self) -> Result<Vec<PatternSample>, StorageError> {
        let tables = self.lock()?;
        Ok(tables
            .records
            .values()
            .map(|e| PatternSample {
                timestamp: e.timestamp.clone(),
                importance: e.importance,
                category: e.category.clone(),
                tags: e.tags.clone(),
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.lock()?.records.len() as u64)
    }

    async fn evict_oldest(&self, max_entries: u64, max_importance: u8) -> Result<usize, StorageError> {
        let mut tables = self.lock()?;

        let total = tables.records.len() as u64;
        if total <= max_entries {
            return Ok(0);
        }
        let excess = (total - max_entries) as usize;

        let victims: Vec<(u64, String)> = tables
            .by_age()
            .into_iter()
            .filter(|(_, e)| e.importance.get() <= max_importance)
            .take(excess)
            .map(|(s, e)| (s, e.id.clone()))
            .collect();

        for (seq, id) in &victims {
            tables.index.remove(id);
            tables.records.remove(seq);
        }

        Ok(victims.len())
    }

    async fn check_index(&self) -> Result<IndexDrift, StorageError> {
        let tables = self.lock()?;
        let record_ids: HashSet<&String> = tables.records.values().map(|e| &e.id).collect();

        Ok(IndexDrift {
            records_without_index: record_ids.iter().filter(|id| !tables.index.contains_key(**id)).count() as u64,
            index_without_record: tables.index.keys().filter(|id| !record_ids.contains(id)).count() as u64,
        })
    }

    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Create a new shared in-memory backend
pub fn create_memory_backend() -> SharedBackend {
    Arc::new(InMemoryBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use sca_core::NewMemory;

    fn entry_at(content: &str, importance: i64, minutes: i64) -> MemoryEntry {
        let base = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        MemoryEntry::prepare(NewMemory::new(content, importance), base + Duration::minutes(minutes)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_dedup() {
        let backend = InMemoryBackend::new();

        let first = entry_at("Built auth with JWT", 3, 0);
        assert_eq!(backend.insert_if_novel(&first).await.unwrap(), InsertOutcome::Inserted);

        // importance 4 is within the one point tolerance
        let close = entry_at("Built auth with JWT", 4, 1);
        assert_eq!(backend.insert_if_novel(&close).await.unwrap(), InsertOutcome::Duplicate);

        let jump = entry_at("Built auth with JWT", 5, 2);
        assert_eq!(backend.insert_if_novel(&jump).await.unwrap(), InsertOutcome::Inserted);

        assert_eq!(backend.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_id_collision_is_error() {
        let backend = InMemoryBackend::new();
        let entry = entry_at("one", 3, 0);
        backend.insert_if_novel(&entry).await.unwrap();

        let mut clash = entry_at("two", 3, 0);
        clash.id = entry.id.clone();
        assert!(backend.insert_if_novel(&clash).await.is_err());
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_order_and_category() {
        let backend = InMemoryBackend::new();
        backend.insert_if_novel(&entry_at("deploy notes alpha", 2, 0)).await.unwrap();
        backend.insert_if_novel(&entry_at("deploy notes beta", 4, 1)).await.unwrap();
        backend.insert_if_novel(&entry_at("deploy notes gamma", 4, 2)).await.unwrap();
        let mut tagged = entry_at("deploy notes delta", 5, 3);
        tagged.category = "ops".to_string();
        backend.insert_if_novel(&tagged).await.unwrap();

        let query = SearchQuery {
            tokens: fts_tokens("Deploy"),
            category: None,
            limit: 10,
        };
        let results: Vec<String> = backend
            .search(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(
            results,
            vec!["deploy notes delta", "deploy notes gamma", "deploy notes beta", "deploy notes alpha"]
        );

        let ops = SearchQuery {
            category: Some("ops".to_string()),
            ..query.clone()
        };
        assert_eq!(backend.search(&ops).await.unwrap().len(), 1);

        let limited = SearchQuery { limit: 2, ..query };
        assert_eq!(backend.search(&limited).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_matches_tags() {
        let backend = InMemoryBackend::new();
        // auto tags add "technical" for "server"
        backend.insert_if_novel(&entry_at("restarted the server", 3, 0)).await.unwrap();

        let query = SearchQuery {
            tokens: fts_tokens("technical"),
            category: None,
            limit: 5,
        };
        assert_eq!(backend.search(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_oldest_respects_floor() {
        let backend = InMemoryBackend::new();
        backend.insert_if_novel(&entry_at("old important", 3, 0)).await.unwrap();
        backend.insert_if_novel(&entry_at("old trivial", 1, 1)).await.unwrap();
        backend.insert_if_novel(&entry_at("newer trivial", 2, 2)).await.unwrap();
        backend.insert_if_novel(&entry_at("newest trivial", 2, 3)).await.unwrap();

        let removed = backend.evict_oldest(2, 2).await.unwrap();
        assert_eq!(removed, 2);

        let left: Vec<String> = backend.recent(1, 10).await.unwrap().into_iter().map(|e| e.content).collect();
        assert_eq!(left, vec!["newest trivial", "old important"]);
        assert!(backend.check_index().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_stats() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.stats().await.unwrap(), MemoryStats::default());

        backend.insert_if_novel(&entry_at("a", 1, 0)).await.unwrap();
        backend.insert_if_novel(&entry_at("b", 5, 5)).await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.categories.get("general"), Some(&2));
        assert_eq!(stats.importance_distribution.get(&5), Some(&1));
        assert!(stats.oldest_entry.unwrap() < stats.newest_entry.unwrap());
        assert!(stats.location.is_none());
    }
}
