//! Memory Store - public handle over a memory backend
//!
//! Responsibilities:
//! - Ingestion with dedup and synchronous capacity eviction
//! - Full-text search, recent insights, statistics
//! - Degrading every failure to "not recorded" / empty results
//!
//! Nothing here returns an error to the caller: memory writes are
//! telemetry-style and must never take down the producer.

use chrono::Utc;
use sca_core::{
    fts_tokens, MemoryConfig, MemoryEntry, MemoryPatterns, MemoryStats, MemoryView, NewMemory,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::eviction::{Evictor, InlineEvictor};
use crate::memory::create_memory_backend;
use crate::trait_::{IndexDrift, InsertOutcome, SearchQuery, SharedBackend};
use crate::StorageError;

/// Importance used for session start/end markers
const SESSION_IMPORTANCE: i64 = 3;
const SESSION_CATEGORY: &str = "session";

/// Explicitly constructed memory store handle
pub struct MemoryStore {
    backend: SharedBackend,
    evictor: Arc<dyn Evictor>,
    config: MemoryConfig,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("location", &self.backend.location())
            .field("config", &self.config)
            .finish()
    }
}

impl MemoryStore {
    /// Wrap an existing backend, evicting inline at `config.max_entries`
    pub fn new(backend: SharedBackend, config: MemoryConfig) -> Self {
        Self {
            backend,
            evictor: Arc::new(InlineEvictor::new(config.max_entries)),
            config,
        }
    }

    /// Replace the eviction strategy
    pub fn with_evictor(mut self, evictor: Arc<dyn Evictor>) -> Self {
        self.evictor = evictor;
        self
    }

    /// Process-local store with the given capacity
    pub fn in_memory(max_entries: u64) -> Self {
        let config = MemoryConfig {
            max_entries,
            ..Default::default()
        };
        Self::new(create_memory_backend(), config)
    }

    /// Open the durable store described by `config`
    #[cfg(feature = "sqlite")]
    pub async fn open(config: MemoryConfig) -> Result<Self, StorageError> {
        let path = config.resolved_db_path()?;
        let backend = crate::sqlite::SqliteBackend::open(path, config.pool_size).await?;
        info!("Memory store opened: {}", backend.path().display());
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Open the per-user store, honouring environment overrides
    #[cfg(feature = "sqlite")]
    pub async fn open_default() -> Result<Self, StorageError> {
        Self::open(MemoryConfig::default().apply_env()).await
    }

    /// Release the store. Pending writes have already completed when this runs.
    pub fn close(self) {
        info!("Memory store closed");
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn location(&self) -> Option<&Path> {
        self.backend.location()
    }

    /// Record an interaction. Returns `false` when the entry was rejected as a
    /// near-duplicate, when the input is invalid, or when storage failed; the
    /// three cases are not distinguished.
    pub async fn record(
        &self,
        content: impl Into<String>,
        importance: i64,
        category: Option<&str>,
        tags: Option<Vec<String>>,
    ) -> bool {
        let input = NewMemory {
            content: content.into(),
            importance,
            category: category.map(str::to_string),
            tags,
        };
        self.record_entry(input).await
    }

    /// Same as [`record`](Self::record) with a prepared input
    pub async fn record_entry(&self, input: NewMemory) -> bool {
        let entry = match MemoryEntry::prepare(input, Utc::now()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Rejected memory: {}", e);
                return false;
            }
        };

        match self.backend.insert_if_novel(&entry).await {
            Ok(InsertOutcome::Inserted) => {
                debug!("Recorded memory: {}", entry.id);
            }
            Ok(InsertOutcome::Duplicate) => {
                debug!("Similar memory already exists, skipping");
                return false;
            }
            Err(e) => {
                error!("Failed to record interaction: {}", e);
                return false;
            }
        }

        // the insert stands even if cleanup fails
        if let Err(e) = self.evictor.after_insert(self.backend.as_ref()).await {
            error!("Failed to evict old memories: {}", e);
        }

        true
    }

    /// Full-text search. Results are ordered by importance, then recency; the
    /// attached `relevance_score` is informational and does not affect order.
    pub async fn search(&self, query: &str, limit: usize, category: Option<&str>) -> Vec<MemoryView> {
        let request = SearchQuery {
            tokens: fts_tokens(query),
            category: category.map(str::to_string),
            limit,
        };

        match self.backend.search(&request).await {
            Ok(entries) => entries
                .into_iter()
                .map(|e| MemoryView::from(e).with_relevance(query))
                .collect(),
            Err(e) => {
                error!("Failed to search memory: {}", e);
                Vec::new()
            }
        }
    }

    /// Newest high-importance memories, content cut for display
    pub async fn recent_insights(&self, limit: usize) -> Vec<MemoryView> {
        match self
            .backend
            .recent(self.config.insight_min_importance, limit)
            .await
        {
            Ok(entries) => entries
                .into_iter()
                .map(|e| MemoryView::from(e).truncated(self.config.insight_content_chars))
                .collect(),
            Err(e) => {
                error!("Failed to get recent insights: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn stats(&self) -> MemoryStats {
        self.backend.stats().await.unwrap_or_else(|e| {
            error!("Failed to get memory stats: {}", e);
            MemoryStats::default()
        })
    }

    /// Tag frequency, per-day category counts and recency-weighted quality
    pub async fn analyze_patterns(&self) -> MemoryPatterns {
        match self.backend.pattern_samples().await {
            Ok(samples) => MemoryPatterns::analyze(&samples, Utc::now()),
            Err(e) => {
                error!("Failed to analyze memory patterns: {}", e);
                MemoryPatterns::default()
            }
        }
    }

    /// Mark the start of a session; the returned id does not depend on
    /// whether the marker was stored.
    pub async fn record_session_start(&self, session_context: &str) -> String {
        let session_id = format!("session_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        self.record(
            format!("Session started: {}", session_context),
            SESSION_IMPORTANCE,
            Some(SESSION_CATEGORY),
            Some(vec!["session_start".to_string()]),
        )
        .await;
        session_id
    }

    pub async fn end_session(&self, session_summary: &str) -> bool {
        self.record(
            format!("Session ended: {}", session_summary),
            SESSION_IMPORTANCE,
            Some(SESSION_CATEGORY),
            Some(vec!["session_end".to_string()]),
        )
        .await
    }

    /// Compare the record table against the full-text index
    pub async fn check_index(&self) -> Result<IndexDrift, StorageError> {
        self.backend.check_index().await
    }
}
