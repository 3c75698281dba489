//! Capacity eviction
//!
//! Runs after every accepted insert. Kept behind `Evictor` so the inline
//! pass can be replaced by a scheduled one without touching `MemoryStore`.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{MemoryBackend, StorageError};

/// Entries above this importance are never evicted
pub const EVICTABLE_MAX_IMPORTANCE: u8 = 2;

#[async_trait]
pub trait Evictor: Send + Sync {
    /// Called once per successful insert; returns the number of entries removed
    async fn after_insert(&self, backend: &dyn MemoryBackend) -> Result<usize, StorageError>;
}

/// Synchronous capacity pass: trims the oldest low-importance entries back
/// down to `max_entries`.
#[derive(Debug, Clone, Copy)]
pub struct InlineEvictor {
    max_entries: u64,
}

impl InlineEvictor {
    pub fn new(max_entries: u64) -> Self {
        Self { max_entries }
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }
}

#[async_trait]
impl Evictor for InlineEvictor {
    async fn after_insert(&self, backend: &dyn MemoryBackend) -> Result<usize, StorageError> {
        // read-only check first so the common under-capacity case takes no write lock
        if backend.count().await? <= self.max_entries {
            return Ok(0);
        }

        let removed = backend
            .evict_oldest(self.max_entries, EVICTABLE_MAX_IMPORTANCE)
            .await?;

        if removed > 0 {
            info!("Evicted {} low-importance memories (max {})", removed, self.max_entries);
        } else {
            debug!("Eviction pass removed nothing");
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBackend;
    use chrono::Utc;
    use sca_core::{MemoryEntry, NewMemory};

    async fn fill(backend: &InMemoryBackend, importances: &[i64]) {
        for (i, importance) in importances.iter().enumerate() {
            let entry = MemoryEntry::prepare(NewMemory::new(format!("note {}", i), *importance), Utc::now()).unwrap();
            backend.insert_if_novel(&entry).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_inline_evictor_under_capacity() {
        let backend = InMemoryBackend::new();
        fill(&backend, &[1, 1, 1]).await;

        assert_eq!(InlineEvictor::new(3).after_insert(&backend).await.unwrap(), 0);
        assert_eq!(InlineEvictor::new(u64::MAX).after_insert(&backend).await.unwrap(), 0);
        assert_eq!(backend.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_inline_evictor_trims_low_importance_only() {
        let backend = InMemoryBackend::new();
        fill(&backend, &[1, 4, 2, 3]).await;

        assert_eq!(InlineEvictor::new(1).after_insert(&backend).await.unwrap(), 2);
        assert_eq!(backend.count().await.unwrap(), 2);

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.importance_distribution.get(&4), Some(&1));
        assert_eq!(stats.importance_distribution.get(&3), Some(&1));
    }
}
