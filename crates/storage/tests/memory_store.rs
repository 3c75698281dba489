//! End-to-end behaviour of the durable memory store
#![cfg(feature = "sqlite")]

use sca_core::MemoryConfig;
use sca_storage::MemoryStore;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

async fn open_store(dir: &Path, max_entries: u64) -> MemoryStore {
    let config = MemoryConfig {
        db_path: Some(dir.join("memory").join("sca_memory.db")),
        max_entries,
        ..Default::default()
    };
    MemoryStore::open(config).await.unwrap()
}

#[tokio::test]
async fn test_dedup_and_importance_escape_hatch() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 100).await;

    assert!(store.record("Built auth with JWT", 3, None, None).await);
    assert!(!store.record("Built auth with JWT", 3, None, None).await);
    assert_eq!(store.stats().await.total_entries, 1);

    assert!(store.record("Built auth with JWT", 5, None, None).await);
    assert_eq!(store.stats().await.total_entries, 2);

    // 5 now blocks anything from 4 upwards
    assert!(!store.record("Built auth with JWT", 5, None, None).await);
    assert!(!store.record("Built auth with JWT", 4, None, None).await);
}

#[tokio::test]
async fn test_search_token_match_and_relevance() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 100).await;

    store.record("Implemented JWT authentication flow", 4, None, None).await;
    store.record("Unrelated note", 5, None, None).await;

    let results = store.search("authentication", 5, None).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "Implemented JWT authentication flow");
    assert_eq!(results[0].relevance_score, Some(1.0));
}

#[tokio::test]
async fn test_search_ordering_law() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 100).await;

    for (i, importance) in [2, 5, 3, 5, 1, 3].iter().enumerate() {
        assert!(store.record(format!("incident report {}", i), *importance, None, None).await);
    }

    let results = store.search("incident report", 10, None).await;
    assert_eq!(results.len(), 6);
    for pair in results.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.importance >= b.importance);
        if a.importance == b.importance {
            assert!(a.timestamp >= b.timestamp);
        }
    }
    // equal importance: the later insert comes first
    assert_eq!(results[0].content, "incident report 3");
    assert_eq!(results[1].content, "incident report 1");

    assert_eq!(store.search("incident", 3, None).await.len(), 3);
}

#[tokio::test]
async fn test_capacity_law_and_eviction_floor() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 5).await;

    for i in 0..3 {
        assert!(store.record(format!("important decision {}", i), 4, None, None).await);
    }
    for i in 0..6 {
        assert!(store.record(format!("scratch note {}", i), 1, None, None).await);
    }

    let stats = store.stats().await;
    assert_eq!(stats.total_entries, 5);
    assert_eq!(stats.importance_distribution.get(&4), Some(&3));

    // the oldest scratch notes went first
    let notes = store.search("scratch", 10, None).await;
    let contents: Vec<&str> = notes.iter().map(|n| n.content.as_str()).collect();
    assert_eq!(contents, vec!["scratch note 5", "scratch note 4"]);

    assert!(store.check_index().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_store_may_stay_over_capacity_without_low_importance_entries() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 2).await;

    for i in 0..4 {
        assert!(store.record(format!("milestone {}", i), 3, None, None).await);
    }
    assert_eq!(store.stats().await.total_entries, 4);

    // a single low-importance entry is all eviction may take
    assert!(store.record("throwaway", 2, None, None).await);
    assert_eq!(store.stats().await.total_entries, 4);
    assert!(store.search("throwaway", 5, None).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_records_keep_index_consistent() {
    let dir = tempdir().unwrap();
    let store = Arc::new(open_store(dir.path(), 10).await);

    let mut handles = Vec::new();
    for i in 0..40 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.record(format!("parallel write {}", i), 1 + (i % 2), None, None).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let stats = store.stats().await;
    assert_eq!(stats.total_entries, 10);
    assert!(store.check_index().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_recent_insights_and_stats() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 100).await;

    let empty = store.stats().await;
    assert_eq!(empty.total_entries, 0);
    assert!(empty.oldest_entry.is_none());

    store.record("low value", 2, None, None).await;
    store.record("key architecture choice", 4, Some("design"), None).await;
    store.record(format!("long insight {}", "z".repeat(400)), 5, None, None).await;

    let insights = store.recent_insights(5).await;
    assert_eq!(insights.len(), 2);
    assert!(insights[0].content.starts_with("long insight"));
    assert_eq!(insights[0].content.chars().count(), 203);
    assert_eq!(insights[1].content, "key architecture choice");
    assert_eq!(insights[1].tags, vec!["design".to_string()]);

    let stats = store.stats().await;
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.categories.get("design"), Some(&1));
    assert_eq!(stats.categories.get("general"), Some(&2));
    assert!(stats.oldest_entry.unwrap() <= stats.newest_entry.unwrap());
    assert!(stats.total_size_mb >= 0.0);
}

#[tokio::test]
async fn test_reopen_and_close() {
    let dir = tempdir().unwrap();

    let store = open_store(dir.path(), 100).await;
    assert!(store.record("survives restart", 3, None, None).await);
    let location = store.location().unwrap().to_path_buf();
    store.close();

    assert!(location.exists());
    let store = open_store(dir.path(), 100).await;
    assert_eq!(store.search("restart", 5, None).await.len(), 1);
    assert!(!store.record("survives restart", 3, None, None).await);
}

#[tokio::test]
async fn test_accented_search_agrees_across_backends() {
    let dir = tempdir().unwrap();
    let durable = open_store(dir.path(), 100).await;
    let local = MemoryStore::in_memory(100);

    for store in [&durable, &local] {
        assert!(store.record("visited the café downtown", 3, None, None).await);
    }

    for query in ["café", "Café", "cafe", "downtown café"] {
        let durable_hits = durable.search(query, 5, None).await.len();
        let local_hits = local.search(query, 5, None).await.len();
        assert_eq!(durable_hits, local_hits, "query {:?}", query);
    }
    assert!(durable.search("cafe", 5, None).await.is_empty());
}

#[tokio::test]
async fn test_unbounded_capacity_never_evicts() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), u64::MAX).await;

    for i in 0..3 {
        assert!(store.record(format!("scratch {}", i), 1, None, None).await);
    }
    assert_eq!(store.stats().await.total_entries, 3);
}

#[tokio::test]
async fn test_stats_size_grows_with_writes() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1000).await;
    let before = store.stats().await.total_size_mb;

    for i in 0..300 {
        assert!(store.record(format!("bulk {} {}", i, "y".repeat(800)), 3, None, None).await);
    }

    let after = store.stats().await.total_size_mb;
    assert!(after > before);
    assert!(after >= 0.2);
}
