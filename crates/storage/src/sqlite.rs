//! SQLite Backend - Durable memory storage using SQLite
//!
//! Records live in `memories`; the full-text index is the FTS5 virtual table
//! `memories_fts`, keyed back to records by `entry_id`. Every write touches
//! both tables inside a single `IMMEDIATE` transaction, which also
//! serializes concurrent writers and eviction passes.
//!
//! Features:
//! - WAL journal, pooled connections (r2d2)
//! - Async-friendly using spawn_blocking

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use sca_core::{bytes_to_mb, Importance, MemoryEntry, MemoryStats, PatternSample};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::trait_::{IndexDrift, InsertOutcome, MemoryBackend, SearchQuery};
use crate::StorageError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    importance INTEGER NOT NULL CHECK (importance BETWEEN 1 AND 5),
    category TEXT NOT NULL,
    tags TEXT NOT NULL,
    context_hash TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_timestamp ON memories(timestamp);
CREATE INDEX IF NOT EXISTS idx_importance ON memories(importance);
CREATE INDEX IF NOT EXISTS idx_category ON memories(category);
CREATE INDEX IF NOT EXISTS idx_context_hash ON memories(context_hash);
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content, tags, category,
    entry_id UNINDEXED,
    tokenize = 'unicode61 remove_diacritics 0'
);
"#;

/// How long a writer waits for the write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "m.id, m.content, m.timestamp, m.importance, m.category, m.tags, m.context_hash";

/// SQLite backend implementation
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    /// Database file path
    path: PathBuf,
}

impl SqliteBackend {
    /// Open (or create) the database at `path` with up to `pool_size` connections
    pub async fn open(path: PathBuf, pool_size: u32) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let path_clone = path.clone();
        let pool = tokio::task::spawn_blocking(move || {
            let manager = SqliteConnectionManager::file(&path_clone).with_init(|c| {
                c.busy_timeout(BUSY_TIMEOUT)?;
                c.pragma_update(None, "synchronous", "NORMAL")
            });
            let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

            let conn = pool.get()?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute_batch(SCHEMA)?;

            Ok::<_, StorageError>(pool)
        })
        .await??;

        info!("SQLite memory store initialized at: {:?}", path);

        Ok(Self { pool, path })
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Run `f` on a pooled connection on the blocking thread pool.
    ///
    /// The closure runs to completion even if the returned future is dropped,
    /// so a cancelled caller still sees either the whole transaction or none of it.
    async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

/// Size of the database file plus its WAL sidecars, which hold every page
/// written since the last checkpoint
fn on_disk_bytes(path: &Path) -> std::io::Result<u64> {
    let mut total = std::fs::metadata(path)?.len();
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        match std::fs::metadata(&sidecar) {
            Ok(meta) => total += meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let importance: i64 = row.get(3)?;
    let tags_json: String = row.get(5)?;

    let importance = Importance::new(importance).map_err(|e| conversion_error(3, e))?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| conversion_error(5, e))?;

    Ok(MemoryEntry {
        id: row.get(0)?,
        content: row.get(1)?,
        timestamp: row.get(2)?,
        importance,
        category: row.get(4)?,
        tags,
        context_hash: row.get(6)?,
    })
}

/// Quote every token so user input can never reach FTS5 query syntax.
/// Space-separated phrases are AND-ed by FTS5.
fn fts_match_expr(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    async fn insert_if_novel(&self, entry: &MemoryEntry) -> Result<InsertOutcome, StorageError> {
        let entry = entry.clone();
        let tags_json = serde_json::to_string(&entry.tags)?;
        let tags_text = entry.tags.join(" ");

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM memories WHERE context_hash = ?1 AND importance >= ?2 LIMIT 1",
                    params![entry.context_hash, entry.importance.dedup_floor()],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(InsertOutcome::Duplicate);
            }

            tx.execute(
                r#"
                INSERT INTO memories (id, content, timestamp, importance, category, tags, context_hash)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    entry.id,
                    entry.content,
                    entry.timestamp,
                    entry.importance.get(),
                    entry.category,
                    tags_json,
                    entry.context_hash,
                ],
            )?;

            tx.execute(
                "INSERT INTO memories_fts (content, tags, category, entry_id) VALUES (?1, ?2, ?3, ?4)",
                params![entry.content, tags_text, entry.category, entry.id],
            )?;

            tx.commit()?;
            Ok(InsertOutcome::Inserted)
        })
        .await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryEntry>, StorageError> {
        if query.tokens.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }
        let match_expr = fts_match_expr(&query.tokens);
        let category = query.category.clone();
        let limit = query.limit as i64;

        self.run(move |conn| {
            let sql = format!(
                r#"
                SELECT {ENTRY_COLUMNS}
                FROM memories_fts f
                JOIN memories m ON f.entry_id = m.id
                WHERE memories_fts MATCH ?1 AND (?2 IS NULL OR m.category = ?2)
                ORDER BY m.importance DESC, m.timestamp DESC, m.rowid DESC
                LIMIT ?3
                "#
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![match_expr, category, limit], row_to_entry)?;

            let mut result = Vec::new();
            for entry in rows {
                result.push(entry?);
            }
            Ok(result)
        })
        .await
    }

    async fn recent(&self, min_importance: u8, limit: usize) -> Result<Vec<MemoryEntry>, StorageError> {
        let limit = limit as i64;

        self.run(move |conn| {
            let sql = format!(
                r#"
                SELECT {ENTRY_COLUMNS}
                FROM memories m
                WHERE m.importance >= ?1
                ORDER BY m.timestamp DESC, m.rowid DESC
                LIMIT ?2
                "#
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![min_importance, limit], row_to_entry)?;

            let mut result = Vec::new();
            for entry in rows {
                result.push(entry?);
            }
            Ok(result)
        })
        .await
    }

    async fn stats(&self) -> Result<MemoryStats, StorageError> {
        let path = self.path.clone();

        self.run(move |conn| {
            // one read snapshot for every aggregate
            let tx = conn.transaction()?;

            let total: i64 = tx.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
            let (oldest, newest): (Option<String>, Option<String>) = tx.query_row(
                "SELECT MIN(timestamp), MAX(timestamp) FROM memories",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut stats = MemoryStats {
                total_entries: total as u64,
                oldest_entry: oldest,
                newest_entry: newest,
                location: Some(path.display().to_string()),
                ..Default::default()
            };

            {
                let mut stmt = tx.prepare("SELECT category, COUNT(*) FROM memories GROUP BY category")?;
                let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
                for row in rows {
                    let (category, count) = row?;
                    stats.categories.insert(category, count as u64);
                }
            }

            {
                let mut stmt = tx.prepare("SELECT importance, COUNT(*) FROM memories GROUP BY importance")?;
                let rows = stmt.query_map([], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, i64>(1)?)))?;
                for row in rows {
                    let (importance, count) = row?;
                    stats.importance_distribution.insert(importance, count as u64);
                }
            }

            tx.commit()?;

            stats.total_size_mb = bytes_to_mb(on_disk_bytes(&path)?);
            Ok(stats)
        })
        .await
    }

    async fn pattern_samples(&self) -> Result<Vec<PatternSample>, StorageError> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT timestamp, importance, category, tags FROM memories")?;
            let rows = stmt.query_map([], |row| {
                let importance: i64 = row.get(1)?;
                let tags_json: String = row.get(3)?;
                Ok(PatternSample {
                    timestamp: row.get(0)?,
                    importance: Importance::new(importance).map_err(|e| conversion_error(1, e))?,
                    category: row.get(2)?,
                    tags: serde_json::from_str(&tags_json).map_err(|e| conversion_error(3, e))?,
                })
            })?;

            let mut result = Vec::new();
            for sample in rows {
                result.push(sample?);
            }
            Ok(result)
        })
        .await
    }

    async fn count(&self) -> Result<u64, StorageError> {
        self.run(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
            Ok(total as u64)
        })
        .await
    }

    async fn evict_oldest(&self, max_entries: u64, max_importance: u8) -> Result<usize, StorageError> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let total: i64 = tx.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
            let excess = (total as u64).saturating_sub(max_entries);
            if excess == 0 {
                return Ok(0);
            }
            let excess = i64::try_from(excess).unwrap_or(i64::MAX);

            let victims: Vec<String> = {
                let mut stmt = tx.prepare(
                    r#"
                    SELECT id FROM memories
                    WHERE importance <= ?1
                    ORDER BY timestamp ASC, rowid ASC
                    LIMIT ?2
                    "#,
                )?;
                let rows = stmt.query_map(params![max_importance, excess], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<String>, _>>()?
            };

            {
                let mut delete_index = tx.prepare("DELETE FROM memories_fts WHERE entry_id = ?1")?;
                let mut delete_record = tx.prepare("DELETE FROM memories WHERE id = ?1")?;
                for id in &victims {
                    delete_index.execute([id])?;
                    delete_record.execute([id])?;
                }
            }

            tx.commit()?;
            Ok(victims.len())
        })
        .await
    }

    async fn check_index(&self) -> Result<IndexDrift, StorageError> {
        self.run(|conn| {
            let tx = conn.transaction()?;
            let records_without_index: i64 = tx.query_row(
                "SELECT COUNT(*) FROM memories m WHERE NOT EXISTS (SELECT 1 FROM memories_fts f WHERE f.entry_id = m.id)",
                [],
                |row| row.get(0),
            )?;
            let index_without_record: i64 = tx.query_row(
                "SELECT COUNT(*) FROM memories_fts f WHERE NOT EXISTS (SELECT 1 FROM memories m WHERE m.id = f.entry_id)",
                [],
                |row| row.get(0),
            )?;
            tx.commit()?;

            Ok(IndexDrift {
                records_without_index: records_without_index as u64,
                index_without_record: index_without_record as u64,
            })
        })
        .await
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
