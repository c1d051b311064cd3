//! Identity store
//!
//! The identity store holds the SeenSet: every listing id that has ever been
//! handled. It only grows. A run loads the whole set up front, partitions
//! freshly extracted records into new and known, and at the end commits the
//! ids it handled in one atomic batch.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Run orchestrator                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SeenStore trait                         │
//! │            contains / diff / commit / stats                 │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                       │
//!                    ▼                       ▼
//!          ┌─────────────────┐     ┌─────────────────┐
//!          │     SQLite      │     │     Memory      │
//!          │ (holds run lock)│     │    (tests)      │
//!          └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use madori::storage::{SeenStore, SqliteSeenStore};
//!
//! let mut store = SqliteSeenStore::open("data/seen.db")?;
//! let partition = store.diff(records);
//! store.commit(&handled_ids)?;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::ListingRecord;
use crate::storage::lock::{self, RunLockGuard};
use crate::utils::error::StoreError;

// ============================================================================
// Core Types
// ============================================================================

/// Records split by SeenSet membership, input order kept in each half
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub new: Vec<ListingRecord>,
    pub known: Vec<ListingRecord>,
}

/// SeenSet statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeenStats {
    /// Number of ids in the SeenSet
    pub total: usize,
    /// Time of the most recent commit that added an id
    pub last_seen_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Durable set of handled listing ids
///
/// Implementations are the single writer of their SeenSet. Ids are never
/// removed.
pub trait SeenStore: Send {
    /// Whether an id has been committed before
    fn contains(&self, id: &str) -> bool;

    /// Commit ids atomically
    ///
    /// Either every id is durable when this returns `Ok`, or none of them
    /// is. Ids already present are ignored. Returns the number of ids that
    /// were newly added.
    ///
    /// # Errors
    /// Returns `StoreError` when the batch could not be made durable.
    fn commit(&mut self, ids: &[String]) -> Result<usize, StoreError>;

    /// Number of ids in the SeenSet
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SeenSet statistics
    ///
    /// # Errors
    /// Returns `StoreError` when the backing storage cannot be queried.
    fn stats(&self) -> Result<SeenStats, StoreError>;

    /// Partition records into new and known, keeping input order
    ///
    /// Does not modify the SeenSet.
    fn diff(&self, records: Vec<ListingRecord>) -> Partition {
        let (new, known) = records.into_iter().partition(|r| !self.contains(&r.id));
        Partition { new, known }
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite-backed SeenSet
///
/// Opening a file-backed store takes the run lock for that file; the lock is
/// held until the store is dropped.
pub struct SqliteSeenStore {
    conn: Connection,
    ids: HashSet<String>,
    path: Option<PathBuf>,
    // declared last so the connection closes before the lock is released
    _lock: Option<RunLockGuard>,
}

impl SqliteSeenStore {
    /// Open (or create) the store at `path`
    ///
    /// # Errors
    /// Returns `StoreError::Locked` when another run holds the store, and
    /// `StoreError::Database` or `StoreError::Io` when it cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let guard = lock::try_lock(path)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL with FULL sync: a returned commit survives power loss
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        create_schema(&conn)?;
        let ids = load_ids(&conn)?;

        info!(path = %path.display(), known = ids.len(), "Identity store opened");

        Ok(Self {
            conn,
            ids,
            path: Some(path.to_path_buf()),
            _lock: Some(guard),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn,
            ids: HashSet::new(),
            path: None,
            _lock: None,
        })
    }

    /// Read statistics of a store file without taking the run lock
    ///
    /// A missing file reads as an empty SeenSet.
    pub fn inspect(path: impl AsRef<Path>) -> Result<SeenStats, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(SeenStats::default());
        }

        let conn = Connection::open(path)?;
        query_stats(&conn)
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Create database schema
fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
            CREATE TABLE IF NOT EXISTS seen_listings (
                id TEXT PRIMARY KEY CHECK(length(id) > 0),
                first_seen_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_seen_listings_first_seen
                ON seen_listings(first_seen_at);
            "#,
    )?;
    Ok(())
}

/// Reject a batch holding an empty id before anything is written
fn validate_batch(ids: &[String]) -> Result<(), StoreError> {
    match ids.iter().find(|id| id.is_empty()) {
        Some(bad) => Err(StoreError::InvalidId(bad.clone())),
        None => Ok(()),
    }
}

fn load_ids(conn: &Connection) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT id FROM seen_listings")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

fn query_stats(conn: &Connection) -> Result<SeenStats, StoreError> {
    let (total, last): (i64, Option<String>) = conn.query_row(
        "SELECT COUNT(*), MAX(first_seen_at) FROM seen_listings",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(SeenStats {
        total: total as usize,
        last_seen_at: last
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

impl SeenStore for SqliteSeenStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn commit(&mut self, ids: &[String]) -> Result<usize, StoreError> {
        validate_batch(ids)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut inserted = Vec::new();
        {
            // only a uniqueness conflict is skipped; a CHECK failure aborts
            let mut stmt = tx.prepare(
                "INSERT INTO seen_listings (id, first_seen_at) VALUES (?1, ?2)
                 ON CONFLICT(id) DO NOTHING",
            )?;
            for id in ids {
                if stmt.execute(params![id, now])? > 0 {
                    inserted.push(id.clone());
                }
            }
        }
        // dropping an uncommitted transaction rolls it back
        tx.commit()?;

        let added = inserted.len();
        self.ids.extend(inserted);
        debug!(batch = ids.len(), added, "Committed ids");
        Ok(added)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn stats(&self) -> Result<SeenStats, StoreError> {
        query_stats(&self.conn)
    }
}

// ============================================================================
// Memory Implementation
// ============================================================================

/// In-memory SeenSet
///
/// Useful for testing without database dependencies.
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    ids: HashMap<String, DateTime<Utc>>,
}

impl MemorySeenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with ids
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            ids: ids.into_iter().map(|id| (id.into(), now)).collect(),
        }
    }

    /// Snapshot of all ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl SeenStore for MemorySeenStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    fn commit(&mut self, ids: &[String]) -> Result<usize, StoreError> {
        validate_batch(ids)?;

        let now = Utc::now();
        let mut added = 0;
        for id in ids {
            if !self.ids.contains_key(id) {
                self.ids.insert(id.clone(), now);
                added += 1;
            }
        }
        Ok(added)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn stats(&self) -> Result<SeenStats, StoreError> {
        Ok(SeenStats {
            total: self.ids.len(),
            last_seen_at: self.ids.values().max().copied(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
