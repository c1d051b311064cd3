//! Persistence of the SeenSet
//!
//! This module handles the durable identity store and the per-store run lock.

pub mod lock;
pub mod repository;

pub use lock::{lock_path_for, try_lock, RunLockGuard};
pub use repository::{MemorySeenStore, Partition, SeenStats, SeenStore, SqliteSeenStore};
