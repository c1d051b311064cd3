//! madori - new-listing monitor for SUUMO search results
//!
//! Each run fetches one search-results page, extracts the listings on it,
//! notifies every listing not seen before, and records the handled ids so a
//! later run does not notify them again.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration from environment variables or TOML
//! - [`crawler`] - Search-page fetching with retry and charset decoding
//! - [`parser`] - Rule-driven listing extraction
//! - [`storage`] - Identity store (the set of handled ids) and run lock
//! - [`notifications`] - Channels and the delivery dispatcher
//! - [`pipeline`] - Run orchestrator
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use madori::config::Config;
//! use madori::pipeline::{Monitor, RunOptions};
//! use madori::storage::SqliteSeenStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let monitor = Monitor::new(
//!         Box::new(config.build_fetcher()?),
//!         Box::new(config.build_extractor()?),
//!         config.build_dispatcher()?,
//!         config.monitor.search_url.clone(),
//!     );
//!     let mut store = SqliteSeenStore::open(&config.storage.db_path)?;
//!     let summary = monitor.run(&mut store, RunOptions::default()).await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod notifications;
pub mod parser;
pub mod pipeline;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{HttpFetcher, PageFetcher};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{ListingRecord, RunSummary};
    pub use crate::notifications::{Channel, Dispatcher, NotificationOutcome};
    pub use crate::parser::{Extractor, HtmlExtractor};
    pub use crate::pipeline::{Monitor, RunError, RunOptions, RunState};
    pub use crate::storage::{MemorySeenStore, SeenStore, SqliteSeenStore};
}

// Direct re-exports for convenience
pub use models::{ListingRecord, RunSummary};
