//! Run orchestrator
//!
//! One run walks a fixed state machine:
//!
//! ```text
//! FETCHING ──▶ EXTRACTING ──▶ DIFFING ──▶ NOTIFYING ──▶ COMMITTING ──▶ DONE
//!     │             │                                        │
//!     └─────────────┴──────────────▶ FAILED ◀────────────────┘
//! ```
//!
//! Fetch, format and store errors end the run in `FAILED`. Channel failures
//! and dropped items never do; they are counted in the [`RunSummary`].
//!
//! # Example
//!
//! ```rust,ignore
//! use madori::pipeline::{Monitor, RunOptions};
//! use madori::storage::SqliteSeenStore;
//!
//! let monitor = Monitor::new(Box::new(fetcher), Box::new(extractor), dispatcher, url);
//! let mut store = SqliteSeenStore::open("data/seen.db")?;
//! let summary = monitor.run(&mut store, RunOptions::default()).await?;
//! println!("{summary}");
//! ```

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::crawler::PageFetcher;
use crate::error::{Error, ParseError};
use crate::models::RunSummary;
use crate::notifications::Dispatcher;
use crate::parser::Extractor;
use crate::storage::{Partition, SeenStore};

/// Default per-attempt fetch timeout
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// State Machine
// ============================================================================

/// Step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Fetching,
    Extracting,
    Diffing,
    Notifying,
    Committing,
    Done,
    Failed,
}

impl RunState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Diffing => "diffing",
            Self::Notifying => "notifying",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A run that ended in `FAILED`
#[derive(Debug, Error)]
#[error("run failed while {stage}: {source}")]
pub struct RunError {
    /// State the run was in when it failed
    pub stage: RunState,

    #[source]
    pub source: Error,
}

impl RunError {
    pub fn new(stage: RunState, source: impl Into<Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Another run holds the identity store
    pub fn is_lock_contention(&self) -> bool {
        self.source.is_lock_contention()
    }
}

/// Per-invocation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Extract and diff only; no notification, no commit
    pub dry_run: bool,
}

impl RunOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Diff-and-notify orchestrator for one search page
///
/// Holds no cross-run state: the identity store is passed to every
/// [`Monitor::run`] call.
pub struct Monitor {
    fetcher: Box<dyn PageFetcher>,
    extractor: Box<dyn Extractor>,
    dispatcher: Dispatcher,
    search_url: String,
    fetch_timeout: Duration,
}

impl Monitor {
    /// Create a monitor for `search_url`
    pub fn new(
        fetcher: Box<dyn PageFetcher>,
        extractor: Box<dyn Extractor>,
        dispatcher: Dispatcher,
        search_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            dispatcher,
            search_url: search_url.into(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the per-attempt fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Execute one run against `store`
    ///
    /// On failure an operator alert goes out on every channel, except on a
    /// dry run. Notifications already delivered before a failed commit stand;
    /// their ids are offered again by the next run.
    ///
    /// # Errors
    /// Returns a [`RunError`] naming the state the run failed in.
    pub async fn run(
        &self,
        store: &mut dyn SeenStore,
        options: RunOptions,
    ) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id, dry_run = options.dry_run);

        async move {
            let started = Instant::now();
            let mut summary = RunSummary::new(run_id.as_str(), options.dry_run);

            info!(url = %self.search_url, known = store.len(), "Run started");

            let result = self.execute(store, options, &mut summary).await;
            summary.elapsed = started.elapsed();

            match result {
                Ok(()) => {
                    info!(
                        state = %RunState::Done,
                        extracted = summary.extracted,
                        dropped = summary.dropped,
                        known = summary.known,
                        new = summary.new,
                        notified = summary.notified,
                        unhandled = summary.unhandled,
                        committed = summary.committed,
                        channel_failures = summary.total_channel_failures(),
                        elapsed_ms = summary.elapsed.as_millis() as u64,
                        "Run completed"
                    );
                    Ok(summary)
                }
                Err(err) => {
                    error!(
                        state = %RunState::Failed,
                        stage = %err.stage,
                        category = %err.source.category(),
                        recoverable = err.source.is_recoverable(),
                        error = %err.source,
                        "Run failed"
                    );
                    if !options.dry_run {
                        let text = format!("Run {run_id} failed while {}: {}", err.stage, err.source);
                        self.dispatcher.alert(&text).await;
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        store: &mut dyn SeenStore,
        options: RunOptions,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        // FETCHING
        enter(RunState::Fetching);
        let raw = self
            .fetcher
            .fetch(&self.search_url, self.fetch_timeout)
            .await
            .map_err(|e| RunError::new(RunState::Fetching, e))?;

        // EXTRACTING
        enter(RunState::Extracting);
        let extraction = self.extractor.extract(&raw).map_err(|e| {
            if let ParseError::NotHtml { excerpt } = &e {
                error!(excerpt = %excerpt, "Fetched content is not an HTML document");
            }
            RunError::new(RunState::Extracting, e)
        })?;

        if extraction.candidates == 0 {
            warn!("No listing items located; the page markup may have changed or the request was blocked");
        }
        for warning in &extraction.warnings {
            warn!(%warning, "Listing item dropped");
        }
        summary.extracted = extraction.records.len();
        summary.dropped = extraction.dropped();

        // DIFFING
        enter(RunState::Diffing);
        let Partition { new, known } = store.diff(extraction.records);
        summary.known = known.len();
        summary.new = new.len();
        info!(new = summary.new, known = summary.known, "Diff computed");

        // NOTIFYING
        enter(RunState::Notifying);
        let mut handled = Vec::with_capacity(new.len());
        for record in &new {
            if options.dry_run {
                info!(id = %record.id, listing = %record.headline(), "Would notify");
                continue;
            }

            let report = self.dispatcher.notify(record).await;
            for (channel, _) in report.failed_channels() {
                summary.record_channel_failure(channel);
            }

            if report.is_handled() {
                summary.notified += 1;
                handled.push(record.id.clone());
                debug!(id = %record.id, "Listing handled");
            } else {
                summary.unhandled += 1;
                warn!(id = %record.id, "Every channel failed; listing will be offered again");
            }
        }

        // COMMITTING
        enter(RunState::Committing);
        if options.dry_run {
            info!(would_notify = new.len(), "Dry run, nothing committed");
        } else if handled.is_empty() {
            debug!("Nothing to commit");
        } else {
            summary.committed = store
                .commit(&handled)
                .map_err(|e| RunError::new(RunState::Committing, e))?;
            info!(committed = summary.committed, "Handled ids committed");
        }

        Ok(())
    }
}

fn enter(state: RunState) {
    debug!(%state, "Entering state");
}
