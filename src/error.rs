//! Unified error handling for the madori crate
//!
//! Domain errors (`FetchError`, `ParseError`, `StoreError`) are folded into
//! a single [`Error`] enum so the run orchestrator and the binary can
//! classify failures uniformly.
//!
//! # Propagation policy
//!
//! Only fetch, format, store and lock errors ever reach the orchestrator's
//! `Failed` state. Channel errors and per-item extraction problems are
//! absorbed into the run summary.

use thiserror::Error;

pub use crate::utils::error::{FetchError, ParseError, StoreError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Page format and extraction-rule errors
    Parsing,
    /// Identity store errors
    Storage,
    /// Another run is already in progress
    Contention,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Contention => "contention",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for the madori crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetching the search page failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The page could not be parsed, or the rules are invalid
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Identity store failure, including lock contention
    #[error("Store error: {0}")]
    Store(#[from] StoreError),


}

impl Error {
    /// Check if this error is recoverable by a later scheduled run
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Parse(_) => false,
            Self::Store(e) => e.is_lock_contention(),
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Parse(_) => ErrorCategory::Parsing,
            Self::Store(StoreError::Locked(_)) => ErrorCategory::Contention,
            Self::Store(_) => ErrorCategory::Storage,
        }
    }

    /// Lock contention means the run was skipped
    pub fn is_lock_contention(&self) -> bool {
        self.category() == ErrorCategory::Contention
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
