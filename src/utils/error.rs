//! Error types for the madori monitor
//!
//! This module defines the domain errors used by the fetcher, the extractor
//! and the identity store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching the search-results page
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Non-success status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded (last error: {0})")]
    MaxRetriesExceeded(String),

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A configured header value cannot be sent
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

impl FetchError {
    /// Whether a later attempt could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimit | Self::Timeout | Self::MaxRetriesExceeded(_) => true,
            Self::ServerError(code) => *code >= 500 || *code == 429,
            Self::Decode(_) | Self::InvalidUrl(_) | Self::InvalidHeader(_) => false,
        }
    }
}

/// Errors that can occur while turning a page into listing records
#[derive(Error, Debug)]
pub enum ParseError {
    /// The page as a whole is not an HTML document
    #[error("Content is not an HTML document (starts with: {excerpt:?})")]
    NotHtml {
        /// Leading part of the raw content, for diagnosing markup changes
        excerpt: String,
    },

    /// A selector in the extraction rules failed to compile
    #[error("Invalid CSS selector for {field}: {selector}")]
    InvalidSelector { field: String, selector: String },

    /// A regular expression in the extraction rules failed to compile
    #[error("Invalid pattern for {field}: {message}")]
    InvalidPattern { field: String, message: String },

    /// The base URL of the rule set cannot be parsed
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Errors raised by the identity store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another run holds the store
    #[error("Identity store is locked by another run: {0}")]
    Locked(PathBuf),

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure (directories, lock file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An id that can never be stored
    #[error("Invalid listing id: {0:?}")]
    InvalidId(String),
}

impl StoreError {
    /// Lock contention is a skipped run, not a failure
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}
