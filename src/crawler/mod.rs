//! Search-page fetching
//!
//! This module fetches the configured search-results page with browser-like
//! headers, bounded retry and charset decoding.

pub mod fetcher;
pub mod headers;

pub use fetcher::{decode_bytes, HttpFetcher, PageFetcher};
pub use headers::{build_browser_headers, DEFAULT_USER_AGENT};
