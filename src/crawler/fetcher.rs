//! HTTP fetcher with retry and Japanese charset support
//!
//! This module provides the page fetcher used at the start of every run:
//! - Browser-like headers with `Accept-Language: ja`
//! - Bounded retry with exponential backoff on 429 and 5xx
//! - Per-call timeout
//! - UTF-8, Shift_JIS and EUC-JP decoding via `encoding_rs`

use async_trait::async_trait;
use encoding_rs::{Encoding, EUC_JP, SHIFT_JIS, UTF_8};
use regex::Regex;
use reqwest::{header::HeaderMap, Client, Response};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::crawler::headers::{build_browser_headers, DEFAULT_USER_AGENT};
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Source of raw search-page content
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page at `url`, giving up after `timeout` per attempt
    ///
    /// # Errors
    /// Returns a `FetchError` when no content could be obtained.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// Search-page fetcher over HTTP
pub struct HttpFetcher {
    /// HTTP client with compression and cookies
    client: Client,

    /// Headers sent with every request
    headers: HeaderMap,

    /// Retry policy for 429, 5xx and transport errors
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Create a fetcher with the default user agent and retry policy
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(DEFAULT_USER_AGENT, RetryConfig::with_delays(2, 1_000, 8_000))
    }

    /// Create a fetcher with a custom user agent and retry policy
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created, or
    /// `FetchError::InvalidHeader` if the user agent is not a valid header
    pub fn with_config(user_agent: &str, retry: RetryConfig) -> Result<Self, FetchError> {
        let client = Client::builder().gzip(true).cookie_store(true).build()?;

        Ok(Self {
            client,
            headers: build_browser_headers(user_agent)?,
            retry,
        })
    }

    /// One request, status mapped to an error
    async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return decode_response(response).await;
        }

        if status.as_u16() == 429 {
            return Err(FetchError::RateLimit);
        }

        Err(FetchError::ServerError(status.as_u16()))
    }

    /// Determine if an error should trigger a retry
    ///
    /// Retry on 429, 500, 502, 503, 504, timeouts and transport errors.
    /// Never on other 4xx or on decoding problems.
    fn should_retry(error: &FetchError) -> bool {
        match error {
            FetchError::RateLimit | FetchError::Timeout | FetchError::Http(_) => true,
            FetchError::ServerError(status) => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        debug!(url, timeout_ms = timeout.as_millis() as u64, "Fetching search page");

        let result = with_retry_if(
            &self.retry,
            move || self.fetch_once(url, timeout),
            Self::should_retry,
        )
        .await;

        match result {
            Ok(body) => {
                info!(url, bytes = body.len(), "Fetched search page");
                Ok(body)
            }
            Err(e) if self.retry.max_retries > 0 && Self::should_retry(&e) => {
                Err(FetchError::MaxRetriesExceeded(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Decode response body honoring the declared charset
async fn decode_response(response: Response) -> Result<String, FetchError> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let bytes = response.bytes().await?;
    decode_bytes(&bytes, &content_type)
}

/// Decode bytes to a string
///
/// Strategies, in order:
/// 1. charset from the Content-Type header
/// 2. charset from a `<meta>` tag near the top of the document
/// 3. strict UTF-8
/// 4. strict Shift_JIS, then EUC-JP
///
/// # Errors
///
/// Returns `FetchError::Decode` if no strategy applies
pub fn decode_bytes(bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
    if let Some(encoding) = charset_label(content_type).and_then(Encoding::for_label) {
        return Ok(decode_lossy(bytes, encoding));
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(2048)]);
    if let Some(encoding) = charset_label(&head).and_then(Encoding::for_label) {
        return Ok(decode_lossy(bytes, encoding));
    }

    for encoding in [UTF_8, SHIFT_JIS, EUC_JP] {
        if let Some(text) = decode_strict(bytes, encoding) {
            return Ok(text);
        }
    }

    Err(FetchError::Decode(
        "content is not UTF-8, Shift_JIS or EUC-JP".to_string(),
    ))
}

/// `charset=...` label, as bytes for `Encoding::for_label`
fn charset_label(text: &str) -> Option<&[u8]> {
    static CHARSET_RE: OnceLock<Regex> = OnceLock::new();
    let re = CHARSET_RE.get_or_init(|| {
        Regex::new(r#"(?i)charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#).expect("Invalid regex pattern")
    });

    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().as_bytes())
}

fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let (cow, had_errors) = encoding.decode_without_bom_handling(bytes);
    (!had_errors).then(|| cow.into_owned())
}

fn decode_lossy(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (cow, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(encoding = actual.name(), "Malformed bytes replaced while decoding page");
    }
    cow.into_owned()
}
