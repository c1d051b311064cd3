//! Browser-like request headers for search-page fetches

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

use crate::utils::error::FetchError;

/// Default desktop Chrome user agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Build browser headers for a Japanese search page
///
/// Accept-Encoding is left to the HTTP client so that only encodings it can
/// decode are advertised.
///
/// # Examples
///
/// ```
/// use madori::crawler::headers::{build_browser_headers, DEFAULT_USER_AGENT};
///
/// let headers = build_browser_headers(DEFAULT_USER_AGENT).unwrap();
/// assert_eq!(headers["accept-language"], "ja,en;q=0.9");
/// ```
pub fn build_browser_headers(user_agent: &str) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();

    let ua = HeaderValue::from_str(user_agent)
        .map_err(|_| FetchError::InvalidHeader(format!("user agent {user_agent:?}")))?;
    headers.insert(USER_AGENT, ua);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ja,en;q=0.9"));

    // Sec-Fetch headers for modern browser compatibility
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );

    Ok(headers)
}
