//! Test fixtures for integration tests
//!
//! Mock search page, mock webhook receivers and monitor builders

#![allow(dead_code)]

use madori::crawler::{HttpFetcher, DEFAULT_USER_AGENT};
use madori::notifications::channels::{WebhookChannel, WebhookConfig};
use madori::notifications::Dispatcher;
use madori::parser::{ExtractionRules, HtmlExtractor};
use madori::pipeline::Monitor;
use madori::storage::{MemorySeenStore, SeenStats, SeenStore};
use madori::utils::error::StoreError;
use madori::utils::retry::RetryConfig;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SEARCH_PATH: &str = "/jj/chintai/ichiran/FR301FC001/";

/// Serve `body` as the search page
pub async fn mount_search_page(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=UTF-8"),
        )
        .mount(server)
        .await;
}

/// Accept webhook posts on `hook_path` with `status`
pub async fn mount_hook(server: &MockServer, hook_path: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(hook_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Webhook channel posting to `hook_path` on `server`
pub fn webhook(server: &MockServer, id: &str, hook_path: &str) -> Box<WebhookChannel> {
    let config = WebhookConfig::new(format!("{}{hook_path}", server.uri())).with_timeout(5);
    Box::new(WebhookChannel::new(id, config).unwrap())
}

/// Dispatcher with short backoff so failing channels finish quickly
pub fn fast_dispatcher() -> Dispatcher {
    Dispatcher::new()
        .with_retry(RetryConfig::with_delays(1, 1, 2))
        .with_attempt_timeout(Duration::from_secs(5))
}

/// Monitor reading the search page from `server`
pub fn monitor(server: &MockServer, dispatcher: Dispatcher) -> Monitor {
    let fetcher = HttpFetcher::with_config(DEFAULT_USER_AGENT, RetryConfig::none()).unwrap();
    let extractor = HtmlExtractor::from_rules(&ExtractionRules::suumo_chintai()).unwrap();

    Monitor::new(
        Box::new(fetcher),
        Box::new(extractor),
        dispatcher,
        format!("{}{SEARCH_PATH}", server.uri()),
    )
    .with_fetch_timeout(Duration::from_secs(5))
}

/// Posts received on `hook_path` whose `event` is `event`
pub async fn posts(server: &MockServer, hook_path: &str, event: &str) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == hook_path)
        .filter_map(|r| r.body_json::<serde_json::Value>().ok())
        .filter(|body| body["event"] == event)
        .collect()
}

/// Listing ids carried by the posts on `hook_path`
pub async fn notified_ids(server: &MockServer, hook_path: &str) -> Vec<String> {
    posts(server, hook_path, "new_listing")
        .await
        .iter()
        .filter_map(|body| body["listing"]["id"].as_str().map(str::to_string))
        .collect()
}

/// Identity store whose commits always fail, as if the process died
/// between notifying and committing
#[derive(Debug, Default)]
pub struct CrashingStore {
    pub inner: MemorySeenStore,
}

impl SeenStore for CrashingStore {
    fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
    }

    fn commit(&mut self, _ids: &[String]) -> Result<usize, StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk I/O error")))
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn stats(&self) -> Result<SeenStats, StoreError> {
        self.inner.stats()
    }
}
