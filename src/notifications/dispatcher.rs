//! Dispatcher for listing notifications and operator alerts

use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::channels::{Channel, ChannelError};
use super::{DeliveryReport, Message, NotificationOutcome};
use crate::models::ListingRecord;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Default bound on a single delivery attempt
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Delivers messages on every registered channel
pub struct Dispatcher {
    /// Registered notification channels, ids unique
    channels: Vec<Box<dyn Channel>>,

    /// Retry policy applied per channel
    retry: RetryConfig,

    /// Upper bound on one attempt, on top of the HTTP client timeout
    attempt_timeout: Duration,

    /// Deliver to all channels of a record at once
    concurrent: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher without channels
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            retry: RetryConfig::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            concurrent: true,
        }
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Deliver to channels one after another instead of concurrently
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Add a notification channel
    ///
    /// # Errors
    /// Returns `ChannelError::InvalidConfig` when a channel with the same id
    /// is already registered.
    pub fn add_channel(&mut self, channel: Box<dyn Channel>) -> Result<(), ChannelError> {
        if self.channels.iter().any(|c| c.id() == channel.id()) {
            return Err(ChannelError::InvalidConfig(format!(
                "duplicate channel id: {}",
                channel.id()
            )));
        }

        debug!(channel = channel.id(), config = %channel.config(), "Channel registered");
        self.channels.push(channel);
        Ok(())
    }

    /// Ids of the registered channels, in registration order
    pub fn channel_ids(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Notify one new listing on every channel
    ///
    /// Never fails: every channel yields an outcome. With no channels the
    /// report is empty and counts as handled.
    pub async fn notify(&self, record: &ListingRecord) -> DeliveryReport {
        let message = Message::listing(record);
        let report = self.deliver_all(&message).await;

        for (channel, reason) in report.failed_channels() {
            warn!(id = %record.id, channel, reason, "Notification failed");
        }

        report
    }

    /// Best-effort operator alert on every channel
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn alert(&self, text: &str) {
        if self.channels.is_empty() {
            return;
        }

        let report = self.deliver_all(&Message::alert(text)).await;
        for (channel, reason) in report.failed_channels() {
            warn!(channel, reason, "Operator alert could not be delivered");
        }
        info!(
            delivered = report.outcomes.len() - report.failed_channels().count(),
            "Operator alert sent"
        );
    }

    async fn deliver_all(&self, message: &Message) -> DeliveryReport {
        let outcomes: Vec<(String, NotificationOutcome)> = if self.concurrent {
            join_all(self.channels.iter().map(|channel| async move {
                let outcome = self.deliver(channel.as_ref(), message).await;
                (channel.id().to_string(), outcome)
            }))
            .await
        } else {
            let mut outcomes = Vec::with_capacity(self.channels.len());
            for channel in &self.channels {
                let outcome = self.deliver(channel.as_ref(), message).await;
                outcomes.push((channel.id().to_string(), outcome));
            }
            outcomes
        };

        DeliveryReport {
            outcomes: outcomes.into_iter().collect(),
        }
    }

    /// One channel: bounded retry, each attempt under a timeout
    async fn deliver(&self, channel: &dyn Channel, message: &Message) -> NotificationOutcome {
        let limit = self.attempt_timeout;

        let result = with_retry_if(
            &self.retry,
            move || async move {
                match tokio::time::timeout(limit, channel.send(message)).await {
                    Ok(result) => result,
                    Err(_) => Err(ChannelError::Timeout(limit)),
                }
            },
            ChannelError::is_retryable,
        )
        .await;

        match result {
            Ok(()) => NotificationOutcome::Delivered,
            Err(e) => NotificationOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::notifications::channels::ChannelResult;

    /// Fails `failures` times with the given status, then succeeds
    struct ScriptedChannel {
        id: String,
        failures: u32,
        status: u16,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedChannel {
        fn new(id: &str, failures: u32, status: u16) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    id: id.to_string(),
                    failures,
                    status,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn id(&self) -> &str {
            &self.id
        }

        async fn send(&self, _message: &Message) -> ChannelResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ChannelError::Status {
                    status: self.status,
                    body: "scripted".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    struct HangingChannel;

    #[async_trait]
    impl Channel for HangingChannel {
        fn id(&self) -> &str {
            "hanging"
        }

        async fn send(&self, _message: &Message) -> ChannelResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn record() -> ListingRecord {
        ListingRecord::new("jnc_1", "https://suumo.jp/chintai/jnc_1/", "t", "8万円", "1K")
    }

    fn fast() -> Dispatcher {
        Dispatcher::new().with_retry(RetryConfig::with_delays(2, 1, 2))
    }

    #[tokio::test]
    async fn test_no_channels_is_handled() {
        let report = fast().notify(&record()).await;
        assert!(report.outcomes.is_empty());
        assert!(report.is_handled());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (channel, calls) = ScriptedChannel::new("a", 2, 503);
        let mut dispatcher = fast();
        dispatcher.add_channel(Box::new(channel)).unwrap();

        let report = dispatcher.notify(&record()).await;
        assert_eq!(report.outcomes["a"], NotificationOutcome::Delivered);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (channel, calls) = ScriptedChannel::new("a", 10, 401);
        let mut dispatcher = fast();
        dispatcher.add_channel(Box::new(channel)).unwrap();

        let report = dispatcher.notify(&record()).await;
        assert!(!report.is_handled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_success_is_enough() {
        for concurrent in [true, false] {
            let (failing, _) = ScriptedChannel::new("a", 10, 500);
            let (working, _) = ScriptedChannel::new("b", 0, 500);
            let mut dispatcher = fast().with_concurrency(concurrent);
            dispatcher.add_channel(Box::new(failing)).unwrap();
            dispatcher.add_channel(Box::new(working)).unwrap();

            let report = dispatcher.notify(&record()).await;
            assert!(matches!(report.outcomes["a"], NotificationOutcome::Failed(_)));
            assert_eq!(report.outcomes["b"], NotificationOutcome::Delivered);
            assert!(report.is_handled());
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_bounds_delivery() {
        let mut dispatcher = Dispatcher::new()
            .with_retry(RetryConfig::none())
            .with_attempt_timeout(Duration::from_millis(20));
        dispatcher.add_channel(Box::new(HangingChannel)).unwrap();

        let report = dispatcher.notify(&record()).await;
        match &report.outcomes["hanging"] {
            NotificationOutcome::Failed(reason) => assert!(reason.contains("timed out")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_channel_id_rejected() {
        let (a, _) = ScriptedChannel::new("slack", 0, 500);
        let (b, _) = ScriptedChannel::new("slack", 0, 500);
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_channel(Box::new(a)).unwrap();
        assert!(dispatcher.add_channel(Box::new(b)).is_err());
        assert_eq!(dispatcher.channel_ids(), vec!["slack"]);
    }

    #[tokio::test]
    async fn test_alert_never_fails() {
        let (failing, calls) = ScriptedChannel::new("a", 10, 500);
        let mut dispatcher = fast();
        dispatcher.add_channel(Box::new(failing)).unwrap();

        dispatcher.alert("fetch failed").await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
