//! Notification delivery for new listings
//!
//! Each new listing becomes one [`Message`] that the [`Dispatcher`] delivers
//! on every configured channel. Channels are independent: a failure on one
//! never stops the others, and never escapes the dispatcher as an error.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                Dispatcher                  │
//! │  - Per-channel bounded retry               │
//! │  - Per-attempt timeout                     │
//! │  - Outcome map per listing                 │
//! │  - Best-effort operator alerts             │
//! └────────────────────────────────────────────┘
//!                     │
//!         ┌───────────┬─┴─────────┬───────────┐
//!         ▼           ▼           ▼           ▼
//!   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐
//!   │  LINE   │ │  Slack  │ │ Webhook │ │  Email  │
//!   │ Channel │ │ Channel │ │ Channel │ │ Channel │
//!   └─────────┘ └─────────┘ └─────────┘ └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use madori::notifications::Dispatcher;
//! use madori::notifications::channels::{SlackChannel, SlackConfig};
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.add_channel(Box::new(SlackChannel::new(SlackConfig::new(url))?))?;
//!
//! let report = dispatcher.notify(&record).await;
//! if report.is_handled() {
//!     handled.push(record.id.clone());
//! }
//! ```

pub mod channels;
mod dispatcher;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::ListingRecord;

// Re-exports
pub use channels::{Channel, ChannelError, ChannelResult};
pub use dispatcher::Dispatcher;

/// What a message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A listing not seen before
    NewListing,
    /// A failed run, for the operator
    Alert,
}

impl MessageKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewListing => "new_listing",
            Self::Alert => "alert",
        }
    }
}

/// A rendered notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub kind: MessageKind,
    pub subject: String,
    pub text: String,
    /// The listing, for channels that forward structured data
    pub listing: Option<ListingRecord>,
}

impl Message {
    /// One message per new listing
    ///
    /// Layout: title, price / layout / area, address, station access,
    /// building age and floor, URL. Empty fields are left out.
    pub fn listing(record: &ListingRecord) -> Self {
        let mut lines = vec![record.title.clone()];

        let terms = join_present(&[&record.price, &record.layout, &record.area], " / ");
        if !terms.is_empty() {
            lines.push(terms);
        }
        for line in [&record.address, &record.station_access] {
            if !line.is_empty() {
                lines.push(line.clone());
            }
        }
        let building = join_present(&[&record.building_age, &record.floor], " ");
        if !building.is_empty() {
            lines.push(building);
        }
        lines.push(record.url.clone());

        Self {
            kind: MessageKind::NewListing,
            subject: format!("【新着物件】{}", record.title),
            text: lines.join("\n"),
            listing: Some(record.clone()),
        }
    }

    /// Operator alert about a failed run
    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Alert,
            subject: "[madori] 監視エラー".to_string(),
            text: text.into(),
            listing: None,
        }
    }
}

fn join_present(parts: &[&String], sep: &str) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Result of delivering one message on one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Delivered,
    Failed(String),
}

impl NotificationOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl std::fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcomes of one listing across all channels, keyed by channel id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub outcomes: BTreeMap<String, NotificationOutcome>,
}

impl DeliveryReport {
    /// Handled iff some channel delivered, or no channel is configured
    pub fn is_handled(&self) -> bool {
        self.outcomes.is_empty() || self.outcomes.values().any(NotificationOutcome::is_delivered)
    }

    /// Channels that failed, in id order
    pub fn failed_channels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            NotificationOutcome::Failed(reason) => Some((id.as_str(), reason.as_str())),
            NotificationOutcome::Delivered => None,
        })
    }
}
