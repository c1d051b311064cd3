// Core data structures for the madori monitor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One listing discovered on the search-results page
///
/// Only `id` carries identity. Every other field is display content for the
/// notification and never takes part in dedup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListingRecord {
    pub id: String, // e.g. "jnc_000104425407"
    pub url: String,
    pub title: String, // building name
    pub price: String, // rent as displayed, e.g. "8.5万円"
    pub layout: String, // e.g. "1LDK"
    pub area: String,
    pub address: String,
    pub station_access: String,
    pub building_age: String,
    pub floor: String, // e.g. "3階"
}

impl ListingRecord {
    /// Create a record with the required fields only
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        price: impl Into<String>,
        layout: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            price: price.into(),
            layout: layout.into(),
            ..Default::default()
        }
    }

    /// One-line description used in logs
    pub fn headline(&self) -> String {
        let mut parts = vec![self.title.as_str(), self.price.as_str(), self.layout.as_str()];
        if !self.floor.is_empty() {
            parts.push(self.floor.as_str());
        }
        parts.retain(|p| !p.is_empty());
        format!("{}: {}", self.id, parts.join(" "))
    }
}

/// Ephemeral per-run counters, reported to the caller and the log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Identifier of the run, shared with its tracing span
    pub run_id: String,
    /// Whether delivery and persistence were suppressed
    pub dry_run: bool,
    /// Records produced by the extractor
    pub extracted: usize,
    /// Candidate items dropped with an extraction warning
    pub dropped: usize,
    /// Records already present in the SeenSet
    pub known: usize,
    /// Records not present in the SeenSet
    pub new: usize,
    /// New records delivered on at least one channel (or with no channels)
    pub notified: usize,
    /// New records whose every channel failed; offered again next run
    pub unhandled: usize,
    /// Ids durably committed this run
    pub committed: usize,
    /// Failed deliveries per channel id
    pub channel_failures: BTreeMap<String, usize>,
    /// Wall-clock time of the run
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    /// Create an empty summary for a run
    pub fn new(run_id: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: run_id.into(),
            dry_run,
            ..Default::default()
        }
    }

    /// Count one failed delivery on a channel
    pub fn record_channel_failure(&mut self, channel: &str) {
        *self.channel_failures.entry(channel.to_string()).or_insert(0) += 1;
    }

    /// Total failed deliveries across all channels
    pub fn total_channel_failures(&self) -> usize {
        self.channel_failures.values().sum()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "extracted={} dropped={} known={} new={} notified={} unhandled={} committed={}",
            self.extracted,
            self.dropped,
            self.known,
            self.new,
            self.notified,
            self.unhandled,
            self.committed
        )?;
        for (channel, count) in &self.channel_failures {
            write!(f, " {channel}_failures={count}")?;
        }
        if self.dry_run {
            write!(f, " (dry run)")?;
        }
        Ok(())
    }
}
