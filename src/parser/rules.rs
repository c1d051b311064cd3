//! Extraction rules for listing search-result pages
//!
//! Rules map each logical field of a [`ListingRecord`](crate::models::ListingRecord)
//! to a CSS selector. They are plain serde data so they can be revised in the
//! config file whenever the upstream markup changes, and are compiled once
//! into [`CompiledRules`] before a run.

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::error::ParseError;

/// Built-in rule sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    /// SUUMO rental search results (suumo.jp/chintai)
    #[default]
    SuumoChintai,
}

impl RuleSet {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuumoChintai => "suumo_chintai",
        }
    }

    /// Rules for this rule set
    pub fn rules(&self) -> ExtractionRules {
        match self {
            Self::SuumoChintai => ExtractionRules::suumo_chintai(),
        }
    }
}

impl std::fmt::Display for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Field-location rules for one site
///
/// A candidate item is every `unit` inside a `card` (or the card itself when
/// `unit` is absent). Field selectors are tried in the unit first and then in
/// the enclosing card, so building-level fields can live on the card while
/// room-level fields live on the unit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRules {
    /// Base URL used to resolve relative listing links
    pub base_url: String,

    /// One card per building
    pub card: String,

    /// One unit per room inside a card
    #[serde(default)]
    pub unit: Option<String>,

    /// Anchor whose `href` carries the listing URL and identity
    pub link: String,

    /// Regex applied to the link `href`; the first capture group is the id
    pub id_pattern: String,

    /// Query parameter used as id when `id_pattern` does not match
    #[serde(default)]
    pub id_query_param: Option<String>,

    pub title: String,
    pub price: String,
    pub layout: String,

    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub station_access: Option<String>,
    #[serde(default)]
    pub building_age: Option<String>,

    /// Regex matched against the unit text to find the floor
    #[serde(default)]
    pub floor_pattern: Option<String>,
}

impl ExtractionRules {
    /// Rules for SUUMO rental search results
    pub fn suumo_chintai() -> Self {
        Self {
            base_url: "https://suumo.jp".to_string(),
            card: "div.cassetteitem".to_string(),
            unit: Some("table.cassetteitem_other tbody tr".to_string()),
            link: "td.ui-text--bold a".to_string(),
            id_pattern: r"(jnc_\w+)".to_string(),
            id_query_param: Some("bc".to_string()),
            title: "div.cassetteitem_content-title".to_string(),
            price: "span.cassetteitem_other-emphasis".to_string(),
            layout: "span.cassetteitem_madori".to_string(),
            area: Some("span.cassetteitem_menseki".to_string()),
            address: Some("li.cassetteitem_detail-col1".to_string()),
            station_access: Some("li.cassetteitem_detail-col2".to_string()),
            building_age: Some("li.cassetteitem_detail-col3".to_string()),
            floor_pattern: Some(r"\d+階".to_string()),
        }
    }

    /// Compile selectors and patterns
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidSelector`, `ParseError::InvalidPattern` or
    /// `ParseError::InvalidBaseUrl` naming the offending field.
    pub fn compile(&self) -> Result<CompiledRules, ParseError> {
        let base_url =
            Url::parse(&self.base_url).map_err(|_| ParseError::InvalidBaseUrl(self.base_url.clone()))?;

        Ok(CompiledRules {
            base_url,
            card: selector("card", &self.card)?,
            unit: optional_selector("unit", self.unit.as_deref())?,
            link: selector("link", &self.link)?,
            id_pattern: pattern("id_pattern", &self.id_pattern)?,
            id_query_param: self.id_query_param.clone().filter(|p| !p.is_empty()),
            title: selector("title", &self.title)?,
            price: selector("price", &self.price)?,
            layout: selector("layout", &self.layout)?,
            area: optional_selector("area", self.area.as_deref())?,
            address: optional_selector("address", self.address.as_deref())?,
            station_access: optional_selector("station_access", self.station_access.as_deref())?,
            building_age: optional_selector("building_age", self.building_age.as_deref())?,
            floor_pattern: self
                .floor_pattern
                .as_deref()
                .map(|p| pattern("floor_pattern", p))
                .transpose()?,
        })
    }
}

impl Default for ExtractionRules {
    fn default() -> Self {
        RuleSet::default().rules()
    }
}

/// Rules ready for extraction
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub(crate) base_url: Url,
    pub(crate) card: Selector,
    pub(crate) unit: Option<Selector>,
    pub(crate) link: Selector,
    pub(crate) id_pattern: Regex,
    pub(crate) id_query_param: Option<String>,
    pub(crate) title: Selector,
    pub(crate) price: Selector,
    pub(crate) layout: Selector,
    pub(crate) area: Option<Selector>,
    pub(crate) address: Option<Selector>,
    pub(crate) station_access: Option<Selector>,
    pub(crate) building_age: Option<Selector>,
    pub(crate) floor_pattern: Option<Regex>,
}

impl CompiledRules {
    /// Derive the listing id from a link
    ///
    /// The id pattern is tried against the raw `href` first; the query
    /// parameter fallback renders as `<param>_<value>`.
    pub fn listing_id(&self, href: &str, resolved: &Url) -> Option<String> {
        let from_pattern = self.id_pattern.captures(href).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
        });

        if let Some(id) = from_pattern.filter(|id| !id.is_empty()) {
            return Some(id);
        }

        let param = self.id_query_param.as_deref()?;
        resolved
            .query_pairs()
            .find(|(key, value)| key == param && !value.is_empty())
            .map(|(_, value)| format!("{param}_{value}"))
    }

    /// Resolve a link against the rule set's base URL
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.base_url.join(href).ok()
    }
}

fn selector(field: &str, css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::InvalidSelector {
        field: field.to_string(),
        selector: css.to_string(),
    })
}

fn optional_selector(field: &str, css: Option<&str>) -> Result<Option<Selector>, ParseError> {
    css.filter(|s| !s.trim().is_empty())
        .map(|s| selector(field, s))
        .transpose()
}

fn pattern(field: &str, re: &str) -> Result<Regex, ParseError> {
    Regex::new(re).map_err(|e| ParseError::InvalidPattern {
        field: field.to_string(),
        message: e.to_string(),
    })
}
