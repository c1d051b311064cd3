//! Listing extraction from search-result HTML
//!
//! Turns raw page content into [`ListingRecord`]s using a [`CompiledRules`]
//! set. A page that is not HTML at all is a format error; an individual item
//! that is missing a required field is dropped with a warning and never
//! aborts the rest of the page.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::models::ListingRecord;
use crate::parser::rules::{CompiledRules, ExtractionRules};
use crate::parser::sanitize::{clean_field, has_content};
use crate::parser::{Extraction, ExtractionWarning, Extractor};
use crate::utils::error::ParseError;
use crate::utils::excerpt;

/// Characters of raw content quoted in a format error
const EXCERPT_CHARS: usize = 200;

/// Extractor for HTML search-result pages
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    rules: CompiledRules,
}

impl HtmlExtractor {
    /// Create an extractor from compiled rules
    pub fn new(rules: CompiledRules) -> Self {
        Self { rules }
    }

    /// Compile rules and create an extractor
    ///
    /// # Errors
    /// Returns the compile error of the first invalid selector or pattern
    pub fn from_rules(rules: &ExtractionRules) -> Result<Self, ParseError> {
        Ok(Self::new(rules.compile()?))
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, raw: &str) -> Result<Extraction, ParseError> {
        extract(raw, &self.rules)
    }
}

/// Extract listing records from raw page content
///
/// Records come back in page order. When the same id appears more than once
/// on the page the first occurrence wins and later ones become
/// [`ExtractionWarning::DuplicateId`].
///
/// # Errors
/// Returns `ParseError::NotHtml` when the content is empty or not an HTML
/// document. A page that is HTML but contains no listings is not an error.
pub fn extract(raw: &str, rules: &CompiledRules) -> Result<Extraction, ParseError> {
    if !looks_like_html(raw) {
        return Err(ParseError::NotHtml {
            excerpt: excerpt(raw, EXCERPT_CHARS),
        });
    }

    let document = Html::parse_document(raw);
    let mut extraction = Extraction::default();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for card in document.select(&rules.card) {
        let units: Vec<ElementRef<'_>> = match &rules.unit {
            Some(unit) => card.select(unit).collect(),
            None => vec![card],
        };

        if units.is_empty() {
            debug!("Card without units skipped");
        }

        for unit in units {
            let index = extraction.candidates;
            extraction.candidates += 1;

            match build_record(card, unit, rules) {
                Ok(record) => {
                    if seen_ids.insert(record.id.clone()) {
                        extraction.records.push(record);
                    } else {
                        warn!(index, id = %record.id, "Duplicate listing id on page");
                        extraction.warnings.push(ExtractionWarning::DuplicateId {
                            index,
                            id: record.id,
                        });
                    }
                }
                Err(field) => {
                    warn!(index, field, "Listing dropped: required field not found");
                    extraction
                        .warnings
                        .push(ExtractionWarning::MissingField { index, field });
                }
            }
        }
    }

    if extraction.candidates == 0 {
        debug!("No listing cards matched on page");
    }

    Ok(extraction)
}

/// Whether raw content is an HTML document
///
/// Only the leading part is inspected. JSON bodies, plain-text error pages and
/// empty responses are rejected.
pub fn looks_like_html(raw: &str) -> bool {
    let head: String = raw
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(4096)
        .collect::<String>()
        .to_ascii_lowercase();

    if !head.starts_with('<') {
        return false;
    }

    ["<!doctype html", "<html", "<head", "<body"]
        .iter()
        .any(|marker| head.contains(marker))
}

/// Build one record; on failure returns the name of the missing field
fn build_record(
    card: ElementRef<'_>,
    unit: ElementRef<'_>,
    rules: &CompiledRules,
) -> Result<ListingRecord, &'static str> {
    let href = find(unit, card, &rules.link)
        .and_then(|link| link.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .ok_or("id")?;

    let resolved = rules.resolve(href).ok_or("url")?;
    let id = rules.listing_id(href, &resolved).ok_or("id")?;

    let title = required_text(unit, card, &rules.title).ok_or("title")?;
    let price = required_text(unit, card, &rules.price).ok_or("price")?;
    let layout = required_text(unit, card, &rules.layout).ok_or("layout")?;

    let floor = rules
        .floor_pattern
        .as_ref()
        .and_then(|pattern| {
            let text = element_text(unit);
            pattern.find(&text).map(|m| m.as_str().to_string())
        })
        .unwrap_or_default();

    Ok(ListingRecord {
        id,
        url: resolved.to_string(),
        title,
        price,
        layout,
        area: optional_text(unit, card, rules.area.as_ref()),
        address: optional_text(unit, card, rules.address.as_ref()),
        station_access: optional_text(unit, card, rules.station_access.as_ref()),
        building_age: optional_text(unit, card, rules.building_age.as_ref()),
        floor,
    })
}

/// First match in the unit, then in the enclosing card
fn find<'a>(unit: ElementRef<'a>, card: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    unit.select(selector)
        .next()
        .or_else(|| card.select(selector).next())
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_field(&element.text().collect::<Vec<_>>().join(" "))
}

fn required_text(unit: ElementRef<'_>, card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    find(unit, card, selector)
        .map(element_text)
        .filter(|text| has_content(text))
}

fn optional_text(unit: ElementRef<'_>, card: ElementRef<'_>, selector: Option<&Selector>) -> String {
    selector
        .and_then(|s| find(unit, card, s))
        .map(element_text)
        .unwrap_or_default()
}
