//! Listing extraction
//!
//! This module turns a fetched search-results page into an ordered list of
//! [`ListingRecord`]s. Field locations live in data ([`ExtractionRules`]) so a
//! markup change upstream is a config edit, not a code change.

pub mod html;
pub mod rules;
pub mod sanitize;

pub use html::{extract, looks_like_html, HtmlExtractor};
pub use rules::{CompiledRules, ExtractionRules, RuleSet};

use crate::models::ListingRecord;
use crate::utils::error::ParseError;

/// Page content to listing records
///
/// Implementations must be deterministic: the same content and rules always
/// give the same records in the same order.
pub trait Extractor: Send + Sync {
    /// Extract records from raw page content
    ///
    /// # Errors
    /// Returns a `ParseError` only when the page as a whole cannot be read.
    /// Per-item problems are reported as warnings on the [`Extraction`].
    fn extract(&self, raw: &str) -> Result<Extraction, ParseError>;
}

/// Result of extracting one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Complete records, in page order, ids unique
    pub records: Vec<ListingRecord>,

    /// Items that were located but not turned into records
    pub warnings: Vec<ExtractionWarning>,

    /// Number of candidate items located on the page
    pub candidates: usize,
}

impl Extraction {
    /// Candidate items that did not produce a record
    pub fn dropped(&self) -> usize {
        self.warnings.len()
    }
}

/// Per-item extraction problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionWarning {
    /// A required field could not be located
    MissingField { index: usize, field: &'static str },

    /// The id was already produced by an earlier item on the same page
    DuplicateId { index: usize, id: String },
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { index, field } => {
                write!(f, "item {index}: missing required field '{field}'")
            }
            Self::DuplicateId { index, id } => write!(f, "item {index}: duplicate id {id}"),
        }
    }
}
