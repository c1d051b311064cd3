//! Text cleanup for extracted listing fields
//!
//! Field text comes out of table cells and list items with layout whitespace,
//! non-breaking spaces and the odd invisible character. Everything is folded
//! into a single display line.

use crate::utils::normalize_whitespace;

/// No-break, ideographic and separator spaces, read as a plain space
const SPACE_LIKE: [char; 5] = ['\u{00A0}', '\u{2028}', '\u{2029}', '\u{202F}', '\u{3000}'];

/// Clean one field value into a single line
///
/// # Examples
///
/// ```
/// use madori::parser::sanitize::clean_field;
///
/// let raw = "\n  8.5万円\u{00A0}\u{200B}\n ";
/// assert_eq!(clean_field(raw), "8.5万円");
/// ```
pub fn clean_field(text: &str) -> String {
    let visible = remove_invisible(text);
    normalize_whitespace(&visible.replace(SPACE_LIKE, " "))
}

/// Remove zero-width, bidi formatting and control characters
///
/// Newlines and tabs are kept so whitespace normalization can fold them.
pub fn remove_invisible(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(*c,
                '\u{200B}'..='\u{200F}' |
                '\u{202A}'..='\u{202E}' |
                '\u{FEFF}'
            )
        })
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Whether a cleaned value carries anything to display
pub fn has_content(text: &str) -> bool {
    !text.trim().is_empty()
}
