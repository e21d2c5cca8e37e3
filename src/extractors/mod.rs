//! Structured extractors: deterministic parsers over message text.
//!
//! Extractors output typed fields, never free text, and never fail. A
//! pattern that finds nothing yields an empty collection or `None`.
//!
//! - [`entities`]: per-message entities (deadlines, prices, stores, ...)
//! - [`thread`]:   cross-message context (purchases, events, questions, stage)
//! - [`dates`]:    relative date resolution shared by both

pub mod dates;
pub mod entities;
pub mod thread;

pub use entities::{Deadline, EntityExtractor, ExtractedEntities, Prices};
pub use thread::{
    LocationHit, Purchase, ThreadContext, ThreadContextExtractor, ThreadSettings,
    UnresolvedQuestion, UpcomingEvent,
};

/// Parse a currency amount such as `"$1,234.50"`.
///
/// Currency symbols, thousands separators and whitespace are stripped
/// first. Anything that still isn't a plain number yields `None`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Amount in whole cents, for equality comparisons.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Text surrounding `start..end`, `radius` characters on each side.
pub(crate) fn context_window(text: &str, start: usize, end: usize, radius: usize) -> String {
    let before: Vec<(usize, char)> = text[..start].char_indices().collect();
    let from = before
        .len()
        .checked_sub(radius)
        .and_then(|i| before.get(i))
        .map_or(0, |(i, _)| *i);
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end.saturating_add(i));
    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `needle` occurs in `haystack` as a whole word.
///
/// Word boundaries are only enforced at alphanumeric edges of `needle`,
/// so `"% off"` still matches inside `"50% off"`. Both arguments are
/// expected lowercased.
pub(crate) fn contains_word(haystack: &str, needle: &str) -> bool {
    let (Some(first), Some(last)) = (needle.chars().next(), needle.chars().next_back()) else {
        return false;
    };
    haystack.match_indices(needle).any(|(pos, matched)| {
        let before_ok = !first.is_alphanumeric()
            || haystack[..pos]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = !last.is_alphanumeric()
            || haystack[pos.saturating_add(matched.len())..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Push `value` unless an equal value is already present.
pub(crate) fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}
