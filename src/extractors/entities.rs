//! Per-message entity extraction.
//!
//! Each entity type is extracted independently from the compiled library's
//! regexes. Every collection is deduplicated in order of first appearance.

use serde::{Deserialize, Serialize};

use super::{contains_word, parse_amount, push_unique, to_cents};
use crate::patterns::CompiledLibrary;
use crate::types::Message;

/// A deadline phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
    /// Matched phrase, e.g. `"due Friday"`.
    pub text: String,
    /// Whether any urgency keyword appears in the message.
    pub is_urgent: bool,
}

/// Prices found in the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prices {
    /// Original or regular price.
    pub original: Option<f64>,
    /// Sale price.
    pub sale: Option<f64>,
}

/// Everything [`EntityExtractor`] found. Absent entities are empty or `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntities {
    /// First deadline phrase.
    pub deadline: Option<Deadline>,
    /// Original and sale prices.
    pub prices: Prices,
    /// Known stores, canonical names.
    pub stores: Vec<String>,
    /// Child or student names.
    pub children: Vec<String>,
    /// Company names.
    pub companies: Vec<String>,
    /// Tracking numbers.
    pub tracking_numbers: Vec<String>,
    /// Raw date phrases.
    pub dates: Vec<String>,
    /// Currency amounts.
    pub amounts: Vec<f64>,
    /// Invoice, order or receipt identifiers.
    pub invoice_numbers: Vec<String>,
    /// Street addresses.
    pub addresses: Vec<String>,
    /// Phone numbers.
    pub phones: Vec<String>,
}

impl ExtractedEntities {
    /// Whether the named entity was found. Unknown names are never present.
    pub fn has(&self, entity: &str) -> bool {
        match entity {
            "deadline" => self.deadline.is_some(),
            "price" => self.prices.original.is_some() || self.prices.sale.is_some(),
            "store" => !self.stores.is_empty(),
            "child" => !self.children.is_empty(),
            "company" => !self.companies.is_empty(),
            "tracking" => !self.tracking_numbers.is_empty(),
            "date" => !self.dates.is_empty(),
            "amount" => !self.amounts.is_empty(),
            "invoice" => !self.invoice_numbers.is_empty(),
            "address" => !self.addresses.is_empty(),
            "phone" => !self.phones.is_empty(),
            _ => false,
        }
    }

    /// Names of found entity types, for trace output.
    pub fn found_types(&self) -> Vec<String> {
        crate::patterns::KNOWN_ENTITIES
            .iter()
            .filter(|name| self.has(name))
            .map(|name| (*name).to_owned())
            .collect()
    }
}

/// Required entity names absent from `entities`, in `required` order.
pub fn missing_required_entities(required: &[String], entities: &ExtractedEntities) -> Vec<String> {
    required
        .iter()
        .filter(|name| !entities.has(name))
        .cloned()
        .collect()
}

/// Entity extractor over one compiled library.
#[derive(Debug, Clone, Copy)]
pub struct EntityExtractor<'a> {
    library: &'a CompiledLibrary,
}

impl<'a> EntityExtractor<'a> {
    /// Extractor using `library`'s entity patterns.
    pub fn new(library: &'a CompiledLibrary) -> Self {
        Self { library }
    }

    /// Extract from `subject + "\n" + body`.
    pub fn extract_message(&self, message: &Message) -> ExtractedEntities {
        let text = format!("{}\n{}", message.subject_text(), message.body);
        self.extract(&text)
    }

    /// Extract from raw text.
    pub fn extract(&self, text: &str) -> ExtractedEntities {
        let lower = text.to_lowercase();
        let amounts = self.amounts(text);
        let sale = self.first_group_amount(&self.library.entities.sale_price, text);
        let original = self
            .first_group_amount(&self.library.entities.original_price, text)
            .or_else(|| {
                amounts
                    .iter()
                    .copied()
                    .find(|a| sale.is_none_or(|s| to_cents(s) != to_cents(*a)))
            });

        ExtractedEntities {
            deadline: self.deadline(text, &lower),
            prices: Prices { original, sale },
            stores: self.stores(&lower),
            children: first_groups(&self.library.entities.child, text),
            companies: first_groups(&self.library.entities.company, text),
            tracking_numbers: self.tracking_numbers(text),
            dates: self.dates(text),
            amounts,
            invoice_numbers: self.invoice_numbers(text),
            addresses: full_matches(&self.library.entities.address, text),
            phones: full_matches(&self.library.entities.phone, text),
        }
    }

    fn deadline(&self, text: &str, lower: &str) -> Option<Deadline> {
        let found = self.library.entities.deadline.find(text)?;
        let is_urgent = self
            .library
            .urgency_keywords
            .iter()
            .any(|k| contains_word(lower, k));
        Some(Deadline {
            text: found.as_str().trim().to_owned(),
            is_urgent,
        })
    }

    fn amounts(&self, text: &str) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();
        for m in self.library.entities.amount.find_iter(text) {
            if let Some(value) = parse_amount(m.as_str()) {
                if !out.iter().any(|v| to_cents(*v) == to_cents(value)) {
                    out.push(value);
                }
            }
        }
        out
    }

    fn first_group_amount(&self, regex: &regex::Regex, text: &str) -> Option<f64> {
        regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| parse_amount(m.as_str()))
    }

    fn stores(&self, lower: &str) -> Vec<String> {
        self.library
            .stores
            .iter()
            .filter(|store| contains_word(lower, &store.to_lowercase()))
            .cloned()
            .collect()
    }

    fn tracking_numbers(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for regex in &self.library.entities.tracking {
            for number in first_groups(regex, text) {
                push_unique(&mut out, number.to_uppercase());
            }
        }
        out
    }

    fn dates(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, &str)> = self
            .library
            .entities
            .date_candidates
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.as_str().trim())))
            .collect();
        hits.sort_by_key(|(start, _)| *start);
        let mut out = Vec::new();
        for (_, hit) in hits {
            push_unique(&mut out, hit.to_owned());
        }
        out
    }

    fn invoice_numbers(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for id in first_groups(&self.library.entities.invoice, text) {
            if let Some(clean) = clean_identifier(&id) {
                push_unique(&mut out, clean);
            }
        }
        out
    }
}

/// Trim stray dashes; identifiers shorter than 3 characters are noise.
pub(crate) fn clean_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches('-');
    (trimmed.chars().count() >= 3).then(|| trimmed.to_uppercase())
}

fn first_groups(regex: &regex::Regex, text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in regex.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push_unique(&mut out, m.as_str().trim().to_owned());
        }
    }
    out
}

fn full_matches(regex: &regex::Regex, text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in regex.find_iter(text) {
        let value = m.as_str().trim().trim_end_matches('.').to_owned();
        push_unique(&mut out, value);
    }
    out
}
