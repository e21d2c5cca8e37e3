//! Cross-message thread context: purchases, upcoming events, locations,
//! unresolved questions and the conversation stage.
//!
//! Every sub-extractor works message by message, so a message that yields
//! nothing only empties its own contribution.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::dates::parse_relative_date;
use super::entities::clean_identifier;
use super::{contains_word, context_window, parse_amount, to_cents};
use crate::config::ThreadConfig;
use crate::patterns::CompiledLibrary;
use crate::types::{ConversationStage, Message, Thread};

/// Characters of body text kept on each side of an event date.
const EVENT_CONTEXT_CHARS: usize = 40;

/// Shortest word counted as a question keyword.
const MIN_KEYWORD_LETTERS: usize = 4;

// ── Output types ────────────────────────────────────────────────

/// A purchase seen in the thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    /// Invoice, order, receipt or confirmation identifier.
    pub invoice_number: Option<String>,
    /// First currency amount in the message.
    pub amount: Option<f64>,
    /// Calendar day of the message.
    pub date: NaiveDate,
    /// Message the purchase was found in.
    pub message_id: String,
}

impl Purchase {
    /// Same invoice number, or same amount on the same day.
    pub fn same_as(&self, other: &Purchase) -> bool {
        let same_invoice = matches!(
            (&self.invoice_number, &other.invoice_number),
            (Some(a), Some(b)) if a == b
        );
        let same_amount_and_date = matches!(
            (self.amount, other.amount),
            (Some(a), Some(b)) if to_cents(a) == to_cents(b)
        ) && self.date == other.date;
        same_invoice || same_amount_and_date
    }
}

/// A date strictly after the run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingEvent {
    /// Resolved day, `yyyy-mm-dd`.
    pub date: NaiveDate,
    /// Phrase as written, plus `" at <time>"` when the message names a time.
    pub original_text: String,
    /// Surrounding body text.
    pub context: String,
    /// Message the date was found in.
    pub message_id: String,
}

/// An address and/or phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationHit {
    /// US street address.
    pub address: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Message the location was found in.
    pub message_id: String,
}

impl LocationHit {
    /// Same address, or same phone digits.
    pub fn same_as(&self, other: &LocationHit) -> bool {
        let same_address = matches!(
            (&self.address, &other.address),
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b)
        );
        let same_phone = matches!(
            (&self.phone, &other.phone),
            (Some(a), Some(b)) if phone_digits(a) == phone_digits(b)
        );
        same_address || same_phone
    }
}

/// A question no later message answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedQuestion {
    /// Question text including the `?`.
    pub question: String,
    /// Sender of the asking message.
    pub asked_by: String,
    /// When it was asked.
    pub date: Option<DateTime<Utc>>,
}

/// Everything [`ThreadContextExtractor::extract`] found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContext {
    /// Deduplicated purchases.
    pub purchases: Vec<Purchase>,
    /// Deduplicated future dates.
    pub upcoming_events: Vec<UpcomingEvent>,
    /// Deduplicated locations.
    pub locations: Vec<LocationHit>,
    /// Latest unanswered questions.
    pub unresolved_questions: Vec<UnresolvedQuestion>,
    /// Where the thread sits in a business process.
    pub conversation_stage: ConversationStage,
}

// ── Extractor ───────────────────────────────────────────────────

/// Thread extraction limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSettings {
    /// Unresolved questions kept.
    pub max_unresolved_questions: usize,
    /// Shortest question considered, in characters.
    pub min_question_chars: usize,
    /// Upper bound on the keyword overlap that resolves a question.
    pub keyword_overlap_cap: usize,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self::from(&ThreadConfig::default())
    }
}

impl From<&ThreadConfig> for ThreadSettings {
    fn from(config: &ThreadConfig) -> Self {
        Self {
            max_unresolved_questions: config.max_unresolved_questions,
            min_question_chars: config.min_question_chars,
            keyword_overlap_cap: config.keyword_overlap_cap,
        }
    }
}

/// Thread context extractor over one compiled library.
#[derive(Debug, Clone, Copy)]
pub struct ThreadContextExtractor<'a> {
    library: &'a CompiledLibrary,
    settings: ThreadSettings,
}

impl<'a> ThreadContextExtractor<'a> {
    /// Extractor using `library`'s patterns.
    pub fn new(library: &'a CompiledLibrary, settings: ThreadSettings) -> Self {
        Self { library, settings }
    }

    /// Extract all thread context. `now` is the run time.
    pub fn extract(&self, thread: &Thread, now: DateTime<Utc>) -> ThreadContext {
        let messages = &thread.messages;
        let context = ThreadContext {
            purchases: self.extract_purchases(messages, now),
            upcoming_events: self.extract_upcoming_events(messages, now),
            locations: self.extract_locations(messages),
            unresolved_questions: self.find_unresolved_questions(messages),
            conversation_stage: self.infer_conversation_stage(messages),
        };
        debug!(
            thread_id = %thread.id,
            messages = messages.len(),
            purchases = context.purchases.len(),
            events = context.upcoming_events.len(),
            locations = context.locations.len(),
            questions = context.unresolved_questions.len(),
            stage = context.conversation_stage.as_str(),
            "thread context extracted"
        );
        context
    }

    /// One purchase per message with an identifier or amount, deduplicated.
    ///
    /// A duplicate fills fields the first sighting lacked.
    pub fn extract_purchases(&self, messages: &[Message], now: DateTime<Utc>) -> Vec<Purchase> {
        let mut purchases: Vec<Purchase> = Vec::new();
        for message in messages {
            let text = message_text(message);
            let invoice_number = self
                .library
                .entities
                .invoice
                .captures_iter(&text)
                .filter_map(|caps| caps.get(1))
                .find_map(|m| clean_identifier(m.as_str()));
            let amount = self
                .library
                .entities
                .amount
                .find_iter(&text)
                .find_map(|m| parse_amount(m.as_str()));
            if invoice_number.is_none() && amount.is_none() {
                continue;
            }

            let candidate = Purchase {
                invoice_number,
                amount,
                date: message.timestamp_or(now).date_naive(),
                message_id: message.id.clone(),
            };
            match purchases.iter_mut().find(|p| p.same_as(&candidate)) {
                Some(existing) => {
                    if existing.invoice_number.is_none() {
                        existing.invoice_number = candidate.invoice_number;
                    }
                    if existing.amount.is_none() {
                        existing.amount = candidate.amount;
                    }
                }
                None => purchases.push(candidate),
            }
        }
        purchases
    }

    /// Dates strictly after `now`, resolved against each message's timestamp.
    pub fn extract_upcoming_events(
        &self,
        messages: &[Message],
        now: DateTime<Utc>,
    ) -> Vec<UpcomingEvent> {
        let mut events: Vec<UpcomingEvent> = Vec::new();
        for message in messages {
            let body = &message.body;
            let reference = message.timestamp_or(now);
            // First time token applies to every date in the message.
            let time = self
                .library
                .thread
                .time_of_day
                .captures(body)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_owned());

            let mut candidates: Vec<(usize, usize, &str)> = self
                .library
                .entities
                .date_candidates
                .iter()
                .flat_map(|re| re.find_iter(body).map(|m| (m.start(), m.end(), m.as_str())))
                .collect();
            candidates.sort_by_key(|(start, _, _)| *start);

            for (start, end, raw) in candidates {
                let Some(resolved) = parse_relative_date(raw, reference) else {
                    continue;
                };
                if resolved <= now {
                    continue;
                }
                let text = raw.trim();
                let original_text = match &time {
                    Some(t) => format!("{text} at {t}"),
                    None => text.to_owned(),
                };
                let date = resolved.date_naive();
                if events
                    .iter()
                    .any(|e| e.date == date && e.original_text == original_text)
                {
                    continue;
                }
                events.push(UpcomingEvent {
                    date,
                    original_text,
                    context: context_window(body, start, end, EVENT_CONTEXT_CHARS),
                    message_id: message.id.clone(),
                });
            }
        }
        events
    }

    /// First address and first phone per message, deduplicated.
    pub fn extract_locations(&self, messages: &[Message]) -> Vec<LocationHit> {
        let mut locations: Vec<LocationHit> = Vec::new();
        for message in messages {
            let text = message_text(message);
            let address = self
                .library
                .entities
                .address
                .find(&text)
                .map(|m| m.as_str().trim().trim_end_matches('.').to_owned());
            let phone = self
                .library
                .entities
                .phone
                .find(&text)
                .map(|m| m.as_str().trim().to_owned());
            if address.is_none() && phone.is_none() {
                continue;
            }

            let candidate = LocationHit {
                address,
                phone,
                message_id: message.id.clone(),
            };
            match locations.iter_mut().find(|l| l.same_as(&candidate)) {
                Some(existing) => {
                    if existing.address.is_none() {
                        existing.address = candidate.address;
                    }
                    if existing.phone.is_none() {
                        existing.phone = candidate.phone;
                    }
                }
                None => locations.push(candidate),
            }
        }
        locations
    }

    /// Questions no later message answers, keeping the latest few.
    ///
    /// A later message answers a question when it contains at least
    /// `min(keyword_overlap_cap, keyword count)` of the question's keywords.
    pub fn find_unresolved_questions(&self, messages: &[Message]) -> Vec<UnresolvedQuestion> {
        let mut unresolved = Vec::new();
        for (index, message) in messages.iter().enumerate() {
            let later = messages.get(index.saturating_add(1)..).unwrap_or(&[]);
            for found in self.library.thread.question.find_iter(&message.body) {
                let question = found.as_str().trim();
                if question.chars().count() < self.settings.min_question_chars {
                    continue;
                }
                let keywords = question_keywords(question);
                let needed = keywords.len().min(self.settings.keyword_overlap_cap);
                let answered = later.iter().any(|reply| {
                    let reply_lower = reply.body.to_lowercase();
                    let overlap = keywords
                        .iter()
                        .filter(|k| contains_word(&reply_lower, k))
                        .count();
                    overlap >= needed
                });
                if !answered {
                    unresolved.push(UnresolvedQuestion {
                        question: question.to_owned(),
                        asked_by: message.from.clone(),
                        date: message.date,
                    });
                }
            }
        }
        let excess = unresolved
            .len()
            .saturating_sub(self.settings.max_unresolved_questions);
        unresolved.drain(..excess);
        unresolved
    }

    /// First stage with a keyword appearing as a whole word in the
    /// lowercased bodies.
    pub fn infer_conversation_stage(&self, messages: &[Message]) -> ConversationStage {
        let text = messages
            .iter()
            .map(|m| m.body.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        self.library
            .thread
            .stages
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| contains_word(&text, k)))
            .map_or(ConversationStage::Inquiry, |(stage, _)| *stage)
    }
}

fn message_text(message: &Message) -> String {
    format!("{}\n{}", message.subject_text(), message.body)
}

/// Distinct lowercased words of at least four letters, in order.
fn question_keywords(question: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    question
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LETTERS)
        .map(str::to_lowercase)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn phone_digits(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    // Drop a leading US country code so "+1 555..." equals "555...".
    match digits.strip_prefix('1') {
        Some(rest) if rest.len() == 10 => rest.to_owned(),
        _ => digits,
    }
}
