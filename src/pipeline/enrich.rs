//! Thin enrichment stages: priority, high-priority action, urgency and
//! edge-case flags.

use serde::{Deserialize, Serialize};

use crate::classifier::{IntentClassification, MailAdsClassification, MailCategory};
use crate::extractors::{contains_word, ExtractedEntities};
use crate::patterns::CompiledLibrary;
use crate::rules::{RulesOutcome, SuggestedAction};
use crate::types::Message;

const DEADLINE_WEIGHT: f64 = 0.4;
const URGENT_DEADLINE_WEIGHT: f64 = 0.3;
const KEYWORD_WEIGHT: f64 = 0.1;
const KEYWORD_CAP: f64 = 0.3;
const URGENT_AT: f64 = 0.6;

/// Triage priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Act soon.
    High,
    /// Worth reading.
    Medium,
    /// Marketing or unclassified.
    Low,
}

impl Priority {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Urgency in `[0, 1]` with the factors that raised it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrgencyScore {
    /// Score in `[0, 1]`.
    pub score: f64,
    /// `score >= 0.6`.
    pub is_urgent: bool,
    /// What contributed.
    pub factors: Vec<String>,
}

impl UrgencyScore {
    /// Zero urgency.
    pub fn zero() -> Self {
        Self {
            score: 0.0,
            is_urgent: false,
            factors: Vec::new(),
        }
    }
}

/// Quirks of the message shape, reported for test triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCase {
    /// Subject under 10 characters.
    ShortSubject,
    /// Subject over 100 characters.
    LongSubject,
    /// Missing or placeholder subject.
    NoSubject,
    /// Subject longer than 10 characters with no common triage keyword.
    CreativeSubject,
    /// Non-ASCII characters in the subject.
    EmojiSubject,
    /// Body under 50 characters.
    ShortBody,
    /// Body over 5000 characters.
    LongBody,
}

const PLAIN_SUBJECT_MARKERS: [&str; 7] =
    ["order", "confirm", "ship", "sale", "meeting", "re:", "fwd:"];

/// Edge-case flags for `message`.
pub fn detect_edge_cases(message: &Message) -> Vec<EdgeCase> {
    let subject = message.subject_text();
    let subject_len = subject.chars().count();
    let body_len = message.body.chars().count();
    let lower = subject.to_lowercase();

    let mut flags = Vec::new();
    if subject_len < 10 {
        flags.push(EdgeCase::ShortSubject);
    }
    if subject_len > 100 {
        flags.push(EdgeCase::LongSubject);
    }
    if subject.trim().is_empty() || subject == "(No Subject)" {
        flags.push(EdgeCase::NoSubject);
    }
    if subject_len > 10 && !PLAIN_SUBJECT_MARKERS.iter().any(|m| lower.contains(m)) {
        flags.push(EdgeCase::CreativeSubject);
    }
    if !subject.is_ascii() {
        flags.push(EdgeCase::EmojiSubject);
    }
    if body_len < 50 {
        flags.push(EdgeCase::ShortBody);
    }
    if body_len > 5000 {
        flags.push(EdgeCase::LongBody);
    }
    flags
}

/// Urgency from the deadline and urgency keywords in `message`.
pub fn score_urgency(
    library: &CompiledLibrary,
    message: &Message,
    entities: &ExtractedEntities,
) -> UrgencyScore {
    let mut score = 0.0;
    let mut factors = Vec::new();
    if let Some(deadline) = &entities.deadline {
        score += DEADLINE_WEIGHT;
        factors.push(format!("deadline: {}", deadline.text));
        if deadline.is_urgent {
            score += URGENT_DEADLINE_WEIGHT;
            factors.push("deadline marked urgent".to_owned());
        }
    }

    let text = format!("{}\n{}", message.subject_text(), message.body).to_lowercase();
    let hits: Vec<&String> = library
        .urgency_keywords
        .iter()
        .filter(|k| contains_word(&text, k))
        .collect();
    let mut keyword_score = 0.0;
    for keyword in &hits {
        keyword_score += KEYWORD_WEIGHT;
        factors.push(format!("keyword: {keyword}"));
    }
    score += f64::min(keyword_score, KEYWORD_CAP);

    let score = score.clamp(0.0, 1.0);
    UrgencyScore {
        score,
        is_urgent: score >= URGENT_AT,
        factors,
    }
}

/// Priority with one reasoning line.
pub fn assign_priority(
    intent: &IntentClassification,
    mail_ads: &MailAdsClassification,
    urgency: &UrgencyScore,
) -> (Priority, String) {
    if mail_ads.final_category == MailCategory::Ads {
        return (Priority::Low, "advertising".to_owned());
    }
    if urgency.is_urgent {
        return (Priority::High, format!("urgent ({:.2})", urgency.score));
    }
    match intent.accepted() {
        Some(score) if intent.thresholds.current_is_high_confidence() => (
            Priority::High,
            format!("high-confidence intent {}", score.intent),
        ),
        Some(score) => (Priority::Medium, format!("intent {}", score.intent)),
        None => (Priority::Low, "no actionable intent".to_owned()),
    }
}

/// The validated primary action, if the message is mail and has one.
pub fn detect_hpa(mail_ads: &MailAdsClassification, rules: &RulesOutcome) -> Option<SuggestedAction> {
    if mail_ads.final_category == MailCategory::Ads {
        return None;
    }
    rules.primary_action().cloned()
}
