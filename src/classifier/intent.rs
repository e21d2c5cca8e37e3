//! Weighted-pattern intent scoring.
//!
//! Each intent's score is the sum of the weights of its patterns that
//! matched. A pattern contributes once, at the first location it matches.
//! Confidence is the score normalised by the library's saturation point.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::patterns::{CompiledIntent, CompiledLibrary, PatternScope, NO_INTENT};
use crate::types::Message;

/// Where a pattern matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLocation {
    /// Subject line.
    Subject,
    /// Message body.
    Body,
    /// Leading body snippet.
    Snippet,
}

/// One matched pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    /// Pattern source.
    pub pattern: String,
    /// Where it matched.
    pub location: MatchLocation,
    /// Weight contributed.
    pub weight: f64,
}

/// Score for one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentScore {
    /// Intent id, or `"none"`.
    pub intent: String,
    /// Sum of matched weights.
    pub score: f64,
    /// `score / saturation`, capped at 1.
    pub confidence: f64,
    /// Matched patterns.
    pub matches: Vec<PatternMatch>,
}

impl IntentScore {
    /// The zero-confidence "no intent" result.
    pub fn none() -> Self {
        Self {
            intent: NO_INTENT.to_owned(),
            score: 0.0,
            confidence: 0.0,
            matches: Vec::new(),
        }
    }

    /// Whether this is the "no intent" result.
    pub fn is_none(&self) -> bool {
        self.intent == NO_INTENT
    }
}

/// Minimum and high confidence levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceThresholds {
    /// An intent below this is not acted on.
    pub minimum: f64,
    /// An intent at or above this is high confidence.
    pub high_confidence: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            minimum: 0.30,
            high_confidence: 0.85,
        }
    }
}

impl From<&ClassifierConfig> for ConfidenceThresholds {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            minimum: config.minimum_confidence,
            high_confidence: config.high_confidence,
        }
    }
}

/// Thresholds applied to one confidence value.
///
/// The two flags are derived at construction and recomputed on
/// deserialization; they cannot disagree with `confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ThresholdReportRepr")]
pub struct ThresholdReport {
    confidence: f64,
    minimum: f64,
    high_confidence: f64,
    current_meets_minimum: bool,
    current_is_high_confidence: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThresholdReportRepr {
    confidence: f64,
    minimum: f64,
    high_confidence: f64,
}

impl From<ThresholdReportRepr> for ThresholdReport {
    fn from(repr: ThresholdReportRepr) -> Self {
        Self::evaluate(
            ConfidenceThresholds {
                minimum: repr.minimum,
                high_confidence: repr.high_confidence,
            },
            repr.confidence,
        )
    }
}

impl ThresholdReport {
    /// Apply `thresholds` to `confidence`.
    pub fn evaluate(thresholds: ConfidenceThresholds, confidence: f64) -> Self {
        Self {
            confidence,
            minimum: thresholds.minimum,
            high_confidence: thresholds.high_confidence,
            current_meets_minimum: confidence >= thresholds.minimum,
            current_is_high_confidence: confidence >= thresholds.high_confidence,
        }
    }

    /// Confidence the report was built from.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Minimum threshold.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// High confidence threshold.
    pub fn high_confidence(&self) -> f64 {
        self.high_confidence
    }

    /// `confidence >= minimum`.
    pub fn current_meets_minimum(&self) -> bool {
        self.current_meets_minimum
    }

    /// `confidence >= high_confidence`.
    pub fn current_is_high_confidence(&self) -> bool {
        self.current_is_high_confidence
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassification {
    /// Best intent; [`IntentScore::none`] when nothing matched.
    pub top_intent: IntentScore,
    /// Top-N intents by score, never empty.
    pub intents: Vec<IntentScore>,
    /// Thresholds applied to the top intent.
    pub thresholds: ThresholdReport,
}

impl IntentClassification {
    /// The top intent when it is real and meets the minimum.
    pub fn accepted(&self) -> Option<&IntentScore> {
        (!self.top_intent.is_none() && self.thresholds.current_meets_minimum())
            .then_some(&self.top_intent)
    }
}

/// Intent classifier over one compiled library.
#[derive(Debug, Clone, Copy)]
pub struct IntentClassifier<'a> {
    library: &'a CompiledLibrary,
    thresholds: ConfidenceThresholds,
    top_n: usize,
}

impl<'a> IntentClassifier<'a> {
    /// Classifier with explicit thresholds and result count.
    pub fn new(library: &'a CompiledLibrary, thresholds: ConfidenceThresholds, top_n: usize) -> Self {
        Self {
            library,
            thresholds,
            top_n: top_n.max(1),
        }
    }

    /// Score every intent and rank the ones that matched.
    pub fn classify(&self, message: &Message) -> IntentClassification {
        let subject = message.subject_text();
        let body = message.body.as_str();
        let snippet = snippet(body, self.library.snippet_chars);

        let mut scored: Vec<IntentScore> = self
            .library
            .intents
            .iter()
            .map(|intent| self.score_intent(intent, subject, body, snippet))
            .filter(|s| s.score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.intent.cmp(&b.intent))
        });
        scored.truncate(self.top_n);
        if scored.is_empty() {
            scored.push(IntentScore::none());
        }

        let top_intent = scored.first().cloned().unwrap_or_else(IntentScore::none);
        let thresholds = ThresholdReport::evaluate(self.thresholds, top_intent.confidence);
        debug!(
            message_id = %message.id,
            intent = %top_intent.intent,
            confidence = top_intent.confidence,
            meets_minimum = thresholds.current_meets_minimum(),
            "intent classified"
        );
        IntentClassification {
            top_intent,
            intents: scored,
            thresholds,
        }
    }

    fn score_intent(
        &self,
        intent: &CompiledIntent,
        subject: &str,
        body: &str,
        snippet: &str,
    ) -> IntentScore {
        let mut matches = Vec::new();
        for pattern in &intent.patterns {
            let locations: Vec<(MatchLocation, &str)> = match pattern.scope {
                PatternScope::Any => vec![
                    (MatchLocation::Subject, subject),
                    (MatchLocation::Body, body),
                    (MatchLocation::Snippet, snippet),
                ],
                PatternScope::Subject => vec![(MatchLocation::Subject, subject)],
                PatternScope::Body => vec![(MatchLocation::Body, body)],
                PatternScope::Snippet => vec![(MatchLocation::Snippet, snippet)],
            };
            if let Some((location, _)) = locations
                .iter()
                .find(|(_, text)| pattern.regex.is_match(text))
            {
                matches.push(PatternMatch {
                    pattern: pattern.source.clone(),
                    location: *location,
                    weight: pattern.weight,
                });
            }
        }

        let score: f64 = matches.iter().map(|m| m.weight).sum();
        IntentScore {
            intent: intent.id.clone(),
            score,
            confidence: (score / self.library.saturation).min(1.0),
            matches,
        }
    }
}

/// First `chars` characters of `body`.
fn snippet(body: &str, chars: usize) -> &str {
    body.char_indices()
        .nth(chars)
        .map_or(body, |(end, _)| &body[..end])
}
