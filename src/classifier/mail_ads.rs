//! Binary mail-vs-ads decision from four independent signals.
//!
//! Any single fired signal makes a message `ads`. Confidence is a fixed
//! per-signal policy rather than a numeric score:
//!
//! | signal                      | confidence |
//! |-----------------------------|------------|
//! | unsubscribe header          | high       |
//! | marketing sender            | high       |
//! | unsubscribe link in body    | medium     |
//! | promo keywords ≥ threshold  | medium     |
//! | promotional intent          | medium     |
//!
//! `mail` is high confidence only when nothing fired and no promo keyword
//! matched at all.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::intent::IntentScore;
use crate::extractors::contains_word;
use crate::patterns::CompiledLibrary;
use crate::types::Message;

/// Final category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailCategory {
    /// Personal or transactional correspondence.
    Mail,
    /// Marketing.
    Ads,
}

impl MailCategory {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Ads => "ads",
        }
    }
}

/// Policy confidence of a signal or decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalConfidence {
    /// Evidence is suggestive.
    Medium,
    /// Evidence is unambiguous.
    High,
}

/// The four signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    /// Unsubscribe header or link.
    UnsubscribeLink,
    /// Promotional keyword count.
    PromoKeywords,
    /// Marketing sender address.
    MarketingSender,
    /// Promotional intent.
    IntentBased,
}

/// Where the unsubscribe evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsubscribeSource {
    /// A bulk-mail header such as `List-Unsubscribe`.
    Header,
    /// An unsubscribe link or phrase in the body.
    Body,
}

/// Unsubscribe signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeSignal {
    /// Whether the signal fired.
    pub detected: bool,
    /// Header or body.
    pub source: Option<UnsubscribeSource>,
    /// Header name or matched body text.
    pub evidence: Option<String>,
}

/// Promo keyword signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoKeywordsSignal {
    /// Distinct keywords found.
    pub count: usize,
    /// Count needed to fire.
    pub threshold: usize,
    /// Keywords found, library order.
    pub matches: Vec<String>,
    /// `count >= threshold`.
    pub detected: bool,
}

/// Marketing sender signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingSenderSignal {
    /// Whether the signal fired.
    pub detected: bool,
    /// Bare sender address tested.
    pub sender: String,
    /// Pattern that matched.
    pub pattern: Option<String>,
}

/// Intent-based signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentSignal {
    /// Whether the signal fired.
    pub detected: bool,
    /// Intent consulted, if one was supplied.
    pub intent: Option<String>,
    /// Its confidence.
    pub confidence: Option<f64>,
    /// Whether the library flags it promotional.
    pub promotional: bool,
}

/// All four signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAdsSignals {
    /// Unsubscribe header or link.
    pub unsubscribe_link: UnsubscribeSignal,
    /// Promo keyword count.
    pub promo_keywords: PromoKeywordsSignal,
    /// Marketing sender.
    pub marketing_sender: MarketingSenderSignal,
    /// Promotional intent.
    pub intent_based: IntentSignal,
}

/// Audit record for one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalReasoning {
    /// Whether the signal fired.
    pub fired: bool,
    /// Policy confidence the signal carries.
    pub confidence: SignalConfidence,
    /// Human-readable explanation.
    pub explanation: String,
}

/// Per-signal reasoning plus the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAdsReasoning {
    /// Unsubscribe signal.
    pub unsubscribe_link: SignalReasoning,
    /// Promo keyword signal.
    pub promo_keywords: SignalReasoning,
    /// Marketing sender signal.
    pub marketing_sender: SignalReasoning,
    /// Intent signal.
    pub intent_based: SignalReasoning,
    /// Strongest fired signal.
    pub decided_by: Option<SignalKind>,
    /// One-line summary.
    pub summary: String,
}

/// Decision confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accuracy {
    /// High or medium.
    pub confidence: SignalConfidence,
    /// Signal the decision rests on.
    pub deciding_signal: Option<SignalKind>,
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAdsClassification {
    /// Mail or ads.
    pub final_category: MailCategory,
    /// Raw signals.
    pub signals: MailAdsSignals,
    /// Per-signal audit.
    pub reasoning: MailAdsReasoning,
    /// Decision confidence.
    pub accuracy: Accuracy,
}

impl MailAdsClassification {
    /// Placeholder for a run that never reached this stage.
    pub fn not_evaluated(reason: &str) -> Self {
        let idle = |explanation: &str| SignalReasoning {
            fired: false,
            confidence: SignalConfidence::Medium,
            explanation: explanation.to_owned(),
        };
        Self {
            final_category: MailCategory::Mail,
            signals: MailAdsSignals {
                unsubscribe_link: UnsubscribeSignal {
                    detected: false,
                    source: None,
                    evidence: None,
                },
                promo_keywords: PromoKeywordsSignal {
                    count: 0,
                    threshold: 0,
                    matches: Vec::new(),
                    detected: false,
                },
                marketing_sender: MarketingSenderSignal {
                    detected: false,
                    sender: String::new(),
                    pattern: None,
                },
                intent_based: IntentSignal {
                    detected: false,
                    intent: None,
                    confidence: None,
                    promotional: false,
                },
            },
            reasoning: MailAdsReasoning {
                unsubscribe_link: idle("not evaluated"),
                promo_keywords: idle("not evaluated"),
                marketing_sender: idle("not evaluated"),
                intent_based: idle("not evaluated"),
                decided_by: None,
                summary: format!("not evaluated: {reason}"),
            },
            accuracy: Accuracy {
                confidence: SignalConfidence::Medium,
                deciding_signal: None,
            },
        }
    }
}

/// Mail-vs-ads classifier over one compiled library.
#[derive(Debug, Clone, Copy)]
pub struct MailAdsClassifier<'a> {
    library: &'a CompiledLibrary,
    promo_threshold: usize,
    minimum_confidence: f64,
}

impl<'a> MailAdsClassifier<'a> {
    /// Classifier with a promo keyword threshold and the minimum intent
    /// confidence for the intent-based signal.
    pub fn new(library: &'a CompiledLibrary, promo_threshold: usize, minimum_confidence: f64) -> Self {
        Self {
            library,
            promo_threshold,
            minimum_confidence,
        }
    }

    /// Classify one message. `intent` may be absent.
    pub fn classify(&self, message: &Message, intent: Option<&IntentScore>) -> MailAdsClassification {
        let unsubscribe = self.unsubscribe_signal(message);
        let promo = self.promo_signal(message);
        let sender = self.sender_signal(message);
        let intent_signal = self.intent_signal(intent);

        let unsubscribe_reason = match (unsubscribe.source, &unsubscribe.evidence) {
            (Some(UnsubscribeSource::Header), Some(name)) => SignalReasoning {
                fired: true,
                confidence: SignalConfidence::High,
                explanation: format!("bulk-mail header {name} present"),
            },
            (Some(UnsubscribeSource::Body), Some(text)) => SignalReasoning {
                fired: true,
                confidence: SignalConfidence::Medium,
                explanation: format!("unsubscribe phrase in body: \"{text}\""),
            },
            _ => SignalReasoning {
                fired: false,
                confidence: SignalConfidence::Medium,
                explanation: "no unsubscribe header or link".to_owned(),
            },
        };
        let promo_reason = SignalReasoning {
            fired: promo.detected,
            confidence: SignalConfidence::Medium,
            explanation: format!(
                "{} promo keyword(s) matched, threshold {}",
                promo.count, promo.threshold
            ),
        };
        let sender_reason = SignalReasoning {
            fired: sender.detected,
            confidence: SignalConfidence::High,
            explanation: match &sender.pattern {
                Some(p) => format!("sender {} matches marketing pattern {p}", sender.sender),
                None => format!("sender {} matches no marketing pattern", sender.sender),
            },
        };
        let intent_reason = SignalReasoning {
            fired: intent_signal.detected,
            confidence: SignalConfidence::Medium,
            explanation: match (&intent_signal.intent, intent_signal.detected) {
                (None, _) => "no intent supplied".to_owned(),
                (Some(id), true) => format!("intent {id} is promotional"),
                (Some(id), false) if intent_signal.promotional => {
                    format!("intent {id} is promotional but below minimum confidence")
                }
                (Some(id), false) => format!("intent {id} is not promotional"),
            },
        };

        // First high-confidence signal, else the first that fired.
        let fired: Vec<(SignalKind, &SignalReasoning)> = [
            (SignalKind::UnsubscribeLink, &unsubscribe_reason),
            (SignalKind::MarketingSender, &sender_reason),
            (SignalKind::PromoKeywords, &promo_reason),
            (SignalKind::IntentBased, &intent_reason),
        ]
        .into_iter()
        .filter(|(_, r)| r.fired)
        .collect();
        let decided = fired
            .iter()
            .find(|(_, r)| r.confidence == SignalConfidence::High)
            .or_else(|| fired.first())
            .copied();

        let (final_category, accuracy, summary) = match decided {
            Some((kind, reason)) => (
                MailCategory::Ads,
                Accuracy {
                    confidence: reason.confidence,
                    deciding_signal: Some(kind),
                },
                format!("ads: {}", reason.explanation),
            ),
            None => {
                let confidence = if promo.count == 0 {
                    SignalConfidence::High
                } else {
                    SignalConfidence::Medium
                };
                (
                    MailCategory::Mail,
                    Accuracy {
                        confidence,
                        deciding_signal: None,
                    },
                    "mail: no advertising signal fired".to_owned(),
                )
            }
        };

        debug!(
            message_id = %message.id,
            category = ?final_category,
            deciding = ?accuracy.deciding_signal,
            "mail/ads classified"
        );

        MailAdsClassification {
            final_category,
            signals: MailAdsSignals {
                unsubscribe_link: unsubscribe,
                promo_keywords: promo,
                marketing_sender: sender,
                intent_based: intent_signal,
            },
            reasoning: MailAdsReasoning {
                unsubscribe_link: unsubscribe_reason,
                promo_keywords: promo_reason,
                marketing_sender: sender_reason,
                intent_based: intent_reason,
                decided_by: accuracy.deciding_signal,
                summary,
            },
            accuracy,
        }
    }

    fn unsubscribe_signal(&self, message: &Message) -> UnsubscribeSignal {
        let patterns = &self.library.mail_ads;
        if let Some(name) = patterns
            .unsubscribe_headers
            .iter()
            .find(|name| message.header(name).is_some())
        {
            return UnsubscribeSignal {
                detected: true,
                source: Some(UnsubscribeSource::Header),
                evidence: Some(name.clone()),
            };
        }
        match patterns.unsubscribe_link.find(&message.body) {
            Some(m) => UnsubscribeSignal {
                detected: true,
                source: Some(UnsubscribeSource::Body),
                evidence: Some(m.as_str().to_owned()),
            },
            None => UnsubscribeSignal {
                detected: false,
                source: None,
                evidence: None,
            },
        }
    }

    fn promo_signal(&self, message: &Message) -> PromoKeywordsSignal {
        let text = format!("{}\n{}", message.subject_text(), message.body).to_lowercase();
        let matches: Vec<String> = self
            .library
            .mail_ads
            .promo_keywords
            .iter()
            .filter(|k| contains_word(&text, k))
            .cloned()
            .collect();
        let count = matches.len();
        PromoKeywordsSignal {
            count,
            threshold: self.promo_threshold,
            matches,
            detected: count >= self.promo_threshold,
        }
    }

    fn sender_signal(&self, message: &Message) -> MarketingSenderSignal {
        let sender = message.sender_address();
        let pattern = self
            .library
            .mail_ads
            .marketing_senders
            .iter()
            .find(|(_, re)| re.is_match(&sender))
            .map(|(source, _)| source.clone());
        MarketingSenderSignal {
            detected: pattern.is_some(),
            sender,
            pattern,
        }
    }

    fn intent_signal(&self, intent: Option<&IntentScore>) -> IntentSignal {
        let Some(score) = intent.filter(|s| !s.is_none()) else {
            return IntentSignal {
                detected: false,
                intent: None,
                confidence: None,
                promotional: false,
            };
        };
        let promotional = self.library.is_promotional(&score.intent);
        IntentSignal {
            detected: promotional && score.confidence >= self.minimum_confidence,
            intent: Some(score.intent.clone()),
            confidence: Some(score.confidence),
            promotional,
        }
    }
}
