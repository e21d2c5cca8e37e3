//! Classifiers: weighted intent scoring and the mail-vs-ads decision.

pub mod intent;
pub mod mail_ads;

pub use intent::{
    ConfidenceThresholds, IntentClassification, IntentClassifier, IntentScore, MatchLocation,
    PatternMatch, ThresholdReport,
};
pub use mail_ads::{MailAdsClassification, MailAdsClassifier, MailCategory, SignalConfidence, SignalKind};
