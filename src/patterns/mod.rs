//! Versioned pattern library: every regex and keyword list the extractors
//! and classifiers consult.
//!
//! The library is pure data. [`PatternLibrary`] is the TOML shape;
//! [`PatternLibrary::compile`] validates it and produces a
//! [`CompiledLibrary`] with every regex compiled once. A library that fails
//! to parse, compile or validate is a startup error.
//!
//! Intent and marketing-sender patterns are compiled case-insensitively.
//! Entity and thread patterns are compiled exactly as written so that
//! capitalisation-sensitive patterns (names, companies) keep working.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConversationStage;

pub mod store;

/// The pattern library shipped with the crate.
pub const BUILTIN_LIBRARY: &str = include_str!("../../assets/patterns.toml");

/// Reserved intent id for "nothing matched".
pub const NO_INTENT: &str = "none";

/// Entity names an intent may list in `required_entities`.
pub const KNOWN_ENTITIES: [&str; 11] = [
    "deadline", "price", "store", "child", "company", "tracking", "date", "amount", "invoice",
    "address", "phone",
];

// ── Errors ──────────────────────────────────────────────────────

/// Pattern library loading and validation errors.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The library file could not be read.
    #[error("failed to read pattern library {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The library is not valid TOML for this schema.
    #[error("failed to parse pattern library: {0}")]
    Parse(#[from] toml::de::Error),
    /// A pattern failed to compile.
    #[error("invalid regex in {field} ({pattern}): {source}")]
    InvalidRegex {
        /// Where in the library the pattern lives.
        field: String,
        /// The offending pattern source.
        pattern: String,
        /// Regex compiler error.
        #[source]
        source: regex::Error,
    },
    /// The library parsed but is semantically invalid.
    #[error("invalid pattern library: {0}")]
    Invalid(String),
}

// ── Raw (TOML) shape ────────────────────────────────────────────

/// Pattern library as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternLibrary {
    /// Library version, reported in every classification run.
    pub version: String,
    /// Keywords that make a deadline urgent and raise the urgency score.
    #[serde(default)]
    pub urgency_keywords: Vec<String>,
    /// Known store names, reported with this capitalisation.
    #[serde(default)]
    pub stores: Vec<String>,
    /// Intent score normalisation.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Intent taxonomy with weighted patterns.
    pub intents: Vec<IntentDefinition>,
    /// Entity patterns.
    pub entities: EntityPatterns,
    /// Thread context patterns.
    pub thread: ThreadPatterns,
    /// Mail-vs-ads signal patterns.
    pub mail_ads: MailAdsPatterns,
    /// Intent to action mappings.
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// How raw intent scores map to confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score at which confidence saturates to 1.0.
    pub saturation: f64,
    /// Number of body characters treated as the snippet.
    pub snippet_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            saturation: 2.0,
            snippet_chars: 160,
        }
    }
}

/// One intent in the taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDefinition {
    /// Dotted intent id, e.g. `education.permission.form`.
    pub id: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// Whether this intent is itself marketing (feeds the intent-based ads signal).
    #[serde(default)]
    pub promotional: bool,
    /// Entity names the intent's actions need.
    #[serde(default)]
    pub required_entities: Vec<String>,
    /// Weighted patterns.
    pub patterns: Vec<IntentPatternDef>,
}

/// Which part of the message an intent pattern is tested against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternScope {
    /// Subject, then body, then snippet.
    #[default]
    Any,
    /// Subject line only.
    Subject,
    /// Body only.
    Body,
    /// Leading body snippet only.
    Snippet,
}

/// A weighted intent pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPatternDef {
    /// Regex source.
    pub pattern: String,
    /// Additive weight toward the intent score.
    pub weight: f64,
    /// Where to look.
    #[serde(default)]
    pub scope: PatternScope,
}

/// Entity extraction regexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPatterns {
    /// Deadline phrase; group 1 is the date phrase.
    pub deadline: String,
    /// Currency amount.
    pub amount: String,
    /// Original/regular price; group 1 is the amount.
    pub original_price: String,
    /// Sale price; group 1 is the amount.
    pub sale_price: String,
    /// Child name; group 1 is the name.
    pub child: String,
    /// Company name; group 1 is the name.
    pub company: String,
    /// Tracking number patterns; group 1 is the number.
    pub tracking: Vec<String>,
    /// Invoice/order identifier; group 1 is the identifier.
    pub invoice: String,
    /// US street address.
    pub address: String,
    /// Phone number.
    pub phone: String,
    /// Date candidate patterns (weekday, month-day, ISO, slash dates).
    pub date_candidates: Vec<String>,
}

/// Thread-level patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPatterns {
    /// Question-like substring ending in `?`.
    pub question: String,
    /// Time-of-day token; group 1 is the time.
    pub time_of_day: String,
    /// Conversation stage keyword sets.
    pub stages: Vec<StageKeywords>,
}

/// Keywords that identify one conversation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageKeywords {
    /// Stage these keywords indicate.
    pub stage: ConversationStage,
    /// Lowercase substrings.
    pub keywords: Vec<String>,
}

/// Mail-vs-ads signal patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailAdsPatterns {
    /// Header names whose presence marks bulk mail.
    pub unsubscribe_headers: Vec<String>,
    /// Unsubscribe link or footer phrase in the body.
    pub unsubscribe_link: String,
    /// Promotional keywords (substring match, case-insensitive).
    pub promo_keywords: Vec<String>,
    /// Sender address patterns for marketing senders.
    pub marketing_senders: Vec<String>,
}

/// Actions offered for one intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Intent id this rule applies to.
    pub intent: String,
    /// Offer nothing when required entities are missing.
    #[serde(default)]
    pub suppress_when_degraded: bool,
    /// Candidate actions.
    pub actions: Vec<ActionRuleDef>,
}

/// One candidate action inside a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRuleDef {
    /// Registry key.
    pub action_id: String,
    /// Label shown when the registry has none.
    pub display_name: String,
    /// Endpoint the action calls.
    pub endpoint: String,
    /// Whether this is the headline action.
    #[serde(default)]
    pub is_primary: bool,
    /// Ordering, lower first.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    100
}

impl PatternLibrary {
    /// Parse the built-in library.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Parse`] if the embedded file is malformed.
    pub fn builtin() -> Result<Self, PatternError> {
        Self::from_toml(BUILTIN_LIBRARY)
    }

    /// Parse a library from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Parse`] on invalid TOML or schema mismatch.
    pub fn from_toml(text: &str) -> Result<Self, PatternError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a library file.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Io`] or [`PatternError::Parse`].
    pub fn from_path(path: &Path) -> Result<Self, PatternError> {
        let text = std::fs::read_to_string(path).map_err(|source| PatternError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Validate and compile every pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidRegex`] for a pattern that does not
    /// compile and [`PatternError::Invalid`] for semantic problems (empty
    /// version, duplicate intents, non-positive weights, rules for unknown
    /// intents).
    pub fn compile(&self) -> Result<CompiledLibrary, PatternError> {
        self.validate()?;

        let intents = self
            .intents
            .iter()
            .map(compile_intent)
            .collect::<Result<Vec<_>, _>>()?;

        let e = &self.entities;
        let entities = CompiledEntityPatterns {
            deadline: exact("entities.deadline", &e.deadline)?,
            amount: exact("entities.amount", &e.amount)?,
            original_price: exact("entities.original_price", &e.original_price)?,
            sale_price: exact("entities.sale_price", &e.sale_price)?,
            child: exact("entities.child", &e.child)?,
            company: exact("entities.company", &e.company)?,
            tracking: e
                .tracking
                .iter()
                .map(|p| exact("entities.tracking", p))
                .collect::<Result<_, _>>()?,
            invoice: exact("entities.invoice", &e.invoice)?,
            address: exact("entities.address", &e.address)?,
            phone: exact("entities.phone", &e.phone)?,
            date_candidates: e
                .date_candidates
                .iter()
                .map(|p| exact("entities.date_candidates", p))
                .collect::<Result<_, _>>()?,
        };

        // Stage order is fixed by ConversationStage, not by table order.
        let mut stages: Vec<(ConversationStage, Vec<String>)> = self
            .thread
            .stages
            .iter()
            .map(|s| (s.stage, lowercase_all(&s.keywords)))
            .collect();
        stages.sort_by_key(|(stage, _)| *stage);

        let thread = CompiledThreadPatterns {
            question: exact("thread.question", &self.thread.question)?,
            time_of_day: exact("thread.time_of_day", &self.thread.time_of_day)?,
            stages,
        };

        let m = &self.mail_ads;
        let mail_ads = CompiledMailAdsPatterns {
            unsubscribe_headers: m.unsubscribe_headers.clone(),
            unsubscribe_link: exact("mail_ads.unsubscribe_link", &m.unsubscribe_link)?,
            promo_keywords: lowercase_all(&m.promo_keywords),
            marketing_senders: m
                .marketing_senders
                .iter()
                .map(|p| -> Result<(String, Regex), PatternError> {
                    Ok((p.clone(), insensitive("mail_ads.marketing_senders", p)?))
                })
                .collect::<Result<_, _>>()?,
        };

        let rules = self
            .rules
            .iter()
            .map(|r| (r.intent.clone(), r.clone()))
            .collect();

        Ok(CompiledLibrary {
            version: self.version.clone(),
            saturation: self.scoring.saturation,
            snippet_chars: self.scoring.snippet_chars,
            intents,
            entities,
            thread,
            mail_ads,
            rules,
            urgency_keywords: lowercase_all(&self.urgency_keywords),
            stores: self.stores.clone(),
        })
    }

    fn validate(&self) -> Result<(), PatternError> {
        if self.version.trim().is_empty() {
            return Err(PatternError::Invalid("version must not be empty".to_owned()));
        }
        if self.intents.is_empty() {
            return Err(PatternError::Invalid("at least one intent is required".to_owned()));
        }
        if !(self.scoring.saturation.is_finite() && self.scoring.saturation > 0.0) {
            return Err(PatternError::Invalid(format!(
                "scoring.saturation must be positive, got {}",
                self.scoring.saturation
            )));
        }

        let mut seen = HashSet::new();
        for intent in &self.intents {
            if intent.id == NO_INTENT {
                return Err(PatternError::Invalid(format!(
                    "intent id '{NO_INTENT}' is reserved"
                )));
            }
            if !seen.insert(intent.id.as_str()) {
                return Err(PatternError::Invalid(format!(
                    "duplicate intent id '{}'",
                    intent.id
                )));
            }
            if let Some(bad) = intent
                .patterns
                .iter()
                .find(|p| !(p.weight.is_finite() && p.weight > 0.0))
            {
                return Err(PatternError::Invalid(format!(
                    "intent '{}' pattern '{}' has non-positive weight {}",
                    intent.id, bad.pattern, bad.weight
                )));
            }
            if let Some(unknown) = intent
                .required_entities
                .iter()
                .find(|e| !KNOWN_ENTITIES.contains(&e.as_str()))
            {
                return Err(PatternError::Invalid(format!(
                    "intent '{}' requires unknown entity '{unknown}'",
                    intent.id
                )));
            }
        }

        let mut ruled = HashSet::new();
        for rule in &self.rules {
            if !seen.contains(rule.intent.as_str()) {
                return Err(PatternError::Invalid(format!(
                    "rule references unknown intent '{}'",
                    rule.intent
                )));
            }
            if !ruled.insert(rule.intent.as_str()) {
                return Err(PatternError::Invalid(format!(
                    "duplicate rule for intent '{}'",
                    rule.intent
                )));
            }
        }

        Ok(())
    }
}

// ── Compiled shape ──────────────────────────────────────────────

/// A validated library with compiled regexes. Shared read-only across runs.
#[derive(Debug, Clone)]
pub struct CompiledLibrary {
    /// Library version.
    pub version: String,
    /// Score at which confidence saturates.
    pub saturation: f64,
    /// Snippet length in characters.
    pub snippet_chars: usize,
    /// Intents in library order.
    pub intents: Vec<CompiledIntent>,
    /// Entity regexes.
    pub entities: CompiledEntityPatterns,
    /// Thread regexes and stage keywords.
    pub thread: CompiledThreadPatterns,
    /// Mail-vs-ads patterns.
    pub mail_ads: CompiledMailAdsPatterns,
    /// Rules keyed by intent id.
    pub rules: HashMap<String, RuleDefinition>,
    /// Lowercased urgency keywords.
    pub urgency_keywords: Vec<String>,
    /// Store directory.
    pub stores: Vec<String>,
}

impl CompiledLibrary {
    /// Parse and compile the built-in library.
    ///
    /// # Errors
    ///
    /// Propagates any [`PatternError`] from parsing or compiling.
    pub fn builtin() -> Result<Self, PatternError> {
        PatternLibrary::builtin()?.compile()
    }

    /// Load, parse and compile a library file.
    ///
    /// # Errors
    ///
    /// Propagates any [`PatternError`].
    pub fn from_path(path: &Path) -> Result<Self, PatternError> {
        PatternLibrary::from_path(path)?.compile()
    }

    /// Look up an intent by id.
    pub fn intent(&self, id: &str) -> Option<&CompiledIntent> {
        self.intents.iter().find(|i| i.id == id)
    }

    /// Entities required by an intent (empty for unknown intents).
    pub fn required_entities(&self, intent: &str) -> &[String] {
        self.intent(intent)
            .map(|i| i.required_entities.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the intent is flagged promotional.
    pub fn is_promotional(&self, intent: &str) -> bool {
        self.intent(intent).is_some_and(|i| i.promotional)
    }

    /// Rule for an intent, if any.
    pub fn rule_for(&self, intent: &str) -> Option<&RuleDefinition> {
        self.rules.get(intent)
    }
}

/// An intent with compiled patterns.
#[derive(Debug, Clone)]
pub struct CompiledIntent {
    /// Intent id.
    pub id: String,
    /// Feeds the intent-based ads signal.
    pub promotional: bool,
    /// Required entity names.
    pub required_entities: Vec<String>,
    /// Compiled weighted patterns.
    pub patterns: Vec<CompiledPattern>,
}

/// A compiled weighted pattern.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// Regex source as written in the library.
    pub source: String,
    /// Compiled regex.
    pub regex: Regex,
    /// Additive weight.
    pub weight: f64,
    /// Where to look.
    pub scope: PatternScope,
}

/// Compiled entity regexes.
#[derive(Debug, Clone)]
pub struct CompiledEntityPatterns {
    /// Deadline phrase.
    pub deadline: Regex,
    /// Currency amount.
    pub amount: Regex,
    /// Original price.
    pub original_price: Regex,
    /// Sale price.
    pub sale_price: Regex,
    /// Child name.
    pub child: Regex,
    /// Company name.
    pub company: Regex,
    /// Tracking numbers.
    pub tracking: Vec<Regex>,
    /// Invoice identifiers.
    pub invoice: Regex,
    /// Street addresses.
    pub address: Regex,
    /// Phone numbers.
    pub phone: Regex,
    /// Date candidates.
    pub date_candidates: Vec<Regex>,
}

/// Compiled thread patterns.
#[derive(Debug, Clone)]
pub struct CompiledThreadPatterns {
    /// Question substrings.
    pub question: Regex,
    /// Time-of-day tokens.
    pub time_of_day: Regex,
    /// Stage keywords in priority order.
    pub stages: Vec<(ConversationStage, Vec<String>)>,
}

/// Compiled mail-vs-ads patterns.
#[derive(Debug, Clone)]
pub struct CompiledMailAdsPatterns {
    /// Bulk-mail header names.
    pub unsubscribe_headers: Vec<String>,
    /// Unsubscribe link or phrase.
    pub unsubscribe_link: Regex,
    /// Lowercased promo keywords.
    pub promo_keywords: Vec<String>,
    /// Marketing sender patterns with their sources.
    pub marketing_senders: Vec<(String, Regex)>,
}

fn compile_intent(def: &IntentDefinition) -> Result<CompiledIntent, PatternError> {
    let field = format!("intents.{}", def.id);
    let patterns = def
        .patterns
        .iter()
        .map(|p| -> Result<CompiledPattern, PatternError> {
            Ok(CompiledPattern {
                source: p.pattern.clone(),
                regex: insensitive(&field, &p.pattern)?,
                weight: p.weight,
                scope: p.scope,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledIntent {
        id: def.id.clone(),
        promotional: def.promotional,
        required_entities: def.required_entities.clone(),
        patterns,
    })
}

fn exact(field: &str, pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|source| PatternError::InvalidRegex {
        field: field.to_owned(),
        pattern: pattern.to_owned(),
        source,
    })
}

fn insensitive(field: &str, pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::InvalidRegex {
            field: field.to_owned(),
            pattern: pattern.to_owned(),
            source,
        })
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}
