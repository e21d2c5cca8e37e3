//! Configuration loading and validation.
//!
//! Precedence is env > `config.toml` > defaults. Every section is optional;
//! a missing config file yields the defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Intent confidence thresholds.
    pub classifier: ClassifierConfig,
    /// Mail-vs-ads tuning.
    pub mail_ads: MailAdsConfig,
    /// Thread context tuning.
    pub thread: ThreadConfig,
    /// Pattern library location.
    pub patterns: PatternsConfig,
    /// Action registry location.
    pub actions: ActionsConfig,
    /// External intent service.
    pub service: ServiceConfig,
    /// Pipeline-level limits.
    pub pipeline: PipelineConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from `explicit`, else `$MAILSIFT_CONFIG_PATH`, else
    /// `<config_dir>/config.toml`, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or
    /// parsed, or if the result fails [`Config::validate`].
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(|key| std::env::var(key).ok())?,
        };
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config at {}", path.display()))
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or unknown value types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    fn config_path(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        if let Some(p) = env("MAILSIFT_CONFIG_PATH") {
            return Ok(PathBuf::from(p));
        }
        Ok(config_dir()?.join("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests need not touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("MAILSIFT_PATTERNS_PATH") {
            self.patterns.path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("MAILSIFT_ACTIONS_PATH") {
            self.actions.registry_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("MAILSIFT_SERVICE_URL") {
            self.service.url = Some(v);
        }
        if let Some(v) = env("MAILSIFT_SERVICE_TIMEOUT_MS") {
            match v.parse() {
                Ok(n) => self.service.timeout_ms = n,
                Err(_) => tracing::warn!(
                    var = "MAILSIFT_SERVICE_TIMEOUT_MS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MAILSIFT_PROMO_THRESHOLD") {
            match v.parse() {
                Ok(n) => self.mail_ads.promo_threshold = n,
                Err(_) => tracing::warn!(
                    var = "MAILSIFT_PROMO_THRESHOLD",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MAILSIFT_MIN_CONFIDENCE") {
            match v.parse() {
                Ok(n) => self.classifier.minimum_confidence = n,
                Err(_) => tracing::warn!(
                    var = "MAILSIFT_MIN_CONFIDENCE",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MAILSIFT_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Reject thresholds outside `[0, 1]`, inverted threshold pairs and
    /// zero counts or timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        for (name, value) in [
            ("classifier.minimum_confidence", c.minimum_confidence),
            ("classifier.high_confidence", c.high_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} must be within [0, 1], got {value}");
            }
        }
        if c.minimum_confidence > c.high_confidence {
            anyhow::bail!(
                "classifier.minimum_confidence ({}) exceeds high_confidence ({})",
                c.minimum_confidence,
                c.high_confidence
            );
        }
        if c.top_n == 0 {
            anyhow::bail!("classifier.top_n must be at least 1");
        }
        if self.mail_ads.promo_threshold == 0 {
            anyhow::bail!("mail_ads.promo_threshold must be at least 1");
        }
        if self.thread.keyword_overlap_cap == 0 {
            anyhow::bail!("thread.keyword_overlap_cap must be at least 1");
        }
        if self.service.timeout_ms == 0 {
            anyhow::bail!("service.timeout_ms must be positive");
        }
        Ok(())
    }
}

// ── Sections ────────────────────────────────────────────────────

/// Intent confidence thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Confidence an intent needs before it is acted on.
    pub minimum_confidence: f64,
    /// Confidence considered high.
    pub high_confidence: f64,
    /// Number of ranked intents reported.
    pub top_n: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            minimum_confidence: 0.30,
            high_confidence: 0.85,
            top_n: 3,
        }
    }
}

/// Mail-vs-ads tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailAdsConfig {
    /// Distinct promo keywords needed for the promo signal.
    pub promo_threshold: usize,
}

impl Default for MailAdsConfig {
    fn default() -> Self {
        Self { promo_threshold: 2 }
    }
}

/// Thread context tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Unresolved questions kept; the latest ones win.
    pub max_unresolved_questions: usize,
    /// Shortest question text considered.
    pub min_question_chars: usize,
    /// Cap on keyword overlap needed to resolve a question.
    pub keyword_overlap_cap: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            max_unresolved_questions: 3,
            min_question_chars: 10,
            keyword_overlap_cap: 3,
        }
    }
}

/// Pattern library location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// Library file; the built-in library when unset.
    pub path: Option<PathBuf>,
    /// Reload the file when it changes.
    pub watch: bool,
}

/// Action registry location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Registry file; the built-in registry when unset.
    pub registry_path: Option<PathBuf>,
}

/// External intent service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service endpoint; rule-based only when unset.
    pub url: Option<String>,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 2000,
        }
    }
}

/// Pipeline-level limits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whole-run timeout; none when unset.
    pub timeout_ms: Option<u64>,
}

/// Log output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs; console only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            dir: None,
        }
    }
}

/// Resolve the default config directory (`~/.mailsift/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".mailsift"))
}
