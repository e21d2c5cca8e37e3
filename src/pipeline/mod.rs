//! Classification pipeline: runs the ten stages over one message and
//! assembles a [`ClassificationDebugData`].
//!
//! Every stage is timed and recorded in the [`PipelineTrace`]. A run never
//! returns an error; failures surface as failed steps or pipeline errors
//! inside an otherwise well-formed result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{
    ConfidenceThresholds, IntentClassification, IntentClassifier, IntentScore, MailAdsClassifier,
    ThresholdReport,
};
use crate::config::Config;
use crate::extractors::entities::missing_required_entities;
use crate::extractors::{EntityExtractor, ThreadContext, ThreadContextExtractor, ThreadSettings};
use crate::patterns::store::PatternStore;
use crate::patterns::CompiledLibrary;
use crate::providers::{classify_with_fallback, IntentService, ServiceIntent, ServiceOutcome};
use crate::rules::{ActionRegistry, RulesEngine, StaticActionRegistry};
use crate::types::{Message, Thread};

pub mod enrich;
pub mod output;
pub mod trace;

pub use enrich::{EdgeCase, Priority, UrgencyScore};
pub use output::{
    ClassificationDebugData, DebugInfo, EmailSummary, EntityExtractionReport, FinalClassification,
};
pub use trace::{PipelineStep, PipelineTrace, Stage, StepResult, StepStatus, StepTimer};

/// Tuning shared by every run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Intent confidence thresholds.
    pub thresholds: ConfidenceThresholds,
    /// Intents reported per run.
    pub top_n: usize,
    /// Promo keyword count that marks a message as ads.
    pub promo_threshold: usize,
    /// Thread context tuning.
    pub thread: ThreadSettings,
    /// Deadline for the external intent service.
    pub service_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            thresholds: ConfidenceThresholds::from(&config.classifier),
            top_n: config.classifier.top_n,
            promo_threshold: config.mail_ads.promo_threshold,
            thread: ThreadSettings::from(&config.thread),
            service_timeout: Duration::from_millis(config.service.timeout_ms),
        }
    }
}

/// The classification pipeline.
///
/// `Send + Sync`; share it behind an `Arc` for batch and timeout runs.
pub struct ClassificationPipeline {
    patterns: Arc<PatternStore>,
    registry: Arc<dyn ActionRegistry>,
    settings: PipelineSettings,
}

impl std::fmt::Debug for ClassificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationPipeline")
            .field("patterns", &self.patterns)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ClassificationPipeline {
    /// Pipeline over an explicit pattern store and registry.
    pub fn new(
        patterns: Arc<PatternStore>,
        registry: Arc<dyn ActionRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            patterns,
            registry,
            settings,
        }
    }

    /// Built-in pattern library and action registry with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in asset fails to load.
    pub fn builtin() -> anyhow::Result<Self> {
        let library = CompiledLibrary::builtin().context("built-in pattern library is invalid")?;
        let registry =
            StaticActionRegistry::builtin().context("built-in action registry is invalid")?;
        Ok(Self::new(
            Arc::new(PatternStore::fixed(library)),
            Arc::new(registry),
            PipelineSettings::default(),
        ))
    }

    /// Pipeline built from `config`: library and registry files when
    /// configured, built-ins otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured file cannot be loaded or the
    /// library watcher cannot start.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let patterns = match &config.patterns.path {
            Some(path) if config.patterns.watch => PatternStore::watch(path)
                .with_context(|| format!("failed to watch patterns at {}", path.display()))?,
            Some(path) => Arc::new(
                PatternStore::load(path)
                    .with_context(|| format!("failed to load patterns from {}", path.display()))?,
            ),
            None => Arc::new(PatternStore::fixed(
                CompiledLibrary::builtin().context("built-in pattern library is invalid")?,
            )),
        };
        let registry = match &config.actions.registry_path {
            Some(path) => StaticActionRegistry::from_path(path)
                .with_context(|| format!("failed to load actions from {}", path.display()))?,
            None => StaticActionRegistry::builtin().context("built-in action registry is invalid")?,
        };
        info!(
            version = %patterns.current().version,
            actions = registry.len(),
            "classification pipeline ready"
        );
        Ok(Self::new(
            patterns,
            Arc::new(registry),
            PipelineSettings::from(config),
        ))
    }

    /// Active settings.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The pattern store, for reloads.
    pub fn patterns(&self) -> &Arc<PatternStore> {
        &self.patterns
    }

    /// Classify one message. `now` is the run time.
    pub fn classify(&self, message: &Message, now: DateTime<Utc>) -> ClassificationDebugData {
        self.run(message, None, None, now)
    }

    /// Classify the last message of `thread` with the thread's context.
    pub fn classify_thread(&self, thread: &Thread, now: DateTime<Utc>) -> ClassificationDebugData {
        match thread.messages.last() {
            Some(last) => self.run(last, Some(thread), None, now),
            None => {
                let placeholder = Message::new(thread.id.clone(), "", None, "");
                self.failed(
                    &placeholder,
                    now,
                    Some(Stage::SchemaCheck),
                    &format!("thread {} has no messages", thread.id),
                )
            }
        }
    }

    /// Thread context only.
    pub fn extract_thread(&self, thread: &Thread, now: DateTime<Utc>) -> ThreadContext {
        let library = self.patterns.current();
        ThreadContextExtractor::new(&library, self.settings.thread).extract(thread, now)
    }

    /// Classify using `service` for the intent. On service failure the
    /// local result is kept and marked as synthetic.
    pub async fn classify_with_service(
        &self,
        message: &Message,
        now: DateTime<Utc>,
        service: &dyn IntentService,
    ) -> ClassificationDebugData {
        match classify_with_fallback(service, message, self.settings.service_timeout).await {
            ServiceOutcome::Remote(intent) => self.run(message, None, Some(&intent), now),
            ServiceOutcome::Fallback { warning } => {
                let mut result = self.run(message, None, None, now);
                result.mark_mock(warning);
                result
            }
        }
    }

    /// Classify `messages` concurrently, results in input order.
    ///
    /// A task that panics yields a failed result for its message.
    pub async fn classify_batch(
        self: Arc<Self>,
        messages: Vec<Message>,
        now: DateTime<Utc>,
    ) -> Vec<ClassificationDebugData> {
        let mut tasks = JoinSet::new();
        for (index, message) in messages.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self);
            tasks.spawn_blocking(move || (index, pipeline.classify(&message, now)));
        }

        let mut slots: Vec<Option<ClassificationDebugData>> = messages.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(e) => warn!(error = %e, "classification task failed"),
            }
        }

        debug!(messages = messages.len(), "batch classified");
        messages
            .iter()
            .zip(slots)
            .map(|(message, slot)| {
                slot.unwrap_or_else(|| self.failed(message, now, None, "classification task failed"))
            })
            .collect()
    }

    /// Extract context for `threads` concurrently, results in input order.
    ///
    /// A task that panics yields an empty context for its thread.
    pub async fn extract_threads_batch(
        self: Arc<Self>,
        threads: Vec<Thread>,
        now: DateTime<Utc>,
    ) -> Vec<ThreadContext> {
        let count = threads.len();
        let mut tasks = JoinSet::new();
        for (index, thread) in threads.into_iter().enumerate() {
            let pipeline = Arc::clone(&self);
            tasks.spawn_blocking(move || (index, pipeline.extract_thread(&thread, now)));
        }

        let mut slots: Vec<ThreadContext> = (0..count).map(|_| ThreadContext::default()).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, context)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = context;
                    }
                }
                Err(e) => warn!(error = %e, "thread extraction task failed"),
            }
        }
        slots
    }

    /// Classify with a deadline. On expiry the result is a failed trace
    /// carrying the timeout error.
    pub async fn classify_with_timeout(
        self: Arc<Self>,
        message: Message,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> ClassificationDebugData {
        let pipeline = Arc::clone(&self);
        let input = message.clone();
        let task = tokio::task::spawn_blocking(move || pipeline.classify(&input, now));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(message_id = %message.id, error = %e, "classification task failed");
                self.failed(&message, now, None, &format!("classification task failed: {e}"))
            }
            Err(_) => {
                let ms = timeout.as_millis();
                warn!(message_id = %message.id, timeout_ms = %ms, "classification timed out");
                self.failed(&message, now, None, &format!("classification timed out after {ms} ms"))
            }
        }
    }

    fn failed(
        &self,
        message: &Message,
        now: DateTime<Utc>,
        stage: Option<Stage>,
        error: &str,
    ) -> ClassificationDebugData {
        ClassificationDebugData::failed(
            message,
            &self.patterns.current().version,
            self.settings.thresholds,
            now,
            stage,
            error,
        )
    }

    fn run(
        &self,
        message: &Message,
        thread: Option<&Thread>,
        remote: Option<&ServiceIntent>,
        now: DateTime<Utc>,
    ) -> ClassificationDebugData {
        let library = self.patterns.current();
        let mut trace = PipelineTrace::new();

        // ── schema-check ──
        let timer = StepTimer::start();
        let edge_cases = enrich::detect_edge_cases(message);
        let mut lines = vec![
            format!("body: {} chars", message.body.chars().count()),
            format!(
                "date: {}",
                message.date.map_or_else(|| "missing".to_owned(), |d| d.to_rfc3339())
            ),
        ];
        if !edge_cases.is_empty() {
            lines.push(format!("edge cases: {edge_cases:?}"));
        }
        let valid = !message.id.trim().is_empty();
        let step = PipelineStep::new(
            Stage::SchemaCheck,
            StepStatus::Success,
            timer.elapsed_ms(),
            StepResult::Flag(valid),
        )
        .with_reasoning(lines);
        trace.push(if valid {
            step
        } else {
            step.with_error("message id is empty")
        });

        // ── intent-classification ──
        let timer = StepTimer::start();
        let local = IntentClassifier::new(&library, self.settings.thresholds, self.settings.top_n)
            .classify(message);
        let intent = match remote {
            Some(remote) => merge_remote(local, remote, self.settings.thresholds, self.settings.top_n),
            None => local,
        };
        let accepted = intent.accepted().map(|s| s.intent.clone());
        let mut lines: Vec<String> = intent
            .intents
            .iter()
            .map(|s| {
                format!(
                    "{}: score {:.2}, confidence {:.2}, {} match(es)",
                    s.intent,
                    s.score,
                    s.confidence,
                    s.matches.len()
                )
            })
            .collect();
        if remote.is_some() {
            lines.push("top intent supplied by intent service".to_owned());
        }
        lines.push(format!(
            "minimum {:.2} met: {}",
            intent.thresholds.minimum(),
            intent.thresholds.current_meets_minimum()
        ));
        trace.push(
            PipelineStep::new(
                Stage::IntentClassification,
                if accepted.is_some() {
                    StepStatus::Success
                } else {
                    StepStatus::NoMatch
                },
                timer.elapsed_ms(),
                StepResult::Text(intent.top_intent.intent.clone()),
            )
            .with_reasoning(lines),
        );

        // ── entity-extraction ──
        let timer = StepTimer::start();
        let entities = EntityExtractor::new(&library).extract_message(message);
        let required: Vec<String> = accepted
            .as_deref()
            .map(|id| library.required_entities(id).to_vec())
            .unwrap_or_default();
        let missing = missing_required_entities(&required, &entities);
        let found = entities.found_types();
        let mut lines = Vec::new();
        if !required.is_empty() {
            lines.push(format!("required: {}", required.join(", ")));
        }
        if !missing.is_empty() {
            lines.push(format!("missing: {}", missing.join(", ")));
        }
        trace.push(
            PipelineStep::new(
                Stage::EntityExtraction,
                if found.is_empty() {
                    StepStatus::NotFound
                } else {
                    StepStatus::Success
                },
                timer.elapsed_ms(),
                StepResult::List(found),
            )
            .with_reasoning(lines),
        );

        // ── rules-engine ──
        let timer = StepTimer::start();
        let rules = RulesEngine::new(&library, self.registry.as_ref())
            .evaluate(accepted.as_deref(), &missing);
        trace.push(
            PipelineStep::new(
                Stage::RulesEngine,
                if rules.matched_rule {
                    StepStatus::Success
                } else {
                    StepStatus::NoMatch
                },
                timer.elapsed_ms(),
                StepResult::Count(rules.actionable().len()),
            )
            .with_reasoning(vec![rules.reasoning.clone()]),
        );

        // ── mail-ads-detection ──
        let timer = StepTimer::start();
        let top = (!intent.top_intent.is_none()).then_some(&intent.top_intent);
        let mail_ads = MailAdsClassifier::new(
            &library,
            self.settings.promo_threshold,
            self.settings.thresholds.minimum,
        )
        .classify(message, top);
        trace.push(
            PipelineStep::new(
                Stage::MailAdsDetection,
                StepStatus::Success,
                timer.elapsed_ms(),
                StepResult::Text(mail_ads.final_category.as_str().to_owned()),
            )
            .with_reasoning(vec![mail_ads.reasoning.summary.clone()]),
        );

        // Urgency feeds priority; its step is recorded in stage order below.
        let urgency_timer = StepTimer::start();
        let urgency = enrich::score_urgency(&library, message, &entities);
        let urgency_ms = urgency_timer.elapsed_ms();

        // ── priority-assignment ──
        let timer = StepTimer::start();
        let (priority, why) = enrich::assign_priority(&intent, &mail_ads, &urgency);
        trace.push(
            PipelineStep::new(
                Stage::PriorityAssignment,
                StepStatus::Success,
                timer.elapsed_ms(),
                StepResult::Text(priority.as_str().to_owned()),
            )
            .with_reasoning(vec![why]),
        );

        // ── hpa-detection ──
        let timer = StepTimer::start();
        let hpa = enrich::detect_hpa(&mail_ads, &rules);
        trace.push(PipelineStep::new(
            Stage::HpaDetection,
            if hpa.is_some() {
                StepStatus::Success
            } else {
                StepStatus::NotFound
            },
            timer.elapsed_ms(),
            hpa.as_ref()
                .map_or(StepResult::None, |a| StepResult::Text(a.action_id.clone())),
        ));

        // ── urgency-scoring ──
        trace.push(
            PipelineStep::new(
                Stage::UrgencyScoring,
                StepStatus::Success,
                urgency_ms,
                StepResult::Score(urgency.score),
            )
            .with_reasoning(urgency.factors.clone()),
        );

        // ── enrichment ──
        let timer = StepTimer::start();
        let thread_context = thread.map(|t| {
            ThreadContextExtractor::new(&library, self.settings.thread).extract(t, now)
        });
        let step = match &thread_context {
            Some(context) => PipelineStep::new(
                Stage::Enrichment,
                StepStatus::Success,
                timer.elapsed_ms(),
                StepResult::Text(context.conversation_stage.as_str().to_owned()),
            )
            .with_reasoning(vec![format!(
                "{} purchase(s), {} event(s), {} location(s), {} open question(s)",
                context.purchases.len(),
                context.upcoming_events.len(),
                context.locations.len(),
                context.unresolved_questions.len()
            )]),
            None => PipelineStep::new(
                Stage::Enrichment,
                StepStatus::Skipped,
                timer.elapsed_ms(),
                StepResult::None,
            )
            .with_reasoning(vec!["no thread supplied".to_owned()]),
        };
        trace.push(step);

        // ── final-output ──
        let timer = StepTimer::start();
        let headline = intent.accepted().cloned().unwrap_or_else(IntentScore::none);
        let final_classification = FinalClassification {
            category: mail_ads.final_category,
            intent: headline.intent,
            confidence: headline.confidence,
            priority,
            hpa: hpa.map(|a| a.action_id),
            urgency,
            suggested_actions: rules.actionable().into_iter().cloned().collect(),
        };
        trace.push(PipelineStep::new(
            Stage::FinalOutput,
            StepStatus::Success,
            timer.elapsed_ms(),
            StepResult::Text(format!(
                "{}/{}",
                final_classification.category.as_str(),
                final_classification.intent
            )),
        ));

        debug!(
            message_id = %message.id,
            intent = %final_classification.intent,
            category = final_classification.category.as_str(),
            priority = final_classification.priority.as_str(),
            total_ms = trace.total_time(),
            "message classified"
        );

        ClassificationDebugData {
            debug_info: DebugInfo {
                run_id: Uuid::new_v4(),
                generated_at: now,
                pattern_library_version: library.version.clone(),
                is_mock_data: false,
                warning: None,
                edge_cases,
            },
            email: EmailSummary::from(message),
            entity_extraction: EntityExtractionReport {
                entities,
                required_entities: required,
                missing_required_entities: missing,
                thread_context,
            },
            intent_classification: intent,
            rules_engine: rules,
            mail_ads_classification: mail_ads,
            pipeline_trace: trace,
            final_classification,
        }
    }
}

/// Put the service's intent on top of the local ranking.
fn merge_remote(
    local: IntentClassification,
    remote: &ServiceIntent,
    thresholds: ConfidenceThresholds,
    top_n: usize,
) -> IntentClassification {
    let top_intent = IntentScore {
        intent: remote.intent.clone(),
        score: remote.confidence,
        confidence: remote.confidence,
        matches: Vec::new(),
    };
    let mut intents = vec![top_intent.clone()];
    intents.extend(
        local
            .intents
            .into_iter()
            .filter(|s| !s.is_none() && s.intent != remote.intent),
    );
    intents.truncate(top_n.max(1));
    IntentClassification {
        thresholds: ThresholdReport::evaluate(thresholds, top_intent.confidence),
        top_intent,
        intents,
    }
}
