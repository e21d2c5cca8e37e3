//! Per-stage trace of one classification run.
//!
//! `PipelineTrace` owns its steps and errors. `total_time` and
//! `all_steps_successful` are computed from them on every call and on
//! serialization; deserialized values for those two fields are ignored.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The ten pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Input validation.
    SchemaCheck,
    /// Intent scoring.
    IntentClassification,
    /// Entity extraction.
    EntityExtraction,
    /// Action binding.
    RulesEngine,
    /// Mail-vs-ads decision.
    MailAdsDetection,
    /// Priority assignment.
    PriorityAssignment,
    /// High-priority action detection.
    HpaDetection,
    /// Urgency scoring.
    UrgencyScoring,
    /// Thread context enrichment.
    Enrichment,
    /// Output assembly.
    FinalOutput,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Stage; 10] = [
        Self::SchemaCheck,
        Self::IntentClassification,
        Self::EntityExtraction,
        Self::RulesEngine,
        Self::MailAdsDetection,
        Self::PriorityAssignment,
        Self::HpaDetection,
        Self::UrgencyScoring,
        Self::Enrichment,
        Self::FinalOutput,
    ];

    /// One-based position.
    pub fn ordinal(self) -> u32 {
        match self {
            Self::SchemaCheck => 1,
            Self::IntentClassification => 2,
            Self::EntityExtraction => 3,
            Self::RulesEngine => 4,
            Self::MailAdsDetection => 5,
            Self::PriorityAssignment => 6,
            Self::HpaDetection => 7,
            Self::UrgencyScoring => 8,
            Self::Enrichment => 9,
            Self::FinalOutput => 10,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaCheck => "schema-check",
            Self::IntentClassification => "intent-classification",
            Self::EntityExtraction => "entity-extraction",
            Self::RulesEngine => "rules-engine",
            Self::MailAdsDetection => "mail-ads-detection",
            Self::PriorityAssignment => "priority-assignment",
            Self::HpaDetection => "hpa-detection",
            Self::UrgencyScoring => "urgency-scoring",
            Self::Enrichment => "enrichment",
            Self::FinalOutput => "final-output",
        }
    }
}

/// Step outcome. Only `Failed` is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Produced a positive result.
    Success,
    /// Looked and found nothing.
    NotFound,
    /// Nothing matched.
    NoMatch,
    /// Not run.
    Skipped,
    /// Errored.
    Failed,
}

/// Tagged step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    /// Free text.
    Text(String),
    /// Boolean.
    Flag(bool),
    /// List of names.
    List(Vec<String>),
    /// A count.
    Count(usize),
    /// A numeric score.
    Score(f64),
    /// No result.
    None,
}

/// One recorded stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// One-based ordinal.
    pub step: u32,
    /// Stage name.
    pub name: Stage,
    /// Outcome.
    pub status: StepStatus,
    /// Elapsed milliseconds.
    pub time: f64,
    /// Stage result.
    pub result: StepResult,
    /// Human-readable reasoning lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Vec<String>>,
    /// Error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineStep {
    /// Step for `stage` with no reasoning or error.
    pub fn new(stage: Stage, status: StepStatus, time: f64, result: StepResult) -> Self {
        Self {
            step: stage.ordinal(),
            name: stage,
            status,
            time,
            result,
            reasoning: None,
            error: None,
        }
    }

    /// Attach reasoning lines. An empty list leaves the field unset.
    #[must_use]
    pub fn with_reasoning(mut self, lines: Vec<String>) -> Self {
        self.reasoning = (!lines.is_empty()).then_some(lines);
        self
    }

    /// Attach an error and mark the step failed.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self
    }
}

/// Ordered trace of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "TraceRepr", from = "TraceRepr")]
pub struct PipelineTrace {
    steps: Vec<PipelineStep>,
    errors: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceRepr {
    steps: Vec<PipelineStep>,
    #[serde(default)]
    total_time: f64,
    #[serde(default)]
    all_steps_successful: bool,
    #[serde(default)]
    errors: Vec<String>,
}

impl From<PipelineTrace> for TraceRepr {
    fn from(trace: PipelineTrace) -> Self {
        Self {
            total_time: trace.total_time(),
            all_steps_successful: trace.all_steps_successful(),
            steps: trace.steps,
            errors: trace.errors,
        }
    }
}

impl From<TraceRepr> for PipelineTrace {
    fn from(repr: TraceRepr) -> Self {
        Self {
            steps: repr.steps,
            errors: repr.errors,
        }
    }
}

impl PipelineTrace {
    /// Empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; its error, if any, is also collected into `errors`.
    pub fn push(&mut self, step: PipelineStep) {
        if let Some(error) = &step.error {
            self.errors.push(format!("{}: {error}", step.name.as_str()));
        }
        self.steps.push(step);
    }

    /// Record a pipeline-level error not tied to a step.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Steps in order.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Step errors and pipeline-level errors.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Step recorded for `stage`.
    pub fn step(&self, stage: Stage) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == stage)
    }

    /// Sum of step times in milliseconds.
    pub fn total_time(&self) -> f64 {
        self.steps.iter().map(|s| s.time).sum()
    }

    /// No failed step, no step error and no pipeline error.
    pub fn all_steps_successful(&self) -> bool {
        self.errors.is_empty()
            && self
                .steps
                .iter()
                .all(|s| s.status != StepStatus::Failed && s.error.is_none())
    }
}

/// Wall-clock timer for one stage.
#[derive(Debug, Clone, Copy)]
pub struct StepTimer(Instant);

impl StepTimer {
    /// Start timing.
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Elapsed milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.0.elapsed().as_secs_f64() * 1000.0
    }
}
