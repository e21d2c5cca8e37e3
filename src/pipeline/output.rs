//! `ClassificationDebugData`: the single JSON object one run produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enrich::{EdgeCase, Priority, UrgencyScore};
use super::trace::{PipelineStep, PipelineTrace, Stage, StepResult, StepStatus};
use crate::classifier::{
    ConfidenceThresholds, IntentClassification, IntentScore, MailAdsClassification, MailCategory,
    ThresholdReport,
};
use crate::extractors::{ExtractedEntities, ThreadContext};
use crate::rules::{RulesOutcome, SuggestedAction};
use crate::types::Message;

/// Characters of body shown in [`EmailSummary::body_preview`].
const PREVIEW_CHARS: usize = 200;

/// Run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    /// Unique run id.
    pub run_id: Uuid,
    /// Run time.
    pub generated_at: DateTime<Utc>,
    /// Pattern library version used.
    pub pattern_library_version: String,
    /// Part of the result is synthetic.
    pub is_mock_data: bool,
    /// Why the result is synthetic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Message shape quirks.
    pub edge_cases: Vec<EdgeCase>,
}

/// The classified message, summarised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    /// Message id.
    pub id: String,
    /// Raw sender.
    pub from: String,
    /// Subject.
    pub subject: Option<String>,
    /// Sent time.
    pub date: Option<DateTime<Utc>>,
    /// Leading body text.
    pub body_preview: String,
    /// Body length in characters.
    pub body_length: usize,
}

impl From<&Message> for EmailSummary {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            from: message.from.clone(),
            subject: message.subject.clone(),
            date: message.date,
            body_preview: message.body.chars().take(PREVIEW_CHARS).collect(),
            body_length: message.body.chars().count(),
        }
    }
}

/// Entities plus what the intent needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityExtractionReport {
    /// Extracted entities.
    pub entities: ExtractedEntities,
    /// Entities the accepted intent requires.
    pub required_entities: Vec<String>,
    /// Required entities not found.
    pub missing_required_entities: Vec<String>,
    /// Thread context, when a thread was classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_context: Option<ThreadContext>,
}

/// Headline answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalClassification {
    /// Mail or ads.
    #[serde(rename = "type")]
    pub category: MailCategory,
    /// Accepted intent id, `"none"` when nothing met the minimum.
    pub intent: String,
    /// Accepted intent confidence, 0 for `"none"`.
    pub confidence: f64,
    /// Triage priority.
    pub priority: Priority,
    /// High-priority action id.
    pub hpa: Option<String>,
    /// Urgency.
    pub urgency: UrgencyScore,
    /// Validated actions only.
    pub suggested_actions: Vec<SuggestedAction>,
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationDebugData {
    /// Run metadata.
    pub debug_info: DebugInfo,
    /// The message.
    pub email: EmailSummary,
    /// Intent scores.
    pub intent_classification: IntentClassification,
    /// Entities.
    pub entity_extraction: EntityExtractionReport,
    /// Action binding.
    pub rules_engine: RulesOutcome,
    /// Mail-vs-ads decision.
    pub mail_ads_classification: MailAdsClassification,
    /// Stage trace.
    pub pipeline_trace: PipelineTrace,
    /// Headline answer.
    pub final_classification: FinalClassification,
}

impl ClassificationDebugData {
    /// A well-formed result for a run that did not complete.
    ///
    /// Every stage is recorded as skipped. `error` is carried by
    /// `failed_stage` when given, else recorded as a pipeline error.
    pub fn failed(
        message: &Message,
        library_version: &str,
        thresholds: ConfidenceThresholds,
        now: DateTime<Utc>,
        failed_stage: Option<Stage>,
        error: &str,
    ) -> Self {
        let mut trace = PipelineTrace::new();
        for stage in Stage::ALL {
            let step = PipelineStep::new(stage, StepStatus::Skipped, 0.0, StepResult::None);
            if failed_stage == Some(stage) {
                trace.push(step.with_error(error));
            } else {
                trace.push(step);
            }
        }
        if failed_stage.is_none() {
            trace.record_error(error);
        }

        let top_intent = IntentScore::none();
        Self {
            debug_info: DebugInfo {
                run_id: Uuid::new_v4(),
                generated_at: now,
                pattern_library_version: library_version.to_owned(),
                is_mock_data: false,
                warning: None,
                edge_cases: Vec::new(),
            },
            email: EmailSummary::from(message),
            intent_classification: IntentClassification {
                intents: vec![top_intent.clone()],
                thresholds: ThresholdReport::evaluate(thresholds, top_intent.confidence),
                top_intent,
            },
            entity_extraction: EntityExtractionReport {
                entities: ExtractedEntities::default(),
                required_entities: Vec::new(),
                missing_required_entities: Vec::new(),
                thread_context: None,
            },
            rules_engine: RulesOutcome {
                matched_rule: false,
                suggested_actions: Vec::new(),
                action_validation: Vec::new(),
                missing_required_entities: Vec::new(),
                degraded: false,
                suppressed: false,
                reasoning: "not evaluated".to_owned(),
            },
            mail_ads_classification: MailAdsClassification::not_evaluated(error),
            pipeline_trace: trace,
            final_classification: FinalClassification {
                category: MailCategory::Mail,
                intent: crate::patterns::NO_INTENT.to_owned(),
                confidence: 0.0,
                priority: Priority::Low,
                hpa: None,
                urgency: UrgencyScore::zero(),
                suggested_actions: Vec::new(),
            },
        }
    }

    /// Mark the result as partly synthetic.
    pub fn mark_mock(&mut self, warning: impl Into<String>) {
        self.debug_info.is_mock_data = true;
        self.debug_info.warning = Some(warning.into());
    }
}
