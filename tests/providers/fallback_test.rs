//! Service failures degrade to the local classification.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mailsift::config::Config;
use mailsift::pipeline::ClassificationPipeline;
use mailsift::providers::{
    classify_with_fallback, IntentService, ServiceError, ServiceIntent, ServiceOutcome,
};
use mailsift::types::Message;

struct FixedService(ServiceIntent);

#[async_trait]
impl IntentService for FixedService {
    async fn classify(&self, _message: &Message) -> Result<ServiceIntent, ServiceError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

struct FailingService;

#[async_trait]
impl IntentService for FailingService {
    async fn classify(&self, _message: &Message) -> Result<ServiceIntent, ServiceError> {
        Err(ServiceError::Parse("schema drift".to_owned()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct SlowService;

#[async_trait]
impl IntentService for SlowService {
    async fn classify(&self, _message: &Message) -> Result<ServiceIntent, ServiceError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ServiceIntent {
            intent: "calendar.event".to_owned(),
            confidence: 1.0,
        })
    }

    fn name(&self) -> &str {
        "slow"
    }
}

fn monday() -> DateTime<Utc> {
    match "2026-10-12T09:00:00Z".parse::<DateTime<Utc>>() {
        Ok(t) => t,
        Err(err) => panic!("reference date: {err}"),
    }
}

fn pipeline() -> ClassificationPipeline {
    match ClassificationPipeline::builtin() {
        Ok(pipeline) => pipeline,
        Err(err) => panic!("built-in pipeline should load: {err}"),
    }
}

fn invoice() -> Message {
    Message::new(
        "m1",
        "billing@example.com",
        None,
        "Invoice attached. Payment due, amount due $30.00.",
    )
}

#[tokio::test]
async fn failing_service_falls_back_with_a_warning() {
    let outcome = classify_with_fallback(&FailingService, &invoice(), Duration::from_secs(1)).await;
    match outcome {
        ServiceOutcome::Fallback { warning } => {
            assert!(warning.contains("failing"));
            assert!(warning.contains("schema drift"));
        }
        ServiceOutcome::Remote(intent) => panic!("expected fallback, got {intent:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn slow_service_times_out() {
    let outcome =
        classify_with_fallback(&SlowService, &invoice(), Duration::from_millis(250)).await;
    match outcome {
        ServiceOutcome::Fallback { warning } => {
            assert!(warning.contains("timed out after 250 ms"));
        }
        ServiceOutcome::Remote(intent) => panic!("expected fallback, got {intent:?}"),
    }
}

#[tokio::test]
async fn fallback_keeps_the_local_result_and_marks_it_mock() {
    let result = pipeline()
        .classify_with_service(&invoice(), monday(), &FailingService)
        .await;
    assert!(result.debug_info.is_mock_data);
    assert!(result
        .debug_info
        .warning
        .as_deref()
        .is_some_and(|w| w.contains("local patterns")));
    assert_eq!(result.final_classification.intent, "finance.payment");
    assert!(result.pipeline_trace.all_steps_successful());
}

#[tokio::test]
async fn remote_intent_takes_the_top_slot() {
    let service = FixedService(ServiceIntent {
        intent: "calendar.event".to_owned(),
        confidence: 0.9,
    });
    let result = pipeline()
        .classify_with_service(&invoice(), monday(), &service)
        .await;

    assert!(!result.debug_info.is_mock_data);
    let intents: Vec<&str> = result
        .intent_classification
        .intents
        .iter()
        .map(|s| s.intent.as_str())
        .collect();
    assert_eq!(intents, vec!["calendar.event", "finance.payment"]);
    assert_eq!(result.final_classification.intent, "calendar.event");
    assert!(result
        .intent_classification
        .thresholds
        .current_is_high_confidence());
    assert_eq!(
        result.final_classification.hpa.as_deref(),
        Some("add_to_calendar")
    );
}

#[tokio::test]
async fn remote_intent_below_minimum_is_not_acted_on() {
    let mut config = Config::default();
    config.service.timeout_ms = 500;
    let pipeline = match ClassificationPipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(err) => panic!("pipeline should build: {err}"),
    };
    let service = FixedService(ServiceIntent {
        intent: "finance.payment".to_owned(),
        confidence: 0.1,
    });
    let result = pipeline
        .classify_with_service(&invoice(), monday(), &service)
        .await;
    assert_eq!(result.intent_classification.intents.len(), 1);
    assert!(!result.rules_engine.matched_rule);
    assert!(result.final_classification.hpa.is_none());
}
