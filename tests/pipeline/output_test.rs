//! The serialized result object.

use chrono::{DateTime, Utc};

use mailsift::pipeline::{ClassificationDebugData, ClassificationPipeline};
use mailsift::types::Message;

fn monday() -> DateTime<Utc> {
    match "2026-10-12T09:00:00Z".parse::<DateTime<Utc>>() {
        Ok(t) => t,
        Err(err) => panic!("reference date: {err}"),
    }
}

fn classify(message: &Message) -> ClassificationDebugData {
    match ClassificationPipeline::builtin() {
        Ok(pipeline) => pipeline.classify(message, monday()),
        Err(err) => panic!("built-in pipeline should load: {err}"),
    }
}

fn sample() -> Message {
    Message::new(
        "m-42",
        "School Office <office@school.example>",
        Some(monday()),
        "Please sign and return the permission slip for the field trip by Friday. \
         Your child Emma will need $15.00.",
    )
    .with_subject("Field trip permission slip")
}

#[test]
fn top_level_keys_are_camel_case() {
    let value = match serde_json::to_value(classify(&sample())) {
        Ok(value) => value,
        Err(err) => panic!("result should serialize: {err}"),
    };
    for key in [
        "debugInfo",
        "email",
        "intentClassification",
        "entityExtraction",
        "rulesEngine",
        "mailAdsClassification",
        "pipelineTrace",
        "finalClassification",
    ] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["finalClassification"]["type"], serde_json::json!("mail"));
    assert_eq!(
        value["finalClassification"]["intent"],
        serde_json::json!("education.permission.form")
    );
    assert_eq!(value["debugInfo"]["isMockData"], serde_json::json!(false));
    assert!(value["debugInfo"].get("warning").is_none());
    assert!(value["email"]["bodyLength"].as_u64().is_some());
}

#[test]
fn result_survives_a_json_round_trip() {
    let original = classify(&sample());
    let json = match serde_json::to_string(&original) {
        Ok(json) => json,
        Err(err) => panic!("result should serialize: {err}"),
    };
    let parsed: ClassificationDebugData = match serde_json::from_str(&json) {
        Ok(parsed) => parsed,
        Err(err) => panic!("result should deserialize: {err}"),
    };
    assert_eq!(parsed, original);
}

#[test]
fn permission_slip_offers_sign_form_first() {
    let result = classify(&sample());
    assert_eq!(
        result.final_classification.hpa.as_deref(),
        Some("sign_form")
    );
    assert_eq!(result.entity_extraction.entities.children, vec!["Emma"]);
    assert!(!result.rules_engine.suppressed);
}

#[test]
fn permission_slip_without_deadline_withholds_actions() {
    let message = Message::new(
        "m-43",
        "office@school.example",
        None,
        "Please sign and return the permission slip for the field trip.",
    );
    let result = classify(&message);
    assert_eq!(
        result.final_classification.intent,
        "education.permission.form"
    );
    assert!(result.rules_engine.suppressed);
    assert_eq!(
        result.entity_extraction.missing_required_entities,
        vec!["deadline"]
    );
    assert!(result.final_classification.suggested_actions.is_empty());
    assert!(result.final_classification.hpa.is_none());
}

#[test]
fn mock_marking_sets_the_warning() {
    let mut result = classify(&sample());
    result.mark_mock("intent service offline");
    assert!(result.debug_info.is_mock_data);
    assert_eq!(
        result.debug_info.warning.as_deref(),
        Some("intent service offline")
    );
}

#[test]
fn body_preview_is_bounded() {
    let message = Message::new("long", "a@example.com", None, "é".repeat(500));
    let result = classify(&message);
    assert_eq!(result.email.body_length, 500);
    assert_eq!(result.email.body_preview.chars().count(), 200);
}
