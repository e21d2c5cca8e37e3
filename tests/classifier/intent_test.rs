//! Weighted intent scoring against the built-in library.

use mailsift::classifier::{
    ConfidenceThresholds, IntentClassifier, MatchLocation, ThresholdReport,
};
use mailsift::patterns::CompiledLibrary;
use mailsift::types::Message;

fn library() -> CompiledLibrary {
    match CompiledLibrary::builtin() {
        Ok(library) => library,
        Err(err) => panic!("built-in library should compile: {err}"),
    }
}

fn message(subject: &str, body: &str) -> Message {
    Message::new("m1", "sender@example.com", None, body).with_subject(subject)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn unmatched_message_yields_none_intent() {
    let library = library();
    let classifier = IntentClassifier::new(&library, ConfidenceThresholds::default(), 3);
    let result = classifier.classify(&message("Hi", "Hope you are well."));

    assert!(result.top_intent.is_none());
    assert_eq!(result.top_intent.intent, "none");
    assert!(approx(result.top_intent.confidence, 0.0));
    assert_eq!(result.intents.len(), 1);
    assert!(!result.thresholds.current_meets_minimum());
    assert!(result.accepted().is_none());
}

#[test]
fn matched_weights_sum_and_confidence_saturates() {
    let library = library();
    let classifier = IntentClassifier::new(&library, ConfidenceThresholds::default(), 3);
    let result = classifier.classify(&message(
        "Your bill",
        "Invoice attached. Payment due Friday, amount due $40.",
    ));

    assert_eq!(result.top_intent.intent, "finance.payment");
    assert!(approx(result.top_intent.score, 2.8));
    assert!(approx(result.top_intent.confidence, 1.0));
    assert_eq!(result.top_intent.matches.len(), 4);
    assert!(result.thresholds.current_is_high_confidence());
    assert_eq!(
        result.accepted().map(|s| s.intent.as_str()),
        Some("finance.payment")
    );
}

#[test]
fn intents_rank_by_score_and_truncate_to_top_n() {
    let library = library();
    let msg = message(
        "Flight and hotel",
        "Your flight to Lisbon and hotel reservation are booked.",
    );

    let ranked = IntentClassifier::new(&library, ConfidenceThresholds::default(), 3).classify(&msg);
    let ids: Vec<&str> = ranked.intents.iter().map(|s| s.intent.as_str()).collect();
    assert_eq!(ids, vec!["travel.hotel", "travel.flight"]);
    assert!(approx(ranked.intents[0].confidence, 0.65));
    assert!(approx(ranked.intents[1].confidence, 0.35));

    let top_one = IntentClassifier::new(&library, ConfidenceThresholds::default(), 1).classify(&msg);
    assert_eq!(top_one.intents.len(), 1);
    assert_eq!(top_one.top_intent.intent, "travel.hotel");
}

#[test]
fn equal_scores_order_by_intent_id() {
    let library = library();
    let result = IntentClassifier::new(&library, ConfidenceThresholds::default(), 3)
        .classify(&message("", "Someone liked your newsletter"));
    let ids: Vec<&str> = result.intents.iter().map(|s| s.intent.as_str()).collect();
    assert_eq!(ids, vec!["content.newsletter", "social.notification"]);
}

#[test]
fn pattern_scope_limits_where_a_pattern_can_match() {
    let library = library();
    let classifier = IntentClassifier::new(&library, ConfidenceThresholds::default(), 3);

    let misplaced = classifier.classify(&message("Shop now", "Great deals inside."));
    assert!(misplaced.top_intent.is_none());

    let placed = classifier.classify(&message("Deals", "Shop now and save."));
    assert_eq!(placed.top_intent.intent, "marketing.promotion");
    assert!(approx(placed.top_intent.score, 1.0));
    let locations: Vec<MatchLocation> = placed
        .top_intent
        .matches
        .iter()
        .map(|m| m.location)
        .collect();
    assert!(locations.contains(&MatchLocation::Body));
    assert!(locations.contains(&MatchLocation::Subject));
}

#[test]
fn a_pattern_counts_once_at_its_first_location() {
    let library = library();
    let result = IntentClassifier::new(&library, ConfidenceThresholds::default(), 3)
        .classify(&message("Hotel", "Your hotel is ready. The hotel lobby opens at 8."));
    assert_eq!(result.top_intent.intent, "travel.hotel");
    assert_eq!(result.top_intent.matches.len(), 1);
    assert_eq!(result.top_intent.matches[0].location, MatchLocation::Subject);
    assert!(approx(result.top_intent.score, 0.7));
}

#[test]
fn low_confidence_intent_is_reported_but_not_accepted() {
    let library = library();
    let result = IntentClassifier::new(&library, ConfidenceThresholds::default(), 3)
        .classify(&message("", "Follow the airport signage."));
    assert_eq!(result.top_intent.intent, "travel.flight");
    assert!(approx(result.top_intent.confidence, 0.2));
    assert!(!result.thresholds.current_meets_minimum());
    assert!(result.accepted().is_none());
}

#[test]
fn custom_thresholds_change_the_flags() {
    let library = library();
    let strict = ConfidenceThresholds {
        minimum: 0.7,
        high_confidence: 0.9,
    };
    let result = IntentClassifier::new(&library, strict, 3)
        .classify(&message("Flight and hotel", "Hotel reservation confirmed."));
    assert_eq!(result.top_intent.intent, "travel.hotel");
    assert!(approx(result.top_intent.confidence, 0.65));
    assert!(!result.thresholds.current_meets_minimum());
    assert!(approx(result.thresholds.minimum(), 0.7));
}

#[test]
fn threshold_flags_are_recomputed_on_deserialize() {
    let json = r#"{
        "confidence": 0.9,
        "minimum": 0.3,
        "highConfidence": 0.85,
        "currentMeetsMinimum": false,
        "currentIsHighConfidence": false
    }"#;
    let report: ThresholdReport = match serde_json::from_str(json) {
        Ok(report) => report,
        Err(err) => panic!("report should deserialize: {err}"),
    };
    assert!(report.current_meets_minimum());
    assert!(report.current_is_high_confidence());
    assert!(approx(report.confidence(), 0.9));
}

#[test]
fn threshold_report_serializes_camel_case() {
    let report = ThresholdReport::evaluate(ConfidenceThresholds::default(), 0.5);
    let value = match serde_json::to_value(report) {
        Ok(value) => value,
        Err(err) => panic!("report should serialize: {err}"),
    };
    assert_eq!(value["currentMeetsMinimum"], serde_json::json!(true));
    assert_eq!(value["currentIsHighConfidence"], serde_json::json!(false));
    assert_eq!(value["highConfidence"], serde_json::json!(0.85));
}
