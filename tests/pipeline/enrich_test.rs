//! Edge-case flags and urgency scoring.

use mailsift::extractors::{Deadline, ExtractedEntities};
use mailsift::patterns::CompiledLibrary;
use mailsift::pipeline::enrich::{detect_edge_cases, score_urgency};
use mailsift::pipeline::EdgeCase;
use mailsift::types::Message;

fn library() -> CompiledLibrary {
    match CompiledLibrary::builtin() {
        Ok(library) => library,
        Err(err) => panic!("built-in library should compile: {err}"),
    }
}

/// A body long enough to raise no body flag.
fn plain_body() -> String {
    "b".repeat(50)
}

fn with_subject(subject: &str, body: &str) -> Message {
    Message::new("m1", "a@example.com", None, body).with_subject(subject)
}

fn deadline(is_urgent: bool) -> ExtractedEntities {
    ExtractedEntities {
        deadline: Some(Deadline {
            text: "due Friday".to_owned(),
            is_urgent,
        }),
        ..ExtractedEntities::default()
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
}

#[test]
fn subject_length_boundaries() {
    let body = plain_body();
    assert_eq!(
        detect_edge_cases(&with_subject("abcdefghi", &body)),
        vec![EdgeCase::ShortSubject]
    );
    assert!(detect_edge_cases(&with_subject("abcdefghij", &body)).is_empty());
    assert!(detect_edge_cases(&with_subject(&"order".repeat(20), &body)).is_empty());
    assert_eq!(
        detect_edge_cases(&with_subject(&format!("{}s", "order".repeat(20)), &body)),
        vec![EdgeCase::LongSubject]
    );
}

#[test]
fn missing_and_placeholder_subjects() {
    let body = plain_body();
    let missing = Message::new("m1", "a@example.com", None, body.as_str());
    assert_eq!(
        detect_edge_cases(&missing),
        vec![EdgeCase::ShortSubject, EdgeCase::NoSubject]
    );
    assert_eq!(
        detect_edge_cases(&with_subject("   ", &body)),
        vec![EdgeCase::ShortSubject, EdgeCase::NoSubject]
    );
    assert_eq!(
        detect_edge_cases(&with_subject("(No Subject)", &body)),
        vec![EdgeCase::NoSubject, EdgeCase::CreativeSubject]
    );
}

#[test]
fn creative_subject_needs_length_and_no_triage_keyword() {
    let body = plain_body();
    assert_eq!(
        detect_edge_cases(&with_subject("Whispers from the moonlit archive", &body)),
        vec![EdgeCase::CreativeSubject]
    );
    assert!(detect_edge_cases(&with_subject("Re: budget for the offsite", &body)).is_empty());
    assert!(detect_edge_cases(&with_subject("ORDER update ready", &body)).is_empty());
}

#[test]
fn non_ascii_subject_is_flagged() {
    assert_eq!(
        detect_edge_cases(&with_subject("Order \u{1F389} ready now", &plain_body())),
        vec![EdgeCase::EmojiSubject]
    );
}

#[test]
fn body_length_boundaries() {
    let subject = "Meeting notes";
    let flags = |len: usize| detect_edge_cases(&with_subject(subject, &"b".repeat(len)));
    assert_eq!(flags(49), vec![EdgeCase::ShortBody]);
    assert!(flags(50).is_empty());
    assert!(flags(5000).is_empty());
    assert_eq!(flags(5001), vec![EdgeCase::LongBody]);
}

#[test]
fn no_deadline_and_no_keywords_is_zero() {
    let library = library();
    let message = with_subject("Weekly notes", "Nothing pressing here.");
    let urgency = score_urgency(&library, &message, &ExtractedEntities::default());
    assert_close(urgency.score, 0.0);
    assert!(!urgency.is_urgent);
    assert!(urgency.factors.is_empty());
}

#[test]
fn deadline_alone_is_not_urgent() {
    let library = library();
    let message = with_subject("Invoice", "Please pay.");
    let urgency = score_urgency(&library, &message, &deadline(false));
    assert_close(urgency.score, 0.4);
    assert!(!urgency.is_urgent);
    assert_eq!(urgency.factors, vec!["deadline: due Friday".to_owned()]);
}

#[test]
fn urgent_deadline_crosses_the_threshold() {
    let library = library();
    let message = with_subject("Invoice", "Please pay.");
    let urgency = score_urgency(&library, &message, &deadline(true));
    assert_close(urgency.score, 0.7);
    assert!(urgency.is_urgent);
    assert!(urgency.factors.contains(&"deadline marked urgent".to_owned()));
}

#[test]
fn keyword_contribution_is_capped() {
    let library = library();
    let message = with_subject("Notice", "Urgent: act asap, immediately, before tonight.");
    let urgency = score_urgency(&library, &message, &ExtractedEntities::default());
    assert_close(urgency.score, 0.3);
    assert!(!urgency.is_urgent);
    let keywords = urgency
        .factors
        .iter()
        .filter(|f| f.starts_with("keyword: "))
        .count();
    assert_eq!(keywords, 4);
}

#[test]
fn deadline_plus_keywords_reaches_urgent() {
    let library = library();
    let entities = deadline(false);

    let one = with_subject("Invoice", "Please pay asap.");
    let urgency = score_urgency(&library, &one, &entities);
    assert_close(urgency.score, 0.5);
    assert!(!urgency.is_urgent);

    let two = with_subject("Invoice", "Urgent: please pay asap.");
    let urgency = score_urgency(&library, &two, &entities);
    assert_close(urgency.score, 0.6);
    assert!(urgency.is_urgent);
}

#[test]
fn score_never_exceeds_one() {
    let library = library();
    let message = with_subject("Final notice", "Urgent: pay asap, immediately, tonight.");
    let urgency = score_urgency(&library, &message, &deadline(true));
    assert!(urgency.score <= 1.0);
    assert_close(urgency.score, 1.0);
    assert!(urgency.is_urgent);
}
