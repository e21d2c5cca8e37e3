//! Intent-to-action binding and registry validation.

use mailsift::patterns::{ActionRuleDef, CompiledLibrary, PatternLibrary};
use mailsift::rules::{RulesEngine, StaticActionRegistry};

fn library() -> CompiledLibrary {
    match CompiledLibrary::builtin() {
        Ok(library) => library,
        Err(err) => panic!("built-in library should compile: {err}"),
    }
}

fn registry() -> StaticActionRegistry {
    match StaticActionRegistry::builtin() {
        Ok(registry) => registry,
        Err(err) => panic!("built-in registry should parse: {err}"),
    }
}

fn action(id: &str, endpoint: &str, is_primary: bool, priority: u32) -> ActionRuleDef {
    ActionRuleDef {
        action_id: id.to_owned(),
        display_name: id.to_owned(),
        endpoint: endpoint.to_owned(),
        is_primary,
        priority,
    }
}

#[test]
fn payment_rule_yields_primary_first_and_all_validated() {
    let library = library();
    let registry = registry();
    let outcome = RulesEngine::new(&library, &registry).evaluate(Some("finance.payment"), &[]);

    assert!(outcome.matched_rule);
    assert!(!outcome.degraded);
    let ids: Vec<&str> = outcome
        .suggested_actions
        .iter()
        .map(|a| a.action_id.as_str())
        .collect();
    assert_eq!(ids, vec!["pay_invoice", "add_reminder"]);
    assert!(outcome.action_validation.iter().all(|v| v.endpoint_exists));
    assert_eq!(outcome.actionable().len(), 2);
    assert_eq!(
        outcome.primary_action().map(|a| a.action_id.as_str()),
        Some("pay_invoice")
    );
}

#[test]
fn primary_actions_sort_before_lower_priority_numbers() {
    let mut raw = match PatternLibrary::builtin() {
        Ok(raw) => raw,
        Err(err) => panic!("built-in library should parse: {err}"),
    };
    let Some(rule) = raw.rules.iter_mut().find(|r| r.intent == "calendar.event") else {
        panic!("calendar rule should exist");
    };
    rule.actions = vec![
        action("rsvp", "/actions/calendar/rsvp", false, 1),
        action("add_reminder", "/actions/reminders", false, 3),
        action("add_to_calendar", "/actions/calendar/add", true, 5),
    ];
    let library = match raw.compile() {
        Ok(library) => library,
        Err(err) => panic!("modified library should compile: {err}"),
    };
    let registry = registry();
    let outcome = RulesEngine::new(&library, &registry).evaluate(Some("calendar.event"), &[]);
    let ids: Vec<&str> = outcome
        .suggested_actions
        .iter()
        .map(|a| a.action_id.as_str())
        .collect();
    assert_eq!(ids, vec!["add_to_calendar", "rsvp", "add_reminder"]);
}

#[test]
fn unregistered_action_is_kept_but_not_actionable() {
    let library = library();
    let registry = registry();
    let outcome =
        RulesEngine::new(&library, &registry).evaluate(Some("healthcare.appointment"), &[]);

    assert_eq!(outcome.suggested_actions.len(), 2);
    let confirm = outcome
        .action_validation
        .iter()
        .find(|v| v.action.action_id == "confirm_appointment");
    assert_eq!(confirm.map(|v| v.endpoint_exists), Some(false));

    let actionable: Vec<&str> = outcome
        .actionable()
        .iter()
        .map(|a| a.action_id.as_str())
        .collect();
    assert_eq!(actionable, vec!["add_to_calendar"]);
    assert!(outcome.primary_action().is_none());
    assert!(outcome.reasoning.contains("unregistered: confirm_appointment"));
}

#[test]
fn endpoint_mismatch_fails_validation() {
    let mut raw = match PatternLibrary::builtin() {
        Ok(raw) => raw,
        Err(err) => panic!("built-in library should parse: {err}"),
    };
    let Some(rule) = raw.rules.iter_mut().find(|r| r.intent == "travel.hotel") else {
        panic!("hotel rule should exist");
    };
    rule.actions = vec![action("view_reservation", "/actions/elsewhere", true, 1)];
    let library = match raw.compile() {
        Ok(library) => library,
        Err(err) => panic!("modified library should compile: {err}"),
    };
    let registry = registry();
    let outcome = RulesEngine::new(&library, &registry).evaluate(Some("travel.hotel"), &[]);
    assert!(!outcome.action_validation[0].endpoint_exists);
    assert!(outcome.actionable().is_empty());
}

#[test]
fn registered_display_name_wins() {
    let library = library();
    let registry = registry();
    let outcome = RulesEngine::new(&library, &registry).evaluate(Some("calendar.event"), &[]);
    assert_eq!(outcome.suggested_actions[1].display_name, "RSVP");
}

#[test]
fn missing_entities_degrade_without_suppressing() {
    let library = library();
    let registry = registry();
    let missing = vec!["amount".to_owned()];
    let outcome =
        RulesEngine::new(&library, &registry).evaluate(Some("finance.payment"), &missing);
    assert!(outcome.degraded);
    assert!(!outcome.suppressed);
    assert_eq!(outcome.missing_required_entities, missing);
    assert_eq!(outcome.actionable().len(), 2);
    assert!(outcome.reasoning.contains("missing amount"));
}

#[test]
fn permission_form_without_deadline_suppresses_actions() {
    let library = library();
    let registry = registry();
    let missing = vec!["deadline".to_owned()];
    let outcome = RulesEngine::new(&library, &registry)
        .evaluate(Some("education.permission.form"), &missing);
    assert!(outcome.matched_rule);
    assert!(outcome.degraded);
    assert!(outcome.suppressed);
    assert_eq!(outcome.suggested_actions.len(), 2);
    assert!(outcome.actionable().is_empty());
    assert!(outcome.primary_action().is_none());
}

#[test]
fn permission_form_with_deadline_offers_sign_form() {
    let library = library();
    let registry = registry();
    let outcome =
        RulesEngine::new(&library, &registry).evaluate(Some("education.permission.form"), &[]);
    assert!(!outcome.suppressed);
    assert_eq!(
        outcome.primary_action().map(|a| a.action_id.as_str()),
        Some("sign_form")
    );
}

#[test]
fn no_accepted_intent_matches_no_rule() {
    let library = library();
    let registry = registry();
    let outcome = RulesEngine::new(&library, &registry).evaluate(None, &[]);
    assert!(!outcome.matched_rule);
    assert!(outcome.suggested_actions.is_empty());
    assert_eq!(outcome.reasoning, "no intent met minimum confidence");
}

#[test]
fn intent_without_rule_is_unmatched() {
    let library = library();
    let registry = registry();
    let outcome = RulesEngine::new(&library, &registry).evaluate(Some("finance.tax"), &[]);
    assert!(!outcome.matched_rule);
    assert!(!outcome.degraded);
    assert_eq!(outcome.reasoning, "no rule for intent finance.tax");
}

#[test]
fn validation_serializes_flattened() {
    let library = library();
    let registry = registry();
    let outcome = RulesEngine::new(&library, &registry).evaluate(Some("travel.hotel"), &[]);
    let value = match serde_json::to_value(&outcome) {
        Ok(value) => value,
        Err(err) => panic!("outcome should serialize: {err}"),
    };
    let first = &value["actionValidation"][0];
    assert_eq!(first["actionId"], serde_json::json!("view_reservation"));
    assert_eq!(first["endpointExists"], serde_json::json!(true));
    assert_eq!(value["matchedRule"], serde_json::json!(true));
}
