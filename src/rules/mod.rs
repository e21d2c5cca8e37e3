//! Rules engine: binds an accepted intent to an ordered list of suggested
//! actions and validates each against the action registry.
//!
//! Unvalidated actions stay in `suggested_actions` for traceability but
//! are never returned by [`RulesOutcome::actionable`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::patterns::{ActionRuleDef, CompiledLibrary};

pub mod registry;

pub use registry::{ActionDescriptor, ActionRegistry, RegistryError, StaticActionRegistry};

/// An action offered for an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAction {
    /// Registry key.
    pub action_id: String,
    /// Label; the registry's when registered.
    pub display_name: String,
    /// Headline action.
    pub is_primary: bool,
    /// Ordering, lower first.
    pub priority: u32,
    /// Endpoint the rule expects.
    pub endpoint: String,
}

/// A suggested action plus its registry check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionValidation {
    /// The action checked.
    #[serde(flatten)]
    pub action: SuggestedAction,
    /// Registered, with the same endpoint.
    pub endpoint_exists: bool,
}

/// Rules engine output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesOutcome {
    /// Whether an intent-to-action mapping exists.
    pub matched_rule: bool,
    /// Actions in display order, validated or not.
    pub suggested_actions: Vec<SuggestedAction>,
    /// Registry check per suggested action, same order.
    pub action_validation: Vec<ActionValidation>,
    /// Required entities the message lacks.
    pub missing_required_entities: Vec<String>,
    /// A rule matched but entities are missing.
    pub degraded: bool,
    /// Degraded and the rule withholds its actions.
    pub suppressed: bool,
    /// What happened, for the trace.
    pub reasoning: String,
}

impl RulesOutcome {
    fn unmatched(reasoning: String, missing: &[String]) -> Self {
        Self {
            matched_rule: false,
            suggested_actions: Vec::new(),
            action_validation: Vec::new(),
            missing_required_entities: missing.to_vec(),
            degraded: false,
            suppressed: false,
            reasoning,
        }
    }

    /// Validated actions safe to show, in order. Empty when suppressed.
    pub fn actionable(&self) -> Vec<&SuggestedAction> {
        if self.suppressed {
            return Vec::new();
        }
        self.action_validation
            .iter()
            .filter(|v| v.endpoint_exists)
            .map(|v| &v.action)
            .collect()
    }

    /// First actionable primary action.
    pub fn primary_action(&self) -> Option<&SuggestedAction> {
        self.actionable().into_iter().find(|a| a.is_primary)
    }
}

/// Rules engine over one library and registry.
#[derive(Clone, Copy)]
pub struct RulesEngine<'a> {
    library: &'a CompiledLibrary,
    registry: &'a dyn ActionRegistry,
}

impl std::fmt::Debug for RulesEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesEngine")
            .field("library", &self.library.version)
            .finish_non_exhaustive()
    }
}

impl<'a> RulesEngine<'a> {
    /// Engine using `library`'s rules and `registry` for validation.
    pub fn new(library: &'a CompiledLibrary, registry: &'a dyn ActionRegistry) -> Self {
        Self { library, registry }
    }

    /// Bind `intent` to actions. `intent` is `None` when no intent met the
    /// minimum confidence.
    pub fn evaluate(&self, intent: Option<&str>, missing_required: &[String]) -> RulesOutcome {
        let Some(intent) = intent else {
            return RulesOutcome::unmatched(
                "no intent met minimum confidence".to_owned(),
                missing_required,
            );
        };
        let Some(rule) = self.library.rule_for(intent) else {
            return RulesOutcome::unmatched(format!("no rule for intent {intent}"), missing_required);
        };

        let mut defs: Vec<&ActionRuleDef> = rule.actions.iter().collect();
        defs.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.priority.cmp(&b.priority))
        });

        let action_validation: Vec<ActionValidation> =
            defs.into_iter().map(|def| self.validate(def)).collect();
        let suggested_actions: Vec<SuggestedAction> =
            action_validation.iter().map(|v| v.action.clone()).collect();

        let degraded = !missing_required.is_empty();
        let suppressed = degraded && rule.suppress_when_degraded;
        let validated = action_validation.iter().filter(|v| v.endpoint_exists).count();

        let mut reasoning = format!(
            "rule {intent} matched: {} action(s), {validated} validated",
            suggested_actions.len()
        );
        let unknown: Vec<&str> = action_validation
            .iter()
            .filter(|v| !v.endpoint_exists)
            .map(|v| v.action.action_id.as_str())
            .collect();
        if !unknown.is_empty() {
            reasoning.push_str(&format!("; unregistered: {}", unknown.join(", ")));
        }
        if degraded {
            reasoning.push_str(&format!("; missing {}", missing_required.join(", ")));
        }
        if suppressed {
            reasoning.push_str("; actions withheld");
        }

        debug!(
            intent,
            actions = suggested_actions.len(),
            validated,
            degraded,
            suppressed,
            "rules evaluated"
        );

        RulesOutcome {
            matched_rule: true,
            suggested_actions,
            action_validation,
            missing_required_entities: missing_required.to_vec(),
            degraded,
            suppressed,
            reasoning,
        }
    }

    fn validate(&self, def: &ActionRuleDef) -> ActionValidation {
        let registered = self.registry.get(&def.action_id);
        let endpoint_exists = registered.is_some_and(|r| r.endpoint == def.endpoint);
        let display_name = registered
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| def.display_name.clone());
        ActionValidation {
            action: SuggestedAction {
                action_id: def.action_id.clone(),
                display_name,
                is_primary: def.is_primary,
                priority: def.priority,
                endpoint: def.endpoint.clone(),
            },
            endpoint_exists,
        }
    }
}
