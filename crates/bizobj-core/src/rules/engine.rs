//! Rule engine
//!
//! Holds the rules of one model, grouped per property for validation and per
//! `(action, target)` pair for authorization. Each group is kept sorted by
//! ascending priority; ties keep insertion order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{BoError, Result};
use crate::model::Value;

use super::broken_rules::{BrokenRule, BrokenRuleTree, Severity};
use super::descriptor::{
    AuthAction, AuthorizationInput, NoAccessBehavior, RuleBody, RuleDescriptor, RuleInput,
};

/// Read access to the property values a rule evaluates
pub trait PropertyValues {
    fn value(&self, property: &str) -> Option<&Value>;
}

impl PropertyValues for crate::model::Record {
    fn value(&self, property: &str) -> Option<&Value> {
        self.get(property)
    }
}

type AuthKey = (AuthAction, Option<String>);

#[derive(Debug, Default, Clone)]
pub struct RuleEngine {
    validation: HashMap<String, Vec<Arc<RuleDescriptor>>>,
    authorization: HashMap<AuthKey, Vec<Arc<RuleDescriptor>>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule and re-sort its group by priority
    ///
    /// # Errors
    ///
    /// Returns `InvalidRule` when the rule has no name or no primary property,
    /// or when an authorization rule's target does not fit its action
    /// (property and method actions need one, model actions must not have one).
    pub fn add(&mut self, rule: RuleDescriptor) -> Result<()> {
        let name = rule.rule_name().to_string();
        let invalid = |reason: &str| BoError::InvalidRule {
            rule: name.clone(),
            reason: reason.to_string(),
        };
        if rule.rule_name().trim().is_empty() {
            return Err(invalid("rule name cannot be empty"));
        }
        if rule.primary_property().trim().is_empty() {
            return Err(invalid("primary property cannot be empty"));
        }

        let rule = Arc::new(rule);
        let group = match rule.body() {
            RuleBody::Validation(_) => self
                .validation
                .entry(rule.primary_property().to_string())
                .or_default(),
            RuleBody::Authorization { action, target, .. } => {
                if action.is_targeted() != target.is_some() {
                    return Err(invalid(&format!(
                        "{action} rules {} a target",
                        if action.is_targeted() { "need" } else { "cannot have" }
                    )));
                }
                self.authorization
                    .entry((*action, target.clone()))
                    .or_default()
            }
        };
        group.push(rule);
        // stable: equal priorities keep insertion order
        group.sort_by_key(|r| r.get_priority());
        Ok(())
    }

    /// Validation rules of `property` in evaluation order
    pub fn validation_rules(&self, property: &str) -> &[Arc<RuleDescriptor>] {
        self.validation.get(property).map_or(&[], Vec::as_slice)
    }

    pub fn authorization_rules(
        &self,
        action: AuthAction,
        target: Option<&str>,
    ) -> &[Arc<RuleDescriptor>] {
        self.authorization
            .get(&(action, target.map(str::to_string)))
            .map_or(&[], Vec::as_slice)
    }

    /// Properties that have at least one validation rule
    pub fn validated_properties(&self) -> impl Iterator<Item = &str> {
        self.validation.keys().map(String::as_str)
    }

    /// Run the validation rules of one property, appending failures to `tree`
    ///
    /// Stops at the first failing rule marked `stops_processing`; other
    /// properties are unaffected.
    pub fn validate(&self, property: &str, values: &dyn PropertyValues, tree: &mut BrokenRuleTree) {
        for descriptor in self.validation_rules(property) {
            let RuleBody::Validation(rule) = descriptor.body() else {
                continue;
            };

            let mut input = RuleInput::new(property, values.value(property));
            for affected in descriptor.affected_properties() {
                input = input.with_affected(affected, values.value(affected));
            }

            let outcome = rule.evaluate(&input);
            if outcome.is_success() {
                continue;
            }

            let severity = descriptor.severity_override().unwrap_or(outcome.severity);
            let message = descriptor
                .configured_message()
                .map(str::to_string)
                .or(outcome.message)
                .unwrap_or_else(|| format!("{property} failed rule {}", descriptor.rule_name()));
            tree.add(
                BrokenRule::new(descriptor.rule_name(), property, message, severity)
                    .with_affected(descriptor.affected_properties()),
            );

            if descriptor.is_stops_processing() {
                break;
            }
        }
    }

    /// Authorization check used by the data portal and property accessors
    ///
    /// The first rule (by priority) that denies decides; no rule means
    /// allowed. A denial is handled per the rule's own behavior, falling back
    /// to `default_behavior`:
    /// * `Throw` - `Err(AuthorizationDenied)`
    /// * `Record` - preserved error notice in `tree`, `Ok(false)`
    /// * `Silent` - `Ok(false)`
    ///
    /// # Errors
    ///
    /// Returns `AuthorizationDenied` when a denying rule resolves to `Throw`.
    pub fn has_permission(
        &self,
        input: &AuthorizationInput<'_>,
        tree: &mut BrokenRuleTree,
        default_behavior: NoAccessBehavior,
    ) -> Result<bool> {
        let Some(descriptor) = self.first_denial(input) else {
            return Ok(true);
        };

        let behavior = match descriptor.body() {
            RuleBody::Authorization { no_access, .. } => no_access.unwrap_or(default_behavior),
            RuleBody::Validation(_) => default_behavior,
        };
        let message = descriptor
            .configured_message()
            .map(str::to_string)
            .unwrap_or_else(|| denial_message(input));

        match behavior {
            NoAccessBehavior::Throw => Err(BoError::AuthorizationDenied {
                model: input.model.to_string(),
                action: input.action,
                target: input.target.map(str::to_string),
                message,
            }),
            NoAccessBehavior::Record => {
                let property = input.target.unwrap_or(input.action.as_str());
                tree.add(
                    BrokenRule::new(descriptor.rule_name(), property, message, Severity::Error)
                        .preserved(),
                );
                Ok(false)
            }
            NoAccessBehavior::Silent => Ok(false),
        }
    }

    /// Side-effect-free permission query
    pub fn can(&self, input: &AuthorizationInput<'_>) -> bool {
        self.first_denial(input).is_none()
    }

    fn first_denial(&self, input: &AuthorizationInput<'_>) -> Option<&Arc<RuleDescriptor>> {
        self.authorization_rules(input.action, input.target)
            .iter()
            .find(|descriptor| match descriptor.body() {
                RuleBody::Authorization { rule, .. } => !rule.is_allowed(input),
                RuleBody::Validation(_) => false,
            })
    }
}

fn denial_message(input: &AuthorizationInput<'_>) -> String {
    let user = input.user.map_or("anonymous", |u| u.user_name());
    match input.target {
        Some(target) => format!(
            "User {user} is not authorized to {} {}.{target}",
            input.action, input.model
        ),
        None => format!(
            "User {user} is not authorized to {} {}",
            input.action, input.model
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::rules::builtin::{Expression, IsInRole, MaxLength, Required};
    use crate::rules::principal::SimpleUser;
    use crate::rules::UserInfo;

    #[test]
    fn test_property_without_rules_validates() {
        let engine = RuleEngine::new();
        let mut tree = BrokenRuleTree::new();
        engine.validate("anything", &Record::new(), &mut tree);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_descriptor_message_overrides_rule_message() {
        let mut engine = RuleEngine::new();
        engine
            .add(RuleDescriptor::validation("vendorName", Required).message("Vendor is mandatory"))
            .unwrap();

        let mut tree = BrokenRuleTree::new();
        engine.validate("vendorName", &Record::new(), &mut tree);
        assert_eq!(tree.notices("vendorName")[0].message, "Vendor is mandatory");
    }

    #[test]
    fn test_severity_override_applies_to_failures() {
        let mut engine = RuleEngine::new();
        engine
            .add(RuleDescriptor::validation("vendorName", MaxLength::new(3)).severity(Severity::Warning))
            .unwrap();

        let values = Record::new().with("vendorName", "Acme Corp");
        let mut tree = BrokenRuleTree::new();
        engine.validate("vendorName", &values, &mut tree);
        assert_eq!(tree.notices("vendorName")[0].severity, Severity::Warning);
        assert!(tree.is_valid());
    }

    #[test]
    fn test_dependency_notice_tags_affected_property() {
        let mut engine = RuleEngine::new();
        engine
            .add(
                RuleDescriptor::validation(
                    "shipDate",
                    Expression::new("afterOrder", |input| {
                        let order = input.affected_value("orderDate");
                        order.is_null() || input.value.as_i64() >= order.as_i64()
                    }),
                )
                .affects("orderDate"),
            )
            .unwrap();

        let values = Record::new().with("shipDate", 1).with("orderDate", 5);
        let mut tree = BrokenRuleTree::new();
        engine.validate("shipDate", &values, &mut tree);

        let notices = tree.notices("shipDate");
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].affected_properties, vec!["orderDate".to_string()]);
        assert!(tree.notices("orderDate").is_empty());
    }

    #[test]
    fn test_targeted_action_requires_target() {
        let mut engine = RuleEngine::new();
        let result = engine.add(RuleDescriptor::authorization(
            AuthAction::WriteProperty,
            IsInRole::new("admin"),
        ));
        assert!(matches!(result, Err(BoError::InvalidRule { .. })));

        let result = engine.add(RuleDescriptor::authorization_for(
            AuthAction::Update,
            "vendorName",
            IsInRole::new("admin"),
        ));
        assert!(matches!(result, Err(BoError::InvalidRule { .. })));
    }

    #[test]
    fn test_no_rules_means_allowed() {
        let engine = RuleEngine::new();
        let mut tree = BrokenRuleTree::new();
        let input = AuthorizationInput::new(AuthAction::Remove, "Order");
        assert!(engine
            .has_permission(&input, &mut tree, NoAccessBehavior::Throw)
            .unwrap());
    }

    #[test]
    fn test_denial_modes() {
        let mut engine = RuleEngine::new();
        engine
            .add(RuleDescriptor::authorization(AuthAction::Update, IsInRole::new("manager")))
            .unwrap();
        let clerk = SimpleUser::new("ann", ["clerk"]);
        let input = AuthorizationInput::new(AuthAction::Update, "Order")
            .with_user(Some(&clerk as &dyn UserInfo));

        let mut tree = BrokenRuleTree::new();
        let err = engine
            .has_permission(&input, &mut tree, NoAccessBehavior::Throw)
            .unwrap_err();
        assert!(matches!(err, BoError::AuthorizationDenied { action: AuthAction::Update, .. }));
        assert!(tree.is_empty());

        assert!(!engine
            .has_permission(&input, &mut tree, NoAccessBehavior::Silent)
            .unwrap());
        assert!(tree.is_empty());

        assert!(!engine
            .has_permission(&input, &mut tree, NoAccessBehavior::Record)
            .unwrap());
        let recorded = tree.notices("update");
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].is_preserved);
        assert_eq!(recorded[0].severity, Severity::Error);
    }

    #[test]
    fn test_rule_behavior_overrides_installation_default() {
        let mut engine = RuleEngine::new();
        engine
            .add(
                RuleDescriptor::authorization(AuthAction::Fetch, IsInRole::new("reader"))
                    .no_access(NoAccessBehavior::Silent),
            )
            .unwrap();

        let input = AuthorizationInput::new(AuthAction::Fetch, "Order");
        let mut tree = BrokenRuleTree::new();
        assert!(!engine
            .has_permission(&input, &mut tree, NoAccessBehavior::Throw)
            .unwrap());
        assert!(!engine.can(&input));
    }
}
