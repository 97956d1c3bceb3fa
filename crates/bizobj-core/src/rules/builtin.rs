//! Built-in validation and authorization rules
//!
//! Every validation rule except `Required` and `Dependency` passes on `Null`,
//! so optional properties only need `Required` to become mandatory.

use regex::Regex;

use crate::errors::{BoError, Result};

use super::descriptor::{
    AuthorizationInput, AuthorizationRule, RuleInput, RuleOutcome, ValidationRule,
};

// ===== Validation =====

/// Fails on `Null` and on blank text
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl ValidationRule for Required {
    fn name(&self) -> &str {
        "required"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        if input.value.is_blank() {
            RuleOutcome::error(format!("{} is required", input.property))
        } else {
            RuleOutcome::success()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaxLength {
    max: usize,
}

impl MaxLength {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl ValidationRule for MaxLength {
    fn name(&self) -> &str {
        "maxLength"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        match input.value.as_str() {
            Some(s) if s.chars().count() > self.max => RuleOutcome::error(format!(
                "{} cannot be longer than {} characters",
                input.property, self.max
            )),
            _ => RuleOutcome::success(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinLength {
    min: usize,
}

impl MinLength {
    pub fn new(min: usize) -> Self {
        Self { min }
    }
}

impl ValidationRule for MinLength {
    fn name(&self) -> &str {
        "minLength"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        match input.value.as_str() {
            Some(s) if s.chars().count() < self.min => RuleOutcome::error(format!(
                "{} must be at least {} characters",
                input.property, self.min
            )),
            _ => RuleOutcome::success(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinValue {
    min: f64,
}

impl MinValue {
    pub fn new(min: impl Into<f64>) -> Self {
        Self { min: min.into() }
    }
}

impl ValidationRule for MinValue {
    fn name(&self) -> &str {
        "minValue"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        match input.value.as_f64() {
            Some(v) if v < self.min => RuleOutcome::error(format!(
                "{} must be at least {}",
                input.property, self.min
            )),
            _ => RuleOutcome::success(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaxValue {
    max: f64,
}

impl MaxValue {
    pub fn new(max: impl Into<f64>) -> Self {
        Self { max: max.into() }
    }
}

impl ValidationRule for MaxValue {
    fn name(&self) -> &str {
        "maxValue"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        match input.value.as_f64() {
            Some(v) if v > self.max => RuleOutcome::error(format!(
                "{} cannot exceed {}",
                input.property, self.max
            )),
            _ => RuleOutcome::success(),
        }
    }
}

/// Text must match a regular expression
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// # Errors
    ///
    /// Returns `InvalidRule` when `pattern` is not a valid regular expression.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| BoError::InvalidRule {
            rule: "pattern".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { regex })
    }
}

impl ValidationRule for Pattern {
    fn name(&self) -> &str {
        "pattern"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        match input.value.as_str() {
            Some(s) if !self.regex.is_match(s) => RuleOutcome::error(format!(
                "{} does not match the expected format",
                input.property
            )),
            _ => RuleOutcome::success(),
        }
    }
}

type Predicate = Box<dyn Fn(&RuleInput<'_>) -> bool + Send + Sync>;

/// Single-property predicate; skipped for `Null`
pub struct Expression {
    name: String,
    predicate: Predicate,
}

impl Expression {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RuleInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl ValidationRule for Expression {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        if input.value.is_null() || (self.predicate)(input) {
            RuleOutcome::success()
        } else {
            RuleOutcome::error(format!("{} is invalid", input.property))
        }
    }
}

/// Cross-property predicate over the primary and affected properties
///
/// Runs even when the primary value is `Null`. Failures are filed under the
/// primary property and tagged with the descriptor's affected properties.
pub struct Dependency {
    name: String,
    predicate: Predicate,
}

impl Dependency {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RuleInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl ValidationRule for Dependency {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        if (self.predicate)(input) {
            return RuleOutcome::success();
        }
        let others: Vec<&str> = input.affected.iter().map(|(name, _)| *name).collect();
        RuleOutcome::error(format!(
            "{} is inconsistent with {}",
            input.property,
            others.join(", ")
        ))
    }
}

/// Always yields an informational notice
#[derive(Debug, Clone)]
pub struct Information {
    message: String,
}

impl Information {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ValidationRule for Information {
    fn name(&self) -> &str {
        "information"
    }

    fn evaluate(&self, _input: &RuleInput<'_>) -> RuleOutcome {
        RuleOutcome::information(self.message.clone())
    }
}

// ===== Authorization =====

#[derive(Debug, Clone)]
pub struct IsInRole {
    role: String,
}

impl IsInRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl AuthorizationRule for IsInRole {
    fn name(&self) -> &str {
        "isInRole"
    }

    fn is_allowed(&self, input: &AuthorizationInput<'_>) -> bool {
        input.is_in_role(&self.role)
    }
}

#[derive(Debug, Clone)]
pub struct IsInAnyRole {
    roles: Vec<String>,
}

impl IsInAnyRole {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl AuthorizationRule for IsInAnyRole {
    fn name(&self) -> &str {
        "isInAnyRole"
    }

    fn is_allowed(&self, input: &AuthorizationInput<'_>) -> bool {
        input.is_in_any_role(&self.roles)
    }
}

#[derive(Debug, Clone)]
pub struct IsInAllRoles {
    roles: Vec<String>,
}

impl IsInAllRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl AuthorizationRule for IsInAllRoles {
    fn name(&self) -> &str {
        "isInAllRoles"
    }

    fn is_allowed(&self, input: &AuthorizationInput<'_>) -> bool {
        input.is_in_all_roles(&self.roles)
    }
}

/// Allows users outside `role`; still denies when there is no user
#[derive(Debug, Clone)]
pub struct IsNotInRole {
    role: String,
}

impl IsNotInRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl AuthorizationRule for IsNotInRole {
    fn name(&self) -> &str {
        "isNotInRole"
    }

    fn is_allowed(&self, input: &AuthorizationInput<'_>) -> bool {
        input.user.is_some_and(|u| !u.is_in_role(&self.role))
    }
}

type AuthPredicate = Box<dyn Fn(&AuthorizationInput<'_>) -> bool + Send + Sync>;

pub struct AuthExpression {
    name: String,
    predicate: AuthPredicate,
}

impl AuthExpression {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&AuthorizationInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl AuthorizationRule for AuthExpression {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_allowed(&self, input: &AuthorizationInput<'_>) -> bool {
        (self.predicate)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::rules::descriptor::AuthAction;
    use crate::rules::principal::SimpleUser;
    use crate::rules::{Severity, UserInfo};

    fn eval(rule: &dyn ValidationRule, value: Value) -> Severity {
        rule.evaluate(&RuleInput::new("field", Some(&value))).severity
    }

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(eval(&Required, Value::Null), Severity::Error);
        assert_eq!(eval(&Required, Value::from("  ")), Severity::Error);
        assert_eq!(eval(&Required, Value::from("Acme")), Severity::Success);
        assert_eq!(eval(&Required, Value::Integer(0)), Severity::Success);
    }

    #[test]
    fn test_length_and_range_skip_null() {
        assert_eq!(eval(&MaxLength::new(2), Value::Null), Severity::Success);
        assert_eq!(eval(&MaxLength::new(2), Value::from("abc")), Severity::Error);
        assert_eq!(eval(&MinLength::new(2), Value::from("a")), Severity::Error);
        assert_eq!(eval(&MinValue::new(1), Value::Integer(0)), Severity::Error);
        assert_eq!(eval(&MaxValue::new(10), Value::Decimal(10.5)), Severity::Error);
        assert_eq!(eval(&MaxValue::new(10), Value::Null), Severity::Success);
    }

    #[test]
    fn test_pattern() {
        let rule = Pattern::new(r"^[A-Z]{3}-\d+$").unwrap();
        assert_eq!(eval(&rule, Value::from("ORD-12")), Severity::Success);
        assert_eq!(eval(&rule, Value::from("ord-12")), Severity::Error);
        assert!(Pattern::new("(").is_err());
    }

    #[test]
    fn test_information_never_fails_validity() {
        assert_eq!(
            eval(&Information::new("prices exclude tax"), Value::Null),
            Severity::Information
        );
    }

    #[test]
    fn test_dependency_runs_on_null() {
        let rule = Dependency::new("cityNeedsZip", |input| {
            input.value.is_null() == input.affected_value("zip").is_null()
        });
        let zip = Value::from("1000");
        let input = RuleInput::new("city", None).with_affected("zip", Some(&zip));
        assert_eq!(rule.evaluate(&input).severity, Severity::Error);
    }

    #[test]
    fn test_role_rules_deny_without_user() {
        let anonymous = AuthorizationInput::new(AuthAction::Fetch, "Order");
        assert!(!IsInRole::new("a").is_allowed(&anonymous));
        assert!(!IsNotInRole::new("a").is_allowed(&anonymous));
        assert!(!IsInAnyRole::new(["a", "b"]).is_allowed(&anonymous));

        let user = SimpleUser::new("ann", ["a"]);
        let input = anonymous.with_user(Some(&user as &dyn UserInfo));
        assert!(IsInRole::new("a").is_allowed(&input));
        assert!(!IsNotInRole::new("a").is_allowed(&input));
        assert!(IsInAnyRole::new(["a", "b"]).is_allowed(&input));
        assert!(!IsInAllRoles::new(["a", "b"]).is_allowed(&input));
    }
}
