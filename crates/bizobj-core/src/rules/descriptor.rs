//! Rule descriptors
//!
//! A `RuleDescriptor` binds one evaluation body (a validation rule or an
//! authorization rule) to a primary property together with its ordering and
//! reporting metadata. Descriptors are created at model-definition time and
//! shared by every instance of the model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::Value;

use super::broken_rules::Severity;
use super::principal::UserInfo;

/// Priority assigned when none is given; lower runs first
pub const DEFAULT_PRIORITY: i32 = 10;

/// Action checked by an authorization rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuthAction {
    Fetch,
    Create,
    Update,
    Remove,
    ReadProperty,
    WriteProperty,
    ExecuteMethod,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Fetch => "fetch",
            AuthAction::Create => "create",
            AuthAction::Update => "update",
            AuthAction::Remove => "remove",
            AuthAction::ReadProperty => "readProperty",
            AuthAction::WriteProperty => "writeProperty",
            AuthAction::ExecuteMethod => "executeMethod",
        }
    }

    /// Whether rules for this action are bound to a property or method name
    pub fn is_targeted(&self) -> bool {
        matches!(
            self,
            AuthAction::ReadProperty | AuthAction::WriteProperty | AuthAction::ExecuteMethod
        )
    }
}

impl std::fmt::Display for AuthAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens when an authorization rule denies access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoAccessBehavior {
    /// Fail the surrounding operation with `AuthorizationDenied`
    #[default]
    Throw,
    /// Add a preserved error notice to the broken-rule tree and report `false`
    Record,
    /// Report `false` only
    Silent,
}

/// Result of evaluating a validation rule once
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub severity: Severity,
    pub message: Option<String>,
}

impl RuleOutcome {
    pub fn success() -> Self {
        Self {
            severity: Severity::Success,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message)
    }

    pub fn information(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Information, message)
    }

    pub fn with_severity(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.severity == Severity::Success
    }
}

static NULL: Value = Value::Null;

/// Values visible to a validation rule: its primary property and every
/// affected property declared on the descriptor
#[derive(Debug)]
pub struct RuleInput<'a> {
    pub property: &'a str,
    pub value: &'a Value,
    pub affected: Vec<(&'a str, &'a Value)>,
}

impl<'a> RuleInput<'a> {
    pub fn new(property: &'a str, value: Option<&'a Value>) -> Self {
        Self {
            property,
            value: value.unwrap_or(&NULL),
            affected: Vec::new(),
        }
    }

    pub fn with_affected(mut self, property: &'a str, value: Option<&'a Value>) -> Self {
        self.affected.push((property, value.unwrap_or(&NULL)));
        self
    }

    /// Value of an affected property; `Null` when it was not declared
    pub fn affected_value(&self, property: &str) -> &'a Value {
        self.affected
            .iter()
            .find(|(name, _)| *name == property)
            .map_or(&NULL, |(_, value)| *value)
    }
}

/// A validation rule body
///
/// Implementations report domain failures through the returned severity.
/// A panic inside `evaluate` is a programming error and is not caught.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome;
}

/// What an authorization rule is asked about
pub struct AuthorizationInput<'a> {
    pub action: AuthAction,
    /// Property or method name for targeted actions
    pub target: Option<&'a str>,
    pub model: &'a str,
    pub user: Option<&'a dyn UserInfo>,
}

impl<'a> AuthorizationInput<'a> {
    pub fn new(action: AuthAction, model: &'a str) -> Self {
        Self {
            action,
            target: None,
            model,
            user: None,
        }
    }

    pub fn with_target(mut self, target: &'a str) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_user(mut self, user: Option<&'a dyn UserInfo>) -> Self {
        self.user = user;
        self
    }

    /// No current user denies every role check
    pub fn is_in_role(&self, role: &str) -> bool {
        self.user.is_some_and(|u| u.is_in_role(role))
    }

    pub fn is_in_any_role(&self, roles: &[String]) -> bool {
        self.user.is_some_and(|u| u.is_in_any_role(roles))
    }

    pub fn is_in_all_roles(&self, roles: &[String]) -> bool {
        self.user.is_some_and(|u| u.is_in_all_roles(roles))
    }
}

/// An authorization rule body
pub trait AuthorizationRule: Send + Sync {
    fn name(&self) -> &str;

    fn is_allowed(&self, input: &AuthorizationInput<'_>) -> bool;
}

/// Discriminant of a rule body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Validation,
    Authorization,
}

#[derive(Clone)]
pub enum RuleBody {
    Validation(Arc<dyn ValidationRule>),
    Authorization {
        action: AuthAction,
        target: Option<String>,
        rule: Arc<dyn AuthorizationRule>,
        no_access: Option<NoAccessBehavior>,
    },
}

/// A named rule bound to a primary property
#[derive(Clone)]
pub struct RuleDescriptor {
    rule_name: String,
    primary_property: String,
    affected_properties: Vec<String>,
    message: Option<String>,
    priority: i32,
    stops_processing: bool,
    severity: Option<Severity>,
    body: RuleBody,
}

impl RuleDescriptor {
    /// Validation rule evaluated for `property`
    pub fn validation(property: impl Into<String>, rule: impl ValidationRule + 'static) -> Self {
        let rule: Arc<dyn ValidationRule> = Arc::new(rule);
        Self {
            rule_name: rule.name().to_string(),
            primary_property: property.into(),
            affected_properties: Vec::new(),
            message: None,
            priority: DEFAULT_PRIORITY,
            stops_processing: false,
            severity: None,
            body: RuleBody::Validation(rule),
        }
    }

    /// Model-level authorization rule (fetch, create, update, remove)
    pub fn authorization(action: AuthAction, rule: impl AuthorizationRule + 'static) -> Self {
        Self::authorization_body(action, None, Arc::new(rule))
    }

    /// Authorization rule bound to a property or method name
    pub fn authorization_for(
        action: AuthAction,
        target: impl Into<String>,
        rule: impl AuthorizationRule + 'static,
    ) -> Self {
        Self::authorization_body(action, Some(target.into()), Arc::new(rule))
    }

    fn authorization_body(
        action: AuthAction,
        target: Option<String>,
        rule: Arc<dyn AuthorizationRule>,
    ) -> Self {
        Self {
            rule_name: rule.name().to_string(),
            primary_property: target
                .clone()
                .unwrap_or_else(|| action.as_str().to_string()),
            affected_properties: Vec::new(),
            message: None,
            priority: DEFAULT_PRIORITY,
            stops_processing: false,
            severity: None,
            body: RuleBody::Authorization {
                action,
                target,
                rule,
                no_access: None,
            },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.rule_name = name.into();
        self
    }

    /// Declare a secondary property read by the rule and tagged on its notices
    pub fn affects(mut self, property: impl Into<String>) -> Self {
        self.affected_properties.push(property.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Skip the remaining rules of the same property after a failure
    pub fn stops_processing(mut self) -> Self {
        self.stops_processing = true;
        self
    }

    /// Report failures with this severity instead of the rule's own
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Override the installation-wide denial behavior for this rule
    pub fn no_access(mut self, behavior: NoAccessBehavior) -> Self {
        if let RuleBody::Authorization { no_access, .. } = &mut self.body {
            *no_access = Some(behavior);
        }
        self
    }

    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    pub fn primary_property(&self) -> &str {
        &self.primary_property
    }

    pub fn affected_properties(&self) -> &[String] {
        &self.affected_properties
    }

    pub fn configured_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    pub fn is_stops_processing(&self) -> bool {
        self.stops_processing
    }

    pub fn severity_override(&self) -> Option<Severity> {
        self.severity
    }

    pub fn body(&self) -> &RuleBody {
        &self.body
    }

    pub fn kind(&self) -> RuleKind {
        match self.body {
            RuleBody::Validation(_) => RuleKind::Validation,
            RuleBody::Authorization { .. } => RuleKind::Authorization,
        }
    }

    pub fn auth_action(&self) -> Option<AuthAction> {
        match &self.body {
            RuleBody::Authorization { action, .. } => Some(*action),
            RuleBody::Validation(_) => None,
        }
    }

    pub fn auth_target(&self) -> Option<&str> {
        match &self.body {
            RuleBody::Authorization { target, .. } => target.as_deref(),
            RuleBody::Validation(_) => None,
        }
    }
}

impl std::fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("rule_name", &self.rule_name)
            .field("primary_property", &self.primary_property)
            .field("affected_properties", &self.affected_properties)
            .field("priority", &self.priority)
            .field("stops_processing", &self.stops_processing)
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}
