//! Validation and authorization rules
//!
//! - `descriptor`: rule descriptors, rule bodies and their inputs
//! - `engine`: per-model rule storage, ordered validation and permission checks
//! - `broken_rules`: the broken-rule tree mirroring an object graph
//! - `builtin`: stock validation and role-based authorization rules
//! - `principal`: the current-user surface

pub mod broken_rules;
pub mod builtin;
pub mod descriptor;
pub mod engine;
pub mod principal;

pub use broken_rules::{BrokenRule, BrokenRuleTree, BrokenRulesResponse, ChildBrokenRules, Severity};
pub use descriptor::{
    AuthAction, AuthorizationInput, AuthorizationRule, NoAccessBehavior, RuleBody,
    RuleDescriptor, RuleInput, RuleKind, RuleOutcome, ValidationRule,
};
pub use engine::{PropertyValues, RuleEngine};
pub use principal::{Anonymous, FixedPrincipal, PrincipalProvider, SimpleUser, UserInfo};
