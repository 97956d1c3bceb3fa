//! bizobj Core - business object kernel
//!
//! This crate provides the in-memory half of the business object runtime:
//! - Property descriptors and immutable model schemas
//! - Model instances and child collections with mutation-state tracking
//! - The rule engine (validation and authorization rules in priority order)
//! - The broken-rule tree that mirrors the object graph
//! - Interfaces for external data access objects and connection providers
//! - The canonical error and logging facilities shared by every crate
//!
//! Orchestration of create/fetch/insert/update/remove across a whole graph
//! lives in `bizobj-engine`.

pub mod config;
pub mod dao;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod rules;

pub use bizobj_core_types as core_types;

// Re-export commonly used types
pub use config::PortalConfig;
pub use dao::{
    Connection, ConnectionProvider, Dao, DaoContext, DaoError, DaoProvider, DaoRegistry,
    DaoResult, PortalAction,
};
pub use errors::{BoError, ExError, ExErrorKind, Result};
pub use model::{
    DataType, ModelCollection, ModelInstance, ModelKind, ModelSchema, MutationState,
    PropertyDescriptor, Record, Value,
};
pub use rules::{
    AuthAction, BrokenRule, BrokenRuleTree, NoAccessBehavior, PrincipalProvider, RuleDescriptor,
    RuleEngine, Severity, UserInfo,
};
