use bizobj_core_types::RequestId;
use thiserror::Error;

use crate::dao::PortalAction;
use crate::model::{DataType, MutationState};
use crate::rules::AuthAction;

/// Result type alias using BoError
pub type Result<T> = std::result::Result<T, BoError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every `BoError` maps onto exactly one kind, and every kind onto a stable
/// code that callers, tests and log pipelines can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Model definition
    InvalidSchema,
    InvalidRule,

    // Runtime usage
    InvalidInput,
    InvalidState,
    NotFound,

    // Authorization
    AuthorizationDenied,

    // Persistence
    DataAccess,
    UnsupportedOperation,
    Transaction,

    // Integration
    Configuration,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidSchema => "ERR_INVALID_SCHEMA",
            ExErrorKind::InvalidRule => "ERR_INVALID_RULE",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidState => "ERR_INVALID_STATE",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AuthorizationDenied => "ERR_AUTHORIZATION_DENIED",
            ExErrorKind::DataAccess => "ERR_DATA_ACCESS",
            ExErrorKind::UnsupportedOperation => "ERR_UNSUPPORTED_OPERATION",
            ExErrorKind::Transaction => "ERR_TRANSACTION",
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Schema errors are raised at model-definition time and never recovered
    pub fn is_definition_error(&self) -> bool {
        matches!(self, ExErrorKind::InvalidSchema | ExErrorKind::InvalidRule)
    }
}

/// Canonical structured error type
///
/// Flat, cloneable projection of a `BoError` used for logging and for
/// reporting across API boundaries.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    model: Option<String>,
    property: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            model: None,
            property: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add model name context
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add property name context
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(model) = &self.model {
            write!(f, " (model: {})", model)?;
        }
        if let Some(property) = &self.property {
            write!(f, " (property: {})", property)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Phase of a transaction or connection round-trip that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Begin,
    Commit,
    Rollback,
    Open,
    Release,
}

impl std::fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionPhase::Begin => "begin",
            TransactionPhase::Commit => "commit",
            TransactionPhase::Rollback => "rollback",
            TransactionPhase::Open => "open",
            TransactionPhase::Release => "release",
        };
        f.write_str(s)
    }
}

/// Error taxonomy for business object definition and data portal operations
#[derive(Error, Debug)]
pub enum BoError {
    // ===== Schema Errors =====
    /// Two properties with the same name in one model
    #[error("Duplicate property '{property}' in model {model}")]
    DuplicateProperty { model: String, property: String },

    /// Property name not declared by the model
    #[error("Unknown property '{property}' in model {model}")]
    UnknownProperty { model: String, property: String },

    /// Rule descriptor is malformed
    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// Child property points at a model of the wrong kind
    #[error("Property '{property}' of model {model} cannot hold {child}: {reason}")]
    InvalidChildModel {
        model: String,
        property: String,
        child: String,
        reason: String,
    },

    /// More than one key property without an explicit composite key
    #[error("Model {model} declares multiple key properties without a composite key")]
    MultipleKeys { model: String },

    /// Any other structural problem with a model definition
    #[error("Invalid schema for model {model}: {reason}")]
    InvalidSchema { model: String, reason: String },

    // ===== Usage Errors =====
    #[error("Property '{property}' of model {model} is read-only")]
    ReadOnlyProperty { model: String, property: String },

    #[error("Property '{property}' of model {model} expects {expected}, got {actual}")]
    TypeMismatch {
        model: String,
        property: String,
        expected: DataType,
        actual: String,
    },

    #[error("Property '{property}' of model {model} is not a scalar value")]
    NotAScalar { model: String, property: String },

    #[error("Property '{property}' of model {model} is not a child {expected}")]
    NotAChild {
        model: String,
        property: String,
        expected: &'static str,
    },

    /// Action not allowed in the instance's current mutation state or kind
    #[error("Cannot {action} model {model} in state {state}")]
    InvalidState {
        model: String,
        action: String,
        state: MutationState,
    },

    // ===== Authorization =====
    #[error("Access denied: {action} on {model}{}: {message}", .target.as_ref().map(|t| format!(".{t}")).unwrap_or_default())]
    AuthorizationDenied {
        model: String,
        action: AuthAction,
        target: Option<String>,
        message: String,
    },

    // ===== Data Access =====
    /// The DAO or a custom override failed while performing `action`
    #[error("Data access failed during {action} of {model}: {source}")]
    DataAccess {
        action: PortalAction,
        model: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Operation {action} is not supported for model {model}")]
    UnsupportedOperation { action: PortalAction, model: String },

    #[error("No data access object registered for model {model}")]
    DaoNotRegistered { model: String },

    #[error("No {model} found for filter {filter}")]
    NotFound { model: String, filter: String },

    #[error("Transaction {phase} failed on data source {data_source}: {source}")]
    Transaction {
        phase: TransactionPhase,
        data_source: String,
        #[source]
        source: anyhow::Error,
    },

    /// Rolling back after `original` failed as well; both are reported
    #[error("Rollback failed ({rollback}) after: {original}")]
    RollbackFailed {
        #[source]
        original: Box<BoError>,
        rollback: anyhow::Error,
    },

    // ===== Generic Errors =====
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl BoError {
    /// Canonical kind of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            BoError::DuplicateProperty { .. }
            | BoError::UnknownProperty { .. }
            | BoError::InvalidChildModel { .. }
            | BoError::MultipleKeys { .. }
            | BoError::InvalidSchema { .. } => ExErrorKind::InvalidSchema,
            BoError::InvalidRule { .. } => ExErrorKind::InvalidRule,
            BoError::ReadOnlyProperty { .. }
            | BoError::TypeMismatch { .. }
            | BoError::NotAScalar { .. }
            | BoError::NotAChild { .. } => ExErrorKind::InvalidInput,
            BoError::InvalidState { .. } => ExErrorKind::InvalidState,
            BoError::AuthorizationDenied { .. } => ExErrorKind::AuthorizationDenied,
            BoError::DataAccess { .. } => ExErrorKind::DataAccess,
            BoError::UnsupportedOperation { .. } | BoError::DaoNotRegistered { .. } => {
                ExErrorKind::UnsupportedOperation
            }
            BoError::NotFound { .. } => ExErrorKind::NotFound,
            BoError::Transaction { .. } | BoError::RollbackFailed { .. } => {
                ExErrorKind::Transaction
            }
            BoError::Configuration { .. } => ExErrorKind::Configuration,
            BoError::Serialization { .. } => ExErrorKind::Serialization,
        }
    }

    /// Name of the model the error was raised for, when known
    pub fn model(&self) -> Option<&str> {
        match self {
            BoError::DuplicateProperty { model, .. }
            | BoError::UnknownProperty { model, .. }
            | BoError::InvalidChildModel { model, .. }
            | BoError::MultipleKeys { model }
            | BoError::InvalidSchema { model, .. }
            | BoError::ReadOnlyProperty { model, .. }
            | BoError::TypeMismatch { model, .. }
            | BoError::NotAScalar { model, .. }
            | BoError::NotAChild { model, .. }
            | BoError::InvalidState { model, .. }
            | BoError::AuthorizationDenied { model, .. }
            | BoError::DataAccess { model, .. }
            | BoError::UnsupportedOperation { model, .. }
            | BoError::DaoNotRegistered { model }
            | BoError::NotFound { model, .. } => Some(model),
            BoError::RollbackFailed { original, .. } => original.model(),
            BoError::InvalidRule { .. }
            | BoError::Transaction { .. }
            | BoError::Configuration { .. }
            | BoError::Serialization { .. } => None,
        }
    }

    /// True for persistence failures, as opposed to authorization failures
    pub fn is_data_access(&self) -> bool {
        matches!(
            self.kind(),
            ExErrorKind::DataAccess | ExErrorKind::Transaction
        )
    }
}

/// Projection of a `BoError` into the canonical facility
///
/// Borrowing keeps the original error usable after it has been logged.
impl From<&BoError> for ExError {
    fn from(err: &BoError) -> Self {
        let mut ex = ExError::new(err.kind()).with_message(err.to_string());
        if let Some(model) = err.model() {
            ex = ex.with_model(model);
        }
        match err {
            BoError::DuplicateProperty { property, .. }
            | BoError::UnknownProperty { property, .. }
            | BoError::InvalidChildModel { property, .. }
            | BoError::ReadOnlyProperty { property, .. }
            | BoError::TypeMismatch { property, .. }
            | BoError::NotAScalar { property, .. }
            | BoError::NotAChild { property, .. } => ex.with_property(property.as_str()),
            BoError::AuthorizationDenied { action, target, .. } => {
                let ex = ex.with_op(action.as_str());
                match target {
                    Some(t) => ex.with_property(t.as_str()),
                    None => ex,
                }
            }
            BoError::DataAccess { action, .. } | BoError::UnsupportedOperation { action, .. } => {
                ex.with_op(action.as_str())
            }
            BoError::InvalidState { action, .. } => ex.with_op(action.as_str()),
            BoError::Transaction { phase, .. } => ex.with_op(phase.to_string()),
            BoError::RollbackFailed { original, .. } => {
                ex.with_op("rollback").with_source(ExError::from(original.as_ref()))
            }
            _ => ex,
        }
    }
}

impl From<BoError> for ExError {
    fn from(err: BoError) -> Self {
        ExError::from(&err)
    }
}

/// Conversion from serde_json::Error to BoError
impl From<serde_json::Error> for BoError {
    fn from(err: serde_json::Error) -> Self {
        BoError::Serialization {
            message: err.to_string(),
        }
    }
}
