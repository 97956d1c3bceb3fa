//! Data portal
//!
//! Root-level entry points, one per action. Each call:
//! 1. Checks the model kind and mutation state of the root
//! 2. Opens a connection (create/fetch/execute) or a transaction
//!    (insert/update/remove) on the model's data source
//! 3. Walks the graph: authorization, `pre<Action>` event, DAO call,
//!    copy-back, fan-out over children, `post<Action>` event
//! 4. Commits, or rolls back on the first error
//!
//! Child nodes never open, commit or release connections; the root's
//! connection is passed down by reference in a `NodeCall`.

mod create;
mod execute;
mod fetch;
mod save;

use std::sync::Arc;
use std::time::Instant;

use bizobj_core::errors::{BoError, Result};
use bizobj_core::model::ModelSchema;
use bizobj_core::rules::{Anonymous, AuthorizationInput, BrokenRuleTree};
use bizobj_core::{
    log_op_end, log_op_error, log_op_start, AuthAction, Connection, ConnectionProvider, Dao,
    DaoContext, DaoError, DaoProvider, ModelInstance, MutationState, PortalAction, PortalConfig,
    PrincipalProvider, Record, UserInfo,
};
use bizobj_core_types::{RequestContext, TraceId};

use crate::events::{EventBus, EventPhase, PortalEventArgs};
use crate::trace::current_trace_id;
use crate::transaction::TransactionCoordinator;

/// Orchestrates data portal actions over model graphs
///
/// Built once with its collaborators and shared; every call is independent.
pub struct DataPortal {
    config: PortalConfig,
    daos: Arc<dyn DaoProvider>,
    transactions: TransactionCoordinator,
    principal: Arc<dyn PrincipalProvider>,
    events: EventBus,
}

impl DataPortal {
    pub fn new(
        config: PortalConfig,
        daos: Arc<dyn DaoProvider>,
        connections: Arc<dyn ConnectionProvider>,
    ) -> Self {
        Self {
            config,
            daos,
            transactions: TransactionCoordinator::new(connections),
            principal: Arc::new(Anonymous),
            events: EventBus::new(),
        }
    }

    /// Source of the current user for authorization rules
    pub fn with_principal(mut self, principal: Arc<dyn PrincipalProvider>) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn transactions(&self) -> &TransactionCoordinator {
        &self.transactions
    }

    fn data_source<'s>(&'s self, schema: &'s ModelSchema) -> &'s str {
        schema
            .data_source()
            .unwrap_or(self.config.default_data_source.as_str())
    }

    /// DAO for `action` on `schema`: the schema's override, else the registry
    fn dao(&self, schema: &ModelSchema, action: PortalAction) -> Result<Arc<dyn Dao>> {
        if let Some(dao) = schema.dao_override(action) {
            return Ok(dao.clone());
        }
        self.daos
            .dao_for(schema.name())
            .ok_or_else(|| BoError::DaoNotRegistered {
                model: schema.name().to_string(),
            })
    }

    /// Log the end of a root-level call and hand its result back
    fn finish<T>(
        &self,
        action: PortalAction,
        schema: &ModelSchema,
        request: &RequestContext,
        started: Instant,
        result: Result<T>,
    ) -> Result<T> {
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!(
                    action.as_str(),
                    duration_ms = duration_ms,
                    model = schema.name(),
                    request_id = %request.request_id,
                    trace_id = request.trace_id.as_ref().map(TraceId::as_str)
                );
            }
            Err(err) => {
                log_op_error!(
                    action.as_str(),
                    err,
                    duration_ms = duration_ms,
                    model = schema.name(),
                    request_id = %request.request_id,
                    trace_id = request.trace_id.as_ref().map(TraceId::as_str)
                );
            }
        }
        result
    }
}

/// `InvalidState` for a root that cannot take `action`
fn invalid_root(instance: &ModelInstance, action: PortalAction) -> BoError {
    BoError::InvalidState {
        model: instance.model_name().to_string(),
        action: format!("{action} ({})", instance.schema().kind()),
        state: instance.state(),
    }
}

/// Wrap a DAO failure with the action and model it happened in
pub(crate) fn dao_failure(err: DaoError, action: PortalAction, model: &str) -> BoError {
    match err {
        DaoError::Unsupported => BoError::UnsupportedOperation {
            action,
            model: model.to_string(),
        },
        DaoError::Failed(source) => BoError::DataAccess {
            action,
            model: model.to_string(),
            source,
        },
    }
}

/// Everything a node needs from the root-level call that reached it
#[derive(Clone, Copy)]
pub(crate) struct NodeCall<'a> {
    pub portal: &'a DataPortal,
    pub connection: &'a Connection,
    pub request: &'a RequestContext,
    pub user: Option<&'a dyn UserInfo>,
}

impl<'a> NodeCall<'a> {
    /// Ask the node's rules whether `action` may proceed
    ///
    /// Denials in record mode leave a notice on the node itself.
    pub fn authorize(
        &self,
        instance: &mut ModelInstance,
        action: AuthAction,
        target: Option<&str>,
    ) -> Result<bool> {
        let schema = instance.schema().clone();
        let mut input = AuthorizationInput::new(action, schema.name()).with_user(self.user);
        if let Some(target) = target {
            input = input.with_target(target);
        }
        schema.rules().has_permission(
            &input,
            instance.own_broken_rules_mut(),
            self.portal.config.no_access_behavior,
        )
    }

    /// Authorization for a node that has no instance yet (a collection)
    pub fn authorize_model(&self, schema: &ModelSchema, action: AuthAction) -> Result<bool> {
        let input = AuthorizationInput::new(action, schema.name()).with_user(self.user);
        let mut scratch = BrokenRuleTree::new();
        schema
            .rules()
            .has_permission(&input, &mut scratch, self.portal.config.no_access_behavior)
    }

    pub fn dao(&self, schema: &ModelSchema, action: PortalAction) -> Result<Arc<dyn Dao>> {
        self.portal.dao(schema, action)
    }

    pub fn context<'c>(
        &'c self,
        schema: &'c ModelSchema,
        parent_key: Option<&'c Record>,
    ) -> DaoContext<'c> {
        DaoContext {
            connection: self.connection,
            model: schema.name(),
            parent_key,
        }
    }

    pub fn emit(
        &self,
        schema: &ModelSchema,
        phase: EventPhase,
        action: PortalAction,
        method: Option<&str>,
    ) {
        let args = PortalEventArgs {
            model: schema.name().to_string(),
            method: method.map(str::to_string),
            event: phase.event_name(action),
            phase,
            action,
            request_id: self.request.request_id.clone(),
            trace_id: self.request.trace_id.clone(),
        };
        self.portal.events.emit(&args);
    }
}

/// Fetch the current user once per root-level call
fn current_user(portal: &DataPortal) -> Option<Arc<dyn UserInfo>> {
    portal.principal.current_user()
}

/// Start-of-call bookkeeping shared by every entry point
fn begin(action: PortalAction, schema: &ModelSchema) -> (RequestContext, Instant) {
    let mut request = RequestContext::new();
    if let Some(trace_id) = current_trace_id() {
        request = request.with_trace_id(trace_id);
    }
    log_op_start!(
        action.as_str(),
        model = schema.name(),
        request_id = %request.request_id,
        trace_id = request.trace_id.as_ref().map(TraceId::as_str)
    );
    (request, Instant::now())
}

/// Mutation state a save dispatches on
fn save_action(instance: &ModelInstance) -> Option<PortalAction> {
    match instance.state() {
        MutationState::Created => Some(PortalAction::Insert),
        MutationState::Pristine | MutationState::Changed => Some(PortalAction::Update),
        MutationState::MarkedForRemoval => Some(PortalAction::Remove),
        MutationState::Removed => None,
    }
}
