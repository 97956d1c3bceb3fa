//! Data access interfaces
//!
//! Concrete persistence lives outside this crate. A `Dao` performs storage
//! operations for one model; a `ConnectionProvider` hands out connections and
//! drives transactions on a named data source. Both return `anyhow` errors;
//! the data portal wraps them with the failing action and model.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::Record;
use crate::rules::AuthAction;

/// Data portal action, as seen by a DAO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalAction {
    Create,
    Fetch,
    Insert,
    Update,
    Remove,
    Execute,
}

impl PortalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortalAction::Create => "create",
            PortalAction::Fetch => "fetch",
            PortalAction::Insert => "insert",
            PortalAction::Update => "update",
            PortalAction::Remove => "remove",
            PortalAction::Execute => "execute",
        }
    }

    /// Authorization action guarding this portal action
    pub fn auth_action(&self) -> AuthAction {
        match self {
            PortalAction::Create | PortalAction::Insert => AuthAction::Create,
            PortalAction::Fetch => AuthAction::Fetch,
            PortalAction::Update => AuthAction::Update,
            PortalAction::Remove => AuthAction::Remove,
            PortalAction::Execute => AuthAction::ExecuteMethod,
        }
    }

    /// Actions that run inside a transaction
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            PortalAction::Insert | PortalAction::Update | PortalAction::Remove
        )
    }
}

impl std::fmt::Display for PortalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DaoError {
    /// The DAO does not implement the requested operation
    #[error("operation not supported")]
    Unsupported,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub type DaoResult<T> = std::result::Result<T, DaoError>;

/// Handle to an open data source connection
///
/// Cheap to clone. The owning coordinator is the only party that may commit,
/// roll back or release it; everybody else reads it.
#[derive(Clone)]
pub struct Connection {
    id: Uuid,
    data_source: Arc<str>,
    transactional: bool,
    closed: bool,
    handle: Option<Arc<dyn Any + Send + Sync>>,
}

impl Connection {
    pub fn new(data_source: &str, transactional: bool) -> Self {
        Self {
            id: Uuid::now_v7(),
            data_source: Arc::from(data_source),
            transactional,
            closed: false,
            handle: None,
        }
    }

    /// Attach an adapter-specific handle (a transaction buffer, a pool slot)
    pub fn with_handle<T: Any + Send + Sync>(mut self, handle: Arc<T>) -> Self {
        let handle: Arc<dyn Any + Send + Sync> = handle;
        self.handle = Some(handle);
        self
    }

    /// Copy of this connection marked closed, as returned after commit or
    /// rollback
    pub fn closed(&self) -> Self {
        Self {
            closed: true,
            handle: None,
            ..self.clone()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Adapter handle downcast to its concrete type
    pub fn handle<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.handle.clone()?.downcast::<T>().ok()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("data_source", &self.data_source)
            .field("transactional", &self.transactional)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Per-call context handed to a DAO
#[derive(Debug, Clone, Copy)]
pub struct DaoContext<'a> {
    pub connection: &'a Connection,
    pub model: &'a str,
    /// Key of the owning parent for child models
    pub parent_key: Option<&'a Record>,
}

/// Storage operations for one model
///
/// Every operation defaults to `DaoError::Unsupported`; implement the subset
/// the model needs.
#[async_trait]
pub trait Dao: Send + Sync {
    /// Default field values for a new instance
    async fn create(&self, _ctx: DaoContext<'_>) -> DaoResult<Record> {
        Err(DaoError::Unsupported)
    }

    /// Records matching `filter`; child collections receive all their items
    async fn fetch(&self, _ctx: DaoContext<'_>, _filter: &Record) -> DaoResult<Vec<Record>> {
        Err(DaoError::Unsupported)
    }

    /// Named query
    async fn fetch_by_name(
        &self,
        _ctx: DaoContext<'_>,
        _method: &str,
        _filter: &Record,
    ) -> DaoResult<Vec<Record>> {
        Err(DaoError::Unsupported)
    }

    /// Persist a new record; returns assigned keys and any computed fields
    async fn insert(&self, _ctx: DaoContext<'_>, _record: &Record) -> DaoResult<Record> {
        Err(DaoError::Unsupported)
    }

    async fn update(&self, _ctx: DaoContext<'_>, _record: &Record) -> DaoResult<Record> {
        Err(DaoError::Unsupported)
    }

    async fn remove(&self, _ctx: DaoContext<'_>, _key: &Record) -> DaoResult<()> {
        Err(DaoError::Unsupported)
    }

    /// Command round-trip
    async fn execute(
        &self,
        _ctx: DaoContext<'_>,
        _method: &str,
        _record: &Record,
    ) -> DaoResult<Record> {
        Err(DaoError::Unsupported)
    }
}

/// Resolves the DAO registered for a model
pub trait DaoProvider: Send + Sync {
    fn dao_for(&self, model: &str) -> Option<Arc<dyn Dao>>;
}

/// Map from model name to DAO
#[derive(Default, Clone)]
pub struct DaoRegistry {
    daos: HashMap<String, Arc<dyn Dao>>,
}

impl DaoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: impl Into<String>, dao: Arc<dyn Dao>) -> &mut Self {
        self.daos.insert(model.into(), dao);
        self
    }

    pub fn with(mut self, model: impl Into<String>, dao: Arc<dyn Dao>) -> Self {
        self.register(model, dao);
        self
    }
}

impl DaoProvider for DaoRegistry {
    fn dao_for(&self, model: &str) -> Option<Arc<dyn Dao>> {
        self.daos.get(model).cloned()
    }
}

/// Connections and transactions on named data sources
///
/// `commit_transaction` and `rollback_transaction` return the handle to use
/// from then on, which may differ from the one passed in.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Non-transactional connection for create, fetch and execute
    async fn open_connection(&self, data_source: &str) -> anyhow::Result<Connection>;

    async fn release_connection(&self, connection: Connection) -> anyhow::Result<()>;

    async fn begin_transaction(&self, data_source: &str) -> anyhow::Result<Connection>;

    async fn commit_transaction(&self, connection: Connection) -> anyhow::Result<Connection>;

    async fn rollback_transaction(&self, connection: Connection) -> anyhow::Result<Connection>;
}
