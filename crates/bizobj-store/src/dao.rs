use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bizobj_core::{Dao, DaoContext, DaoError, DaoResult, PortalAction, Record};

use crate::journal::{DaoCall, DaoCallLog};
use crate::store::MemoryStore;

type NamedQuery = Arc<dyn Fn(&Record, &Record) -> bool + Send + Sync>;
type Command = Arc<dyn Fn(&Record) -> anyhow::Result<Record> + Send + Sync>;

/// `Dao` over one `MemoryStore` table
///
/// ```
/// use bizobj_store::{MemoryDao, MemoryStore};
///
/// let store = MemoryStore::new();
/// let dao = MemoryDao::new(&store, "Order").auto_key("orderKey");
/// # let _ = dao;
/// ```
pub struct MemoryDao {
    store: MemoryStore,
    table: String,
    key_fields: Vec<String>,
    auto_key: Option<String>,
    defaults: Record,
    named: HashMap<String, NamedQuery>,
    commands: HashMap<String, Command>,
    supported: Option<HashSet<PortalAction>>,
    failing: Mutex<HashSet<PortalAction>>,
    delay: Option<Duration>,
    log: Option<DaoCallLog>,
}

impl MemoryDao {
    pub fn new(store: &MemoryStore, table: impl Into<String>) -> Self {
        Self {
            store: store.clone(),
            table: table.into(),
            key_fields: Vec::new(),
            auto_key: None,
            defaults: Record::new(),
            named: HashMap::new(),
            commands: HashMap::new(),
            supported: None,
            failing: Mutex::new(HashSet::new()),
            delay: None,
            log: None,
        }
    }

    /// Key field used to match rows on update
    pub fn key(mut self, field: impl Into<String>) -> Self {
        self.key_fields.push(field.into());
        self
    }

    /// Key field assigned from the table's sequence on insert when null
    pub fn auto_key(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.key_fields.push(field.clone());
        self.auto_key = Some(field);
        self
    }

    /// Values returned by `create`
    pub fn defaults(mut self, defaults: Record) -> Self {
        self.defaults = defaults;
        self
    }

    /// Named query: `predicate(row, filter)` selects rows
    pub fn named_query<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record, &Record) -> bool + Send + Sync + 'static,
    {
        self.named.insert(name.into(), Arc::new(predicate));
        self
    }

    /// Command method for `execute`
    pub fn command<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Record) -> anyhow::Result<Record> + Send + Sync + 'static,
    {
        self.commands.insert(name.into(), Arc::new(handler));
        self
    }

    /// Restrict the DAO to these actions; others report `Unsupported`
    pub fn only<I: IntoIterator<Item = PortalAction>>(mut self, actions: I) -> Self {
        self.supported = Some(actions.into_iter().collect());
        self
    }

    /// Suspend for `delay` before completing each call
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(mut self, log: &DaoCallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    /// Make every later `action` call fail
    pub fn fail_on(&self, action: PortalAction) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(action);
        }
    }

    pub fn heal(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    /// Common prologue: suspension point, support and failure checks
    async fn enter(&self, ctx: &DaoContext<'_>, action: PortalAction) -> DaoResult<()> {
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        if let Some(supported) = &self.supported {
            if !supported.contains(&action) {
                return Err(DaoError::Unsupported);
            }
        }
        if ctx.connection.is_closed() {
            return Err(anyhow!("{action} on {} used a closed connection", self.table).into());
        }
        if action.is_mutating() && !ctx.connection.is_transactional() {
            return Err(anyhow!("{action} on {} requires a transaction", self.table).into());
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&action))
            .unwrap_or(false);
        if failing {
            return Err(anyhow!("injected {action} failure on {}", self.table).into());
        }
        Ok(())
    }

    fn journal<T>(
        &self,
        ctx: &DaoContext<'_>,
        action: PortalAction,
        method: Option<&str>,
        payload: &Record,
        result: &DaoResult<T>,
    ) {
        if let Some(log) = &self.log {
            log.record(DaoCall {
                model: ctx.model.to_string(),
                action,
                method: method.map(str::to_string),
                payload: payload.clone(),
                connection: ctx.connection.id(),
                transactional: ctx.connection.is_transactional(),
                succeeded: result.is_ok(),
            });
        }
        tracing::debug!(
            table = %self.table,
            action = action.as_str(),
            ok = result.is_ok(),
            "memory dao call"
        );
    }

    /// Row filter for update and remove: configured key fields, falling back
    /// to the parent key for keyless child rows
    fn row_filter(&self, ctx: &DaoContext<'_>, record: &Record) -> DaoResult<Record> {
        let key: Record = self
            .key_fields
            .iter()
            .filter_map(|f| record.get(f).map(|v| (f.as_str(), v.clone())))
            .collect();
        if key.len() == self.key_fields.len() && key.iter().all(|(_, v)| !v.is_null()) && !key.is_empty() {
            return Ok(key);
        }
        match ctx.parent_key {
            Some(parent) if !parent.is_empty() => Ok(parent.clone()),
            _ => Err(anyhow!("no key to locate a {} row", self.table).into()),
        }
    }

    async fn do_insert(&self, ctx: &DaoContext<'_>, record: &Record) -> DaoResult<Record> {
        self.enter(ctx, PortalAction::Insert).await?;
        let mut row = record.clone();
        if let Some(field) = &self.auto_key {
            if row.get(field).map_or(true, |v| v.is_null()) {
                row.insert(field.clone(), self.store.next_key(&self.table)?);
            }
        }
        self.store.insert(&self.table, row.clone())?;
        Ok(row)
    }

    async fn do_update(&self, ctx: &DaoContext<'_>, record: &Record) -> DaoResult<Record> {
        self.enter(ctx, PortalAction::Update).await?;
        let filter = self.row_filter(ctx, record)?;
        self.store.update(&self.table, &filter, record)?;
        Ok(record.clone())
    }

    async fn do_remove(&self, ctx: &DaoContext<'_>, key: &Record) -> DaoResult<()> {
        self.enter(ctx, PortalAction::Remove).await?;
        let filter = self.row_filter(ctx, key)?;
        self.store.delete(&self.table, &filter)?;
        Ok(())
    }
}

#[async_trait]
impl Dao for MemoryDao {
    async fn create(&self, ctx: DaoContext<'_>) -> DaoResult<Record> {
        let result = match self.enter(&ctx, PortalAction::Create).await {
            Ok(()) => Ok(self.defaults.clone()),
            Err(e) => Err(e),
        };
        self.journal(&ctx, PortalAction::Create, None, &Record::new(), &result);
        result
    }

    async fn fetch(&self, ctx: DaoContext<'_>, filter: &Record) -> DaoResult<Vec<Record>> {
        let result = match self.enter(&ctx, PortalAction::Fetch).await {
            Ok(()) => self.store.find(&self.table, filter).map_err(DaoError::from),
            Err(e) => Err(e),
        };
        self.journal(&ctx, PortalAction::Fetch, None, filter, &result);
        result
    }

    async fn fetch_by_name(
        &self,
        ctx: DaoContext<'_>,
        method: &str,
        filter: &Record,
    ) -> DaoResult<Vec<Record>> {
        let result = match self.enter(&ctx, PortalAction::Fetch).await {
            Ok(()) => match self.named.get(method) {
                Some(predicate) => self
                    .store
                    .find(&self.table, &Record::new())
                    .map(|rows| rows.into_iter().filter(|r| predicate(r, filter)).collect())
                    .map_err(DaoError::from),
                None => Err(DaoError::Unsupported),
            },
            Err(e) => Err(e),
        };
        self.journal(&ctx, PortalAction::Fetch, Some(method), filter, &result);
        result
    }

    async fn insert(&self, ctx: DaoContext<'_>, record: &Record) -> DaoResult<Record> {
        let result = self.do_insert(&ctx, record).await;
        self.journal(&ctx, PortalAction::Insert, None, record, &result);
        result
    }

    async fn update(&self, ctx: DaoContext<'_>, record: &Record) -> DaoResult<Record> {
        let result = self.do_update(&ctx, record).await;
        self.journal(&ctx, PortalAction::Update, None, record, &result);
        result
    }

    async fn remove(&self, ctx: DaoContext<'_>, key: &Record) -> DaoResult<()> {
        let result = self.do_remove(&ctx, key).await;
        self.journal(&ctx, PortalAction::Remove, None, key, &result);
        result
    }

    async fn execute(
        &self,
        ctx: DaoContext<'_>,
        method: &str,
        record: &Record,
    ) -> DaoResult<Record> {
        let result = match self.enter(&ctx, PortalAction::Execute).await {
            Ok(()) => match self.commands.get(method) {
                Some(handler) => handler(record).map_err(DaoError::from),
                None => Err(DaoError::Unsupported),
            },
            Err(e) => Err(e),
        };
        self.journal(&ctx, PortalAction::Execute, Some(method), record, &result);
        result
    }
}
