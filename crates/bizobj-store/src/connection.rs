use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bizobj_core::{Connection, ConnectionProvider};

use crate::journal::{TxEvent, TxEventKind, TxLog};
use crate::store::{MemoryStore, StoreState};

/// Transaction buffer carried on a transactional connection
#[derive(Debug)]
struct TxState {
    snapshot: Mutex<Option<StoreState>>,
}

#[derive(Debug, Default)]
struct Faults {
    begin: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
}

/// `ConnectionProvider` over a `MemoryStore`
///
/// Begin snapshots the whole store; rollback restores it. Every call is
/// journaled in `log()`.
#[derive(Clone)]
pub struct MemoryConnectionProvider {
    store: MemoryStore,
    log: TxLog,
    faults: Arc<Faults>,
}

impl MemoryConnectionProvider {
    pub fn new(store: &MemoryStore) -> Self {
        Self {
            store: store.clone(),
            log: TxLog::new(),
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn log(&self) -> &TxLog {
        &self.log
    }

    pub fn fail_begin(&self, fail: bool) {
        self.faults.begin.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.faults.commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.faults.rollback.store(fail, Ordering::SeqCst);
    }

    fn journal(&self, kind: TxEventKind, connection: &Connection, succeeded: bool) {
        self.log.record(TxEvent {
            kind,
            data_source: connection.data_source().to_string(),
            connection: connection.id(),
            succeeded,
        });
    }

    fn take_snapshot(connection: &Connection) -> Result<Option<StoreState>> {
        let tx = connection
            .handle::<TxState>()
            .ok_or_else(|| anyhow!("connection {} has no open transaction", connection.id()))?;
        let mut snapshot = tx
            .snapshot
            .lock()
            .map_err(|_| anyhow!("transaction state lock poisoned"))?;
        Ok(snapshot.take())
    }
}

#[async_trait]
impl ConnectionProvider for MemoryConnectionProvider {
    async fn open_connection(&self, data_source: &str) -> Result<Connection> {
        let connection = Connection::new(data_source, false);
        self.journal(TxEventKind::Open, &connection, true);
        Ok(connection)
    }

    async fn release_connection(&self, connection: Connection) -> Result<()> {
        self.journal(TxEventKind::Release, &connection, true);
        Ok(())
    }

    async fn begin_transaction(&self, data_source: &str) -> Result<Connection> {
        tokio::task::yield_now().await;
        let connection = Connection::new(data_source, true);
        if self.faults.begin.load(Ordering::SeqCst) {
            self.journal(TxEventKind::Begin, &connection, false);
            return Err(anyhow!("cannot begin a transaction on {data_source}"));
        }
        let snapshot = self.store.snapshot()?;
        let connection = connection.with_handle(Arc::new(TxState {
            snapshot: Mutex::new(Some(snapshot)),
        }));
        self.journal(TxEventKind::Begin, &connection, true);
        Ok(connection)
    }

    async fn commit_transaction(&self, connection: Connection) -> Result<Connection> {
        tokio::task::yield_now().await;
        if self.faults.commit.load(Ordering::SeqCst) {
            self.journal(TxEventKind::Commit, &connection, false);
            return Err(anyhow!("commit failed on {}", connection.data_source()));
        }
        Self::take_snapshot(&connection)?;
        self.journal(TxEventKind::Commit, &connection, true);
        Ok(connection.closed())
    }

    async fn rollback_transaction(&self, connection: Connection) -> Result<Connection> {
        tokio::task::yield_now().await;
        if self.faults.rollback.load(Ordering::SeqCst) {
            self.journal(TxEventKind::Rollback, &connection, false);
            return Err(anyhow!("rollback failed on {}", connection.data_source()));
        }
        if let Some(snapshot) = Self::take_snapshot(&connection)? {
            self.store.restore(snapshot)?;
        }
        self.journal(TxEventKind::Rollback, &connection, true);
        Ok(connection.closed())
    }
}
