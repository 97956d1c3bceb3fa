//! Transaction and connection boundaries
//!
//! Only root-level portal calls come through here. Descendant nodes receive
//! the open connection by reference and never begin, commit, roll back or
//! release it.

use std::future::Future;
use std::sync::Arc;

use bizobj_core::errors::{BoError, Result, TransactionPhase};
use bizobj_core::{Connection, ConnectionProvider};

fn phase_error(phase: TransactionPhase, data_source: &str, source: anyhow::Error) -> BoError {
    BoError::Transaction {
        phase,
        data_source: data_source.to_string(),
        source,
    }
}

pub struct TransactionCoordinator {
    provider: Arc<dyn ConnectionProvider>,
}

impl TransactionCoordinator {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }

    /// Run `work` inside a transaction on `data_source`
    ///
    /// Commits when `work` succeeds. When it fails the transaction is rolled
    /// back and the original error returned; if the rollback fails too, both
    /// errors come back as `RollbackFailed`. A failed commit is followed by a
    /// rollback attempt as well.
    ///
    /// # Errors
    ///
    /// * `Transaction` - begin or commit failed
    /// * `RollbackFailed` - the rollback after a failure failed
    /// * anything `work` returns
    pub async fn run<T, F, Fut>(&self, data_source: &str, work: F) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let connection = self
            .provider
            .begin_transaction(data_source)
            .await
            .map_err(|e| phase_error(TransactionPhase::Begin, data_source, e))?;
        tracing::debug!(
            data_source,
            connection_id = %connection.id(),
            "transaction begun"
        );

        let original = match work(connection.clone()).await {
            Ok(value) => match self.provider.commit_transaction(connection.clone()).await {
                Ok(closed) => {
                    tracing::debug!(
                        data_source,
                        connection_id = %closed.id(),
                        closed = closed.is_closed(),
                        "transaction committed"
                    );
                    return Ok(value);
                }
                Err(e) => phase_error(TransactionPhase::Commit, data_source, e),
            },
            Err(err) => err,
        };

        match self.provider.rollback_transaction(connection).await {
            Ok(closed) => {
                tracing::debug!(
                    data_source,
                    connection_id = %closed.id(),
                    "transaction rolled back"
                );
                Err(original)
            }
            Err(rollback) => Err(BoError::RollbackFailed {
                original: Box::new(original),
                rollback,
            }),
        }
    }

    /// Run `work` on a non-transactional connection, released afterwards
    ///
    /// # Errors
    ///
    /// * `Transaction` - opening the connection failed, or releasing it
    ///   failed after `work` succeeded
    /// * anything `work` returns
    pub async fn with_connection<T, F, Fut>(&self, data_source: &str, work: F) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let connection = self
            .provider
            .open_connection(data_source)
            .await
            .map_err(|e| phase_error(TransactionPhase::Open, data_source, e))?;

        let result = work(connection.clone()).await;
        let released = self.provider.release_connection(connection).await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(phase_error(TransactionPhase::Release, data_source, e)),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(e)) => {
                tracing::warn!(
                    data_source,
                    error = %e,
                    "connection release failed after an error"
                );
                Err(err)
            }
        }
    }
}
