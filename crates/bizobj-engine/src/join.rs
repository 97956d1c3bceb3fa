//! Fan-out / join over sibling branches
//!
//! Every branch handed to `join_branches` runs to completion, whatever its
//! siblings do. The barrier counts completions; once the count reaches the
//! number of branches it surfaces the first error by completion order.
//! Errors that complete after it are logged at `warn` and dropped.

use bizobj_core::errors::{BoError, ExError, Result};
use bizobj_core_types::RequestContext;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};

/// Completion counter plus first-error slot of one fan-out
#[derive(Debug)]
pub struct JoinBarrier {
    expected: usize,
    completed: usize,
    first_error: Option<BoError>,
    suppressed: Vec<BoError>,
}

impl JoinBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            completed: 0,
            first_error: None,
            suppressed: Vec::new(),
        }
    }

    /// Count one finished branch, successful or not
    pub fn record(&mut self, result: Result<()>) {
        self.completed += 1;
        if let Err(err) = result {
            match self.first_error {
                None => self.first_error = Some(err),
                Some(_) => self.suppressed.push(err),
            }
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.expected
    }

    pub fn first_error(&self) -> Option<&BoError> {
        self.first_error.as_ref()
    }

    /// Errors that arrived after the first one
    pub fn suppressed(&self) -> &[BoError] {
        &self.suppressed
    }

    /// Resolve the join
    ///
    /// # Errors
    ///
    /// The first branch error recorded.
    pub fn finish(self, op: &str, model: &str, request: &RequestContext) -> Result<()> {
        debug_assert!(self.is_complete(), "join finished before every branch completed");
        for err in &self.suppressed {
            let ex = ExError::from(err);
            tracing::warn!(
                component = module_path!(),
                op,
                model,
                request_id = %request.request_id,
                err_code = ex.code(),
                err_message = ex.message(),
                "sibling branch failed after the first error"
            );
        }
        tracing::debug!(
            op,
            model,
            branches = self.expected,
            suppressed = self.suppressed.len(),
            "join complete"
        );
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Run sibling branches concurrently and wait for all of them
///
/// # Errors
///
/// The first branch error by completion order, after every branch is done.
pub async fn join_branches(
    op: &str,
    model: &str,
    request: &RequestContext,
    branches: Vec<BoxFuture<'_, Result<()>>>,
) -> Result<()> {
    if branches.is_empty() {
        return Ok(());
    }
    let mut barrier = JoinBarrier::new(branches.len());
    let mut pending: FuturesUnordered<_> = branches.into_iter().collect();
    while let Some(result) = pending.next().await {
        barrier.record(result);
    }
    barrier.finish(op, model, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn failure(model: &str) -> BoError {
        BoError::DaoNotRegistered {
            model: model.to_string(),
        }
    }

    #[test]
    fn test_barrier_keeps_first_error_by_completion() {
        let mut barrier = JoinBarrier::new(3);
        barrier.record(Ok(()));
        barrier.record(Err(failure("Second")));
        assert!(!barrier.is_complete());
        barrier.record(Err(failure("Third")));

        assert!(barrier.is_complete());
        assert_eq!(barrier.first_error().and_then(BoError::model), Some("Second"));
        assert_eq!(barrier.suppressed().len(), 1);

        let err = barrier
            .finish("fetch", "Order", &RequestContext::new())
            .unwrap_err();
        assert_eq!(err.model(), Some("Second"));
    }

    #[tokio::test]
    async fn test_every_branch_runs_after_a_failure() {
        let finished = AtomicUsize::new(0);
        let finished = &finished;
        let branches: Vec<BoxFuture<'_, Result<()>>> = vec![
            async move { Err(failure("Fast")) }.boxed(),
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed(),
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Err(failure("Slow"))
            }
            .boxed(),
        ];

        let err = join_branches("save", "Order", &RequestContext::new(), branches)
            .await
            .unwrap_err();
        assert_eq!(err.model(), Some("Fast"));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_join_resolves() {
        assert!(join_branches("fetch", "Order", &RequestContext::new(), Vec::new())
            .await
            .is_ok());
    }
}
