//! Caller-supplied trace ids
//!
//! A root-level call made inside `with_trace_id` carries that id on its
//! request context, so it shows up on the call's log events and on every
//! lifecycle event the call raises.

use std::future::Future;

use bizobj_core_types::TraceId;

tokio::task_local! {
    static TRACE_ID: TraceId;
}

/// Run `fut` with `trace_id` attached to every portal call it makes
///
/// ```ignore
/// with_trace_id(TraceId::from_string(header), portal.save(&mut order)).await?;
/// ```
pub async fn with_trace_id<F: Future>(trace_id: TraceId, fut: F) -> F::Output {
    TRACE_ID.scope(trace_id, fut).await
}

/// Trace id of the enclosing `with_trace_id` scope
pub fn current_trace_id() -> Option<TraceId> {
    TRACE_ID.try_with(TraceId::clone).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trace_id_is_scoped() {
        assert_eq!(current_trace_id(), None);
        let seen = with_trace_id(TraceId::from_string("t-1".to_string()), async {
            current_trace_id()
        })
        .await;
        assert_eq!(seen, Some(TraceId::from_string("t-1".to_string())));
        assert_eq!(current_trace_id(), None);
    }
}
