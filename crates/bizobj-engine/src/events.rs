//! Lifecycle events
//!
//! Every portal action raises `pre<Action>` before its DAO call and
//! `post<Action>` once the node (and its subtree) is done, for instance
//! `preInsert` / `postInsert`. Listeners observe only: a listener that fails
//! or panics is logged and ignored.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use bizobj_core::PortalAction;
use bizobj_core_types::{RequestId, TraceId};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Pre,
    Post,
}

impl EventPhase {
    /// Event name for `action`: `preFetch`, `postRemove`, ...
    pub fn event_name(&self, action: PortalAction) -> String {
        let prefix = match self {
            EventPhase::Pre => "pre",
            EventPhase::Post => "post",
        };
        let action = action.as_str();
        let mut chars = action.chars();
        match chars.next() {
            Some(first) => format!("{prefix}{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => prefix.to_string(),
        }
    }
}

/// What a listener is told
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalEventArgs {
    pub model: String,
    /// Named query or command method, when the action has one
    pub method: Option<String>,
    pub event: String,
    pub phase: EventPhase,
    pub action: PortalAction,
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
}

type Listener = Arc<dyn Fn(&PortalEventArgs) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    model: String,
    event: String,
    method: Option<String>,
    listener: Listener,
}

impl Subscription {
    fn matches(&self, args: &PortalEventArgs) -> bool {
        self.model == args.model
            && self.event == args.event
            && self
                .method
                .as_deref()
                .map_or(true, |m| args.method.as_deref() == Some(m))
    }
}

/// Listener registry shared by a data portal; clones share subscriptions
#[derive(Clone, Default)]
pub struct EventBus {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for `event` (e.g. `"preInsert"`) on `model`
    pub fn subscribe<F>(&self, model: impl Into<String>, event: impl Into<String>, listener: F)
    where
        F: Fn(&PortalEventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(Subscription {
            model: model.into(),
            event: event.into(),
            method: None,
            listener: Arc::new(listener),
        });
    }

    /// Like `subscribe`, restricted to one named query or command method
    pub fn subscribe_method<F>(
        &self,
        model: impl Into<String>,
        event: impl Into<String>,
        method: impl Into<String>,
        listener: F,
    ) where
        F: Fn(&PortalEventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(Subscription {
            model: model.into(),
            event: event.into(),
            method: Some(method.into()),
            listener: Arc::new(listener),
        });
    }

    fn push(&self, subscription: Subscription) {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(|poisoned| {
            tracing::warn!(
                component = module_path!(),
                model = subscription.model.as_str(),
                event = subscription.event.as_str(),
                "event registry lock poisoned; recovering"
            );
            PoisonError::into_inner(poisoned)
        });
        subscriptions.push(subscription);
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `args` to every matching listener; returns how many ran
    ///
    /// Listeners are called after the registry lock is released, so they may
    /// subscribe further listeners.
    pub fn emit(&self, args: &PortalEventArgs) -> usize {
        let listeners: Vec<Listener> = {
            let subscriptions = self.subscriptions.read().unwrap_or_else(|poisoned| {
                tracing::warn!(
                    component = module_path!(),
                    model = args.model.as_str(),
                    event = args.event.as_str(),
                    "event registry lock poisoned; recovering"
                );
                PoisonError::into_inner(poisoned)
            });
            subscriptions
                .iter()
                .filter(|s| s.matches(args))
                .map(|s| s.listener.clone())
                .collect()
        };

        for listener in &listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(args))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(
                        component = module_path!(),
                        model = args.model.as_str(),
                        event = args.event.as_str(),
                        request_id = %args.request_id,
                        error = %err,
                        "event listener failed"
                    );
                }
                Err(payload) => {
                    tracing::warn!(
                        component = module_path!(),
                        model = args.model.as_str(),
                        event = args.event.as_str(),
                        request_id = %args.request_id,
                        error = panic_message(payload.as_ref()),
                        "event listener panicked"
                    );
                }
            }
        }
        listeners.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(model: &str, event: &str, method: Option<&str>) -> PortalEventArgs {
        PortalEventArgs {
            model: model.to_string(),
            method: method.map(str::to_string),
            event: event.to_string(),
            phase: EventPhase::Pre,
            action: PortalAction::Fetch,
            request_id: RequestId::new(),
            trace_id: None,
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventPhase::Pre.event_name(PortalAction::Insert), "preInsert");
        assert_eq!(EventPhase::Post.event_name(PortalAction::Fetch), "postFetch");
    }

    #[test]
    fn test_delivery_by_model_event_and_method() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        bus.subscribe("Order", "preFetch", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let h = hits.clone();
        bus.subscribe_method("Order", "preFetch", "byVendor", move |_| {
            h.fetch_add(10, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.emit(&args("Order", "preFetch", None)), 1);
        assert_eq!(bus.emit(&args("Order", "preFetch", Some("byVendor"))), 2);
        assert_eq!(bus.emit(&args("Order", "postFetch", None)), 0);
        assert_eq!(bus.emit(&args("Vendor", "preFetch", None)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_failing_listener_is_swallowed() {
        let bus = EventBus::new();
        let later = Arc::new(AtomicUsize::new(0));
        bus.subscribe("Order", "postInsert", |_| Err(anyhow::anyhow!("listener broke")));
        let l = later.clone();
        bus.subscribe("Order", "postInsert", move |_| {
            l.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.emit(&args("Order", "postInsert", None)), 2);
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let bus = EventBus::new();
        let later = Arc::new(AtomicUsize::new(0));
        bus.subscribe("Order", "preInsert", |_| panic!("listener blew up"));
        let l = later.clone();
        bus.subscribe("Order", "preInsert", move |_| {
            l.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.emit(&args("Order", "preInsert", None)), 2);
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poisoned_registry_still_accepts_subscriptions() {
        let bus = EventBus::new();
        let registry = bus.subscriptions.clone();
        let _ = std::thread::spawn(move || {
            let _guard = registry.write().unwrap();
            panic!("poison the registry");
        })
        .join();
        assert!(bus.subscriptions.is_poisoned());

        bus.subscribe("Order", "preInsert", |_| Ok(()));

        assert_eq!(bus.emit(&args("Order", "preInsert", None)), 1);
    }
}
