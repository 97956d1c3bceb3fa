//! Call journals
//!
//! Every DAO call and every connection-provider round-trip is appended here
//! when it completes, so tests can assert counts and ordering.

use std::sync::{Arc, Mutex};

use bizobj_core::{PortalAction, Record};
use uuid::Uuid;

/// One completed DAO call
#[derive(Debug, Clone, PartialEq)]
pub struct DaoCall {
    pub model: String,
    pub action: PortalAction,
    /// Named query or command method
    pub method: Option<String>,
    /// Filter, key or record passed in
    pub payload: Record,
    pub connection: Uuid,
    pub transactional: bool,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DaoCallLog {
    calls: Arc<Mutex<Vec<DaoCall>>>,
}

impl DaoCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: DaoCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Completed calls in completion order
    pub fn calls(&self) -> Vec<DaoCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, action: PortalAction) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.action == action)
            .count()
    }

    pub fn count_for(&self, model: &str, action: PortalAction) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.model == model && c.action == action)
            .count()
    }

    /// Completion positions of every `action` call on `model`
    pub fn positions(&self, model: &str, action: PortalAction) -> Vec<usize> {
        self.calls()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.model == model && c.action == action)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEventKind {
    Open,
    Release,
    Begin,
    Commit,
    Rollback,
}

/// One completed connection-provider call
#[derive(Debug, Clone, PartialEq)]
pub struct TxEvent {
    pub kind: TxEventKind,
    pub data_source: String,
    pub connection: Uuid,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TxLog {
    events: Arc<Mutex<Vec<TxEvent>>>,
}

impl TxLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TxEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<TxEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event kinds in order, successful or not
    pub fn kinds(&self) -> Vec<TxEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: TxEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}
