use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use bizobj_core::{Record, Value};

/// Full contents of a store; cheap enough to clone for a snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    tables: HashMap<String, Vec<Record>>,
    sequences: HashMap<String, i64>,
}

/// Shared, in-memory tables of records
///
/// Clones share the same tables. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Next value of a table's key sequence, starting at 1
    ///
    /// # Errors
    ///
    /// Fails only if the store lock is poisoned.
    pub fn next_key(&self, table: &str) -> Result<i64> {
        let mut state = self.lock()?;
        let seq = state.sequences.entry(table.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    /// # Errors
    ///
    /// Fails only if the store lock is poisoned.
    pub fn insert(&self, table: &str, record: Record) -> Result<()> {
        let mut state = self.lock()?;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    /// Rows matching every field of `filter`
    ///
    /// # Errors
    ///
    /// Fails only if the store lock is poisoned.
    pub fn find(&self, table: &str, filter: &Record) -> Result<Vec<Record>> {
        let state = self.lock()?;
        Ok(state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| r.matches(filter)).cloned().collect())
            .unwrap_or_default())
    }

    /// Overwrite the fields of every matching row; returns the rows touched
    ///
    /// # Errors
    ///
    /// Fails when no row matches `filter`.
    pub fn update(&self, table: &str, filter: &Record, record: &Record) -> Result<usize> {
        let mut state = self.lock()?;
        let rows = state.tables.entry(table.to_string()).or_default();
        let mut touched = 0;
        for row in rows.iter_mut().filter(|r| r.matches(filter)) {
            for (field, value) in record.iter() {
                row.insert(field, value.clone());
            }
            touched += 1;
        }
        if touched == 0 {
            return Err(anyhow!("no {table} row matches {filter}"));
        }
        Ok(touched)
    }

    /// Delete every matching row; returns the rows deleted
    ///
    /// # Errors
    ///
    /// Fails when no row matches `filter`.
    pub fn delete(&self, table: &str, filter: &Record) -> Result<usize> {
        let mut state = self.lock()?;
        let rows = state.tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|r| !r.matches(filter));
        let deleted = before - rows.len();
        if deleted == 0 {
            return Err(anyhow!("no {table} row matches {filter}"));
        }
        Ok(deleted)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock()
            .map(|s| s.tables.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// # Errors
    ///
    /// Fails only if the store lock is poisoned.
    pub fn snapshot(&self) -> Result<StoreState> {
        Ok(self.lock()?.clone())
    }

    /// # Errors
    ///
    /// Fails only if the store lock is poisoned.
    pub fn restore(&self, snapshot: StoreState) -> Result<()> {
        *self.lock()? = snapshot;
        Ok(())
    }

    /// Seed a row directly, bypassing any DAO
    ///
    /// # Errors
    ///
    /// Fails only if the store lock is poisoned.
    pub fn seed<I, K, V>(&self, table: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.insert(table, fields.into_iter().collect())
    }
}
