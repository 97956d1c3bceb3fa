//! bizobj Store - in-memory persistence adapter
//!
//! Provides:
//! - `MemoryStore`: named tables of records with snapshot/restore
//! - `MemoryDao`: a configurable `Dao` over one table
//! - `MemoryConnectionProvider`: transactions as store snapshots
//! - `DaoCallLog` / `TxLog`: journals of every call, for assertions
//!
//! Meant for tests and as a template for real adapters. One writer at a
//! time: a rollback restores the whole store to its state at `begin`.

pub mod connection;
pub mod dao;
pub mod journal;
pub mod store;

pub use connection::MemoryConnectionProvider;
pub use dao::MemoryDao;
pub use journal::{DaoCall, DaoCallLog, TxEvent, TxEventKind, TxLog};
pub use store::{MemoryStore, StoreState};
