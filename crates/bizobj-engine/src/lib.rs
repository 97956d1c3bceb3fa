//! bizobj Engine - data portal orchestration
//!
//! Drives model graphs built with `bizobj-core` through their
//! create/fetch/insert/update/remove/execute lifecycle:
//! - `DataPortal`: authorization, DAO dispatch, copy-back and recursion
//!   into child objects and collections
//! - `join`: fan-out over sibling branches with a completion barrier
//! - `TransactionCoordinator`: begin/commit/rollback around root-level saves
//! - `EventBus`: `pre<Action>` / `post<Action>` lifecycle listeners
//! - `with_trace_id`: attach a caller's trace id to portal calls

pub mod data_portal;
pub mod events;
pub mod join;
pub mod trace;
pub mod transaction;

pub use data_portal::DataPortal;
pub use events::{EventBus, EventPhase, PortalEventArgs};
pub use join::{join_branches, JoinBarrier};
pub use trace::{current_trace_id, with_trace_id};
pub use transaction::TransactionCoordinator;
