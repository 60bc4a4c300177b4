//! The Workflow Checkpoint Store: a durable, queryable progress record
//! per skill execution supporting crash recovery.
//!
//! Backed by `rusqlite` — one schema string, one row struct per table, a
//! `Mutex<Connection>` guarding single-row writes so the core never needs
//! its own transaction manager.

mod store;
mod types;

pub use store::CheckpointStore;
pub use types::{CheckpointFilter, CheckpointStatus, PhaseResultData, WorkflowCheckpoint};
