//! The Metrics Sink: durable per-phase and per-execution rows, plus
//! roll-up queries, backed by `rusqlite` since the engine's
//! executions/phases are already rows in a database.

mod sink;
mod types;

pub use sink::MetricsSink;
pub use types::{ExecutionRecord, ExecutionStatus, PhaseExecutionRecord, RollupStats, TimeWindow};
