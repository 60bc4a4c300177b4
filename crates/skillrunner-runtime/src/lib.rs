//! Durable stores for the skillrunner engine: the
//! Response Cache, the Workflow Checkpoint Store and the Metrics Sink.
//! Each is independently testable in-memory; the engine is the only
//! caller that wires all three together.

pub mod cache;
pub mod checkpoint;
pub mod metrics;
