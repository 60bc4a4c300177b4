//! Data shapes for the Metrics Sink.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// One completed (or failed) skill execution. Invariant: `input_tokens >= 0, output_tokens >=
/// 0, cost >= 0` — enforced by construction since every field is
/// unsigned/non-negative by type.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub skill_id: String,
    pub skill_name: String,
    pub profile: String,
    pub status: ExecutionStatus,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub duration: Duration,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// One phase's contribution to an execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseExecutionRecord {
    pub execution_id: String,
    pub phase_id: String,
    pub phase_name: String,
    pub provider: String,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub duration: Duration,
    pub cache_hit: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Roll-up over a [`TimeWindow`], optionally filtered down to one
/// provider/skill/model by the caller's query method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollupStats {
    pub total_executions: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub avg_duration: Duration,
    pub cache_hit_rate_percent: f64,
}
