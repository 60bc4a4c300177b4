//! Data shapes for the Workflow Checkpoint Store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `WorkflowCheckpoint.status` state machine: `InProgress`
/// is the only non-terminal state; the other three are immutable once
/// reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    Failed,
    Abandoned,
}

impl CheckpointStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckpointStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
            CheckpointStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(CheckpointStatus::InProgress),
            "completed" => Some(CheckpointStatus::Completed),
            "failed" => Some(CheckpointStatus::Failed),
            "abandoned" => Some(CheckpointStatus::Abandoned),
            _ => None,
        }
    }
}

/// One phase's recorded outcome inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResultData {
    pub phase_id: String,
    pub phase_name: String,
    pub status: String,
    pub output: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model_used: String,
    pub cache_hit: bool,
}

/// Durable progress record for one skill execution.
/// `completed_batch = -1` means no phase has completed yet;
/// `phase_outputs` is keyed by phase id, plus the sentinel `"_input"`
/// for the original input string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    pub id: String,
    pub execution_id: String,
    pub skill_id: String,
    pub skill_name: String,
    pub input: String,
    pub input_hash: String,
    pub completed_batch: i64,
    pub total_batches: u32,
    pub phase_results: HashMap<String, PhaseResultData>,
    pub phase_outputs: HashMap<String, String>,
    pub status: CheckpointStatus,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub machine_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowCheckpoint {
    pub fn new(
        id: impl Into<String>,
        execution_id: impl Into<String>,
        skill_id: impl Into<String>,
        skill_name: impl Into<String>,
        input: impl Into<String>,
        input_hash: impl Into<String>,
        total_batches: u32,
        machine_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let input = input.into();
        let mut phase_outputs = HashMap::new();
        phase_outputs.insert("_input".to_string(), input.clone());
        Self {
            id: id.into(),
            execution_id: execution_id.into(),
            skill_id: skill_id.into(),
            skill_name: skill_name.into(),
            input,
            input_hash: input_hash.into(),
            completed_batch: -1,
            total_batches,
            phase_results: HashMap::new(),
            phase_outputs,
            status: CheckpointStatus::InProgress,
            input_tokens: 0,
            output_tokens: 0,
            machine_id: machine_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Query filter for `CheckpointStore::list`.
#[derive(Debug, Clone, Default)]
pub struct CheckpointFilter {
    pub skill_id: Option<String>,
    pub execution_id: Option<String>,
    pub machine_id: Option<String>,
    pub statuses: Option<Vec<CheckpointStatus>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
