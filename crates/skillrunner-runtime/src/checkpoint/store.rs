//! `rusqlite`-backed implementation of the Workflow Checkpoint Store.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use skillrunner_common::{Clock, EngineError};

use super::types::{CheckpointFilter, CheckpointStatus, WorkflowCheckpoint};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    skill_id TEXT NOT NULL,
    skill_name TEXT NOT NULL,
    input TEXT NOT NULL,
    input_hash TEXT NOT NULL,
    completed_batch INTEGER NOT NULL,
    total_batches INTEGER NOT NULL,
    phase_results TEXT NOT NULL,
    phase_outputs TEXT NOT NULL,
    status TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    machine_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_skill_input ON checkpoints(skill_id, input_hash);
CREATE INDEX IF NOT EXISTS idx_checkpoints_machine ON checkpoints(machine_id);
CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints(status);
CREATE INDEX IF NOT EXISTS idx_checkpoints_execution ON checkpoints(execution_id);
";

pub struct CheckpointStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<(WorkflowCheckpoint, String, String)> {
    let status_raw: String = row.get(10)?;
    let phase_results_json: String = row.get(8)?;
    let phase_outputs_json: String = row.get(9)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    let cp = WorkflowCheckpoint {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        skill_id: row.get(2)?,
        skill_name: row.get(3)?,
        input: row.get(4)?,
        input_hash: row.get(5)?,
        completed_batch: row.get(6)?,
        total_batches: row.get::<_, i64>(7)? as u32,
        phase_results: Default::default(),
        phase_outputs: Default::default(),
        status: CheckpointStatus::parse(&status_raw).unwrap_or(CheckpointStatus::InProgress),
        input_tokens: row.get::<_, i64>(11)? as u32,
        output_tokens: row.get::<_, i64>(12)? as u32,
        machine_id: row.get(13)?,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
    };
    Ok((cp, phase_results_json, phase_outputs_json))
}

fn finish_checkpoint(partial: (WorkflowCheckpoint, String, String)) -> Result<WorkflowCheckpoint, EngineError> {
    let (mut cp, results_json, outputs_json) = partial;
    cp.phase_results = serde_json::from_str(&results_json)
        .map_err(|e| EngineError::internal("corrupt checkpoint phase_results").with_cause(e))?;
    cp.phase_outputs = serde_json::from_str(&outputs_json)
        .map_err(|e| EngineError::internal("corrupt checkpoint phase_outputs").with_cause(e))?;
    Ok(cp)
}

const SELECT_COLUMNS: &str = "id, execution_id, skill_id, skill_name, input, input_hash, completed_batch, total_batches, phase_results, phase_outputs, status, input_tokens, output_tokens, machine_id, created_at, updated_at";

impl CheckpointStore {
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let conn = Connection::open(path)
            .map_err(|e| EngineError::internal("failed to open checkpoint database").with_cause(e))?;
        Self::from_connection(conn, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::internal("failed to open in-memory checkpoint database").with_cause(e))?;
        Self::from_connection(conn, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| EngineError::internal("failed to migrate checkpoint database").with_cause(e))?;
        Ok(Self { conn: Mutex::new(conn), clock })
    }

    fn insert_row(conn: &Connection, cp: &WorkflowCheckpoint) -> Result<(), EngineError> {
        let phase_results = serde_json::to_string(&cp.phase_results)
            .map_err(|e| EngineError::internal("failed to serialize phase_results").with_cause(e))?;
        let phase_outputs = serde_json::to_string(&cp.phase_outputs)
            .map_err(|e| EngineError::internal("failed to serialize phase_outputs").with_cause(e))?;

        conn.execute(
            "INSERT OR REPLACE INTO checkpoints
                (id, execution_id, skill_id, skill_name, input, input_hash, completed_batch, total_batches,
                 phase_results, phase_outputs, status, input_tokens, output_tokens, machine_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                cp.id,
                cp.execution_id,
                cp.skill_id,
                cp.skill_name,
                cp.input,
                cp.input_hash,
                cp.completed_batch,
                cp.total_batches as i64,
                phase_results,
                phase_outputs,
                cp.status.as_str(),
                cp.input_tokens as i64,
                cp.output_tokens as i64,
                cp.machine_id,
                cp.created_at.to_rfc3339(),
                cp.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| EngineError::internal("checkpoint upsert failed").with_cause(e))?;
        Ok(())
    }

    /// `create` — rejects a duplicate id.
    pub fn create(&self, checkpoint: &WorkflowCheckpoint) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let exists: bool = conn
            .query_row("SELECT 1 FROM checkpoints WHERE id = ?1", params![checkpoint.id], |_| Ok(()))
            .optional()
            .map_err(|e| EngineError::internal("checkpoint existence check failed").with_cause(e))?
            .is_some();
        if exists {
            return Err(EngineError::validation(format!(
                "checkpoint '{}' already exists",
                checkpoint.id
            )));
        }
        Self::insert_row(&conn, checkpoint)
    }

    pub fn get(&self, id: &str) -> Result<Option<WorkflowCheckpoint>, EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let row = conn
            .query_row(&format!("SELECT {SELECT_COLUMNS} FROM checkpoints WHERE id = ?1"), params![id], row_to_checkpoint)
            .optional()
            .map_err(|e| EngineError::internal("checkpoint lookup failed").with_cause(e))?;
        row.map(finish_checkpoint).transpose()
    }

    /// `get_latest_in_progress(skill_id, input_hash)` — the resume
    /// auto-detect primitive.
    pub fn get_latest_in_progress(&self, skill_id: &str, input_hash: &str) -> Result<Option<WorkflowCheckpoint>, EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM checkpoints
                     WHERE skill_id = ?1 AND input_hash = ?2 AND status = 'in_progress'
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![skill_id, input_hash],
                row_to_checkpoint,
            )
            .optional()
            .map_err(|e| EngineError::internal("checkpoint resume lookup failed").with_cause(e))?;
        row.map(finish_checkpoint).transpose()
    }

    /// `get_by_execution(execution_id)` ordered by `updated_at desc`.
    pub fn get_by_execution(&self, execution_id: &str) -> Result<Vec<WorkflowCheckpoint>, EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM checkpoints WHERE execution_id = ?1 ORDER BY updated_at DESC"
            ))
            .map_err(|e| EngineError::internal("checkpoint query failed").with_cause(e))?;
        let rows = stmt
            .query_map(params![execution_id], row_to_checkpoint)
            .map_err(|e| EngineError::internal("checkpoint query failed").with_cause(e))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(finish_checkpoint(row.map_err(|e| EngineError::internal("checkpoint row failed").with_cause(e))?)?);
        }
        Ok(out)
    }

    /// `update` — must target an existing id; enforces the state
    /// machine's monotonicity and terminal-immutability invariants
    /// before overwriting mutable fields.
    pub fn update(&self, checkpoint: &WorkflowCheckpoint) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let existing = conn
            .query_row(&format!("SELECT {SELECT_COLUMNS} FROM checkpoints WHERE id = ?1"), params![checkpoint.id], row_to_checkpoint)
            .optional()
            .map_err(|e| EngineError::internal("checkpoint lookup failed").with_cause(e))?;
        let Some(existing) = existing.map(finish_checkpoint).transpose()? else {
            return Err(EngineError::not_found(format!("no checkpoint '{}' to update", checkpoint.id)));
        };

        if existing.status.is_terminal() {
            return Err(EngineError::validation(format!(
                "checkpoint '{}' is in terminal state '{}' and cannot be updated",
                checkpoint.id,
                existing.status.as_str()
            )));
        }
        if checkpoint.completed_batch < existing.completed_batch {
            return Err(EngineError::internal(format!(
                "checkpoint '{}' completed_batch would regress from {} to {}",
                checkpoint.id, existing.completed_batch, checkpoint.completed_batch
            )));
        }

        Self::insert_row(&conn, checkpoint)
    }

    pub fn list(&self, filter: &CheckpointFilter) -> Result<Vec<WorkflowCheckpoint>, EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(skill_id) = &filter.skill_id {
            clauses.push(format!("skill_id = ?{}", values.len() + 1));
            values.push(Box::new(skill_id.clone()));
        }
        if let Some(execution_id) = &filter.execution_id {
            clauses.push(format!("execution_id = ?{}", values.len() + 1));
            values.push(Box::new(execution_id.clone()));
        }
        if let Some(machine_id) = &filter.machine_id {
            clauses.push(format!("machine_id = ?{}", values.len() + 1));
            values.push(Box::new(machine_id.clone()));
        }
        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = statuses
                .iter()
                .map(|s| {
                    values.push(Box::new(s.as_str().to_string()));
                    format!("?{}", values.len())
                })
                .collect();
            clauses.push(format!("status IN ({})", placeholders.join(", ")));
        }
        if let Some(after) = filter.updated_after {
            clauses.push(format!("updated_at >= ?{}", values.len() + 1));
            values.push(Box::new(after.to_rfc3339()));
        }
        if let Some(before) = filter.updated_before {
            clauses.push(format!("updated_at <= ?{}", values.len() + 1));
            values.push(Box::new(before.to_rfc3339()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let limit = filter.limit.unwrap_or(u32::MAX) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        values.push(Box::new(limit));
        values.push(Box::new(offset));
        let limit_idx = values.len() - 1;
        let offset_idx = values.len();

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM checkpoints {where_clause} ORDER BY updated_at DESC LIMIT ?{} OFFSET ?{}",
            limit_idx, offset_idx
        );

        let mut stmt = conn.prepare(&sql).map_err(|e| EngineError::internal("checkpoint list query failed").with_cause(e))?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_checkpoint)
            .map_err(|e| EngineError::internal("checkpoint list query failed").with_cause(e))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_checkpoint(row.map_err(|e| EngineError::internal("checkpoint row failed").with_cause(e))?)?);
        }
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        conn.execute("DELETE FROM checkpoints WHERE id = ?1", params![id])
            .map_err(|e| EngineError::internal("checkpoint delete failed").with_cause(e))?;
        Ok(())
    }

    pub fn delete_by_execution(&self, execution_id: &str) -> Result<u64, EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let count = conn
            .execute("DELETE FROM checkpoints WHERE execution_id = ?1", params![execution_id])
            .map_err(|e| EngineError::internal("checkpoint delete_by_execution failed").with_cause(e))?;
        Ok(count as u64)
    }

    /// `mark_abandoned(machine_id) → count` — moves all `in_progress`
    /// rows for that machine to `abandoned`. Called once at process
    /// startup before any new executions.
    pub fn mark_abandoned(&self, machine_id: &str) -> Result<u64, EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let now = self.clock.now().to_rfc3339();
        let count = conn
            .execute(
                "UPDATE checkpoints SET status = 'abandoned', updated_at = ?1 WHERE machine_id = ?2 AND status = 'in_progress'",
                params![now, machine_id],
            )
            .map_err(|e| EngineError::internal("mark_abandoned failed").with_cause(e))?;
        Ok(count as u64)
    }

    /// `cleanup(older_than) → count` — deletes rows whose status is
    /// terminal and whose `updated_at` is older than the given duration.
    pub fn cleanup(&self, older_than: Duration) -> Result<u64, EngineError> {
        let conn = self.conn.lock().expect("checkpoint connection poisoned");
        let cutoff = self.clock.now()
            - chrono::Duration::from_std(older_than).map_err(|e| EngineError::internal("cleanup duration out of range").with_cause(e))?;
        let count = conn
            .execute(
                "DELETE FROM checkpoints WHERE status IN ('completed', 'failed', 'abandoned') AND updated_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| EngineError::internal("checkpoint cleanup failed").with_cause(e))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillrunner_common::test_clock_at;

    fn new_checkpoint(id: &str, skill_id: &str, machine_id: &str, now: DateTime<Utc>) -> WorkflowCheckpoint {
        WorkflowCheckpoint::new(id, format!("exec-{id}"), skill_id, "Skill Name", "the input", "hash123", 3, machine_id, now)
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        let cp = new_checkpoint("cp1", "skill-a", "machine-1", clock.now());
        store.create(&cp).unwrap();
        let err = store.create(&cp).unwrap_err();
        assert_eq!(err.kind, skillrunner_common::ErrorKind::Validation);
    }

    #[test]
    fn get_latest_in_progress_finds_resumable_checkpoint() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        let cp = new_checkpoint("cp1", "skill-a", "machine-1", clock.now());
        store.create(&cp).unwrap();

        let found = store.get_latest_in_progress("skill-a", "hash123").unwrap().unwrap();
        assert_eq!(found.id, "cp1");
        assert!(store.get_latest_in_progress("skill-b", "hash123").unwrap().is_none());
    }

    #[test]
    fn update_rejects_regressing_completed_batch() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        let mut cp = new_checkpoint("cp1", "skill-a", "machine-1", clock.now());
        store.create(&cp).unwrap();

        cp.completed_batch = 1;
        store.update(&cp).unwrap();

        cp.completed_batch = 0;
        let err = store.update(&cp).unwrap_err();
        assert_eq!(err.kind, skillrunner_common::ErrorKind::Internal);
    }

    #[test]
    fn update_rejects_mutating_terminal_checkpoint() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        let mut cp = new_checkpoint("cp1", "skill-a", "machine-1", clock.now());
        store.create(&cp).unwrap();

        cp.status = CheckpointStatus::Completed;
        store.update(&cp).unwrap();

        cp.completed_batch = 2;
        let err = store.update(&cp).unwrap_err();
        assert_eq!(err.kind, skillrunner_common::ErrorKind::Validation);
    }

    #[test]
    fn mark_abandoned_only_touches_named_machine() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        store.create(&new_checkpoint("cp1", "skill-a", "machine-A", clock.now())).unwrap();
        store.create(&new_checkpoint("cp2", "skill-b", "machine-A", clock.now())).unwrap();
        store.create(&new_checkpoint("cp3", "skill-c", "machine-B", clock.now())).unwrap();

        let count = store.mark_abandoned("machine-A").unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.get("cp1").unwrap().unwrap().status, CheckpointStatus::Abandoned);
        assert_eq!(store.get("cp3").unwrap().unwrap().status, CheckpointStatus::InProgress);
    }

    #[test]
    fn cleanup_deletes_only_old_terminal_rows() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        let mut cp = new_checkpoint("cp1", "skill-a", "machine-1", clock.now());
        store.create(&cp).unwrap();
        cp.status = CheckpointStatus::Completed;
        store.update(&cp).unwrap();

        clock.advance(chrono::Duration::days(2));
        let removed = store.cleanup(Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("cp1").unwrap().is_none());
    }

    #[test]
    fn delete_by_execution_removes_matching_rows_and_counts() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        let mut cp = new_checkpoint("cp1", "skill-a", "machine-1", clock.now());
        cp.execution_id = "exec-shared".to_string();
        store.create(&cp).unwrap();

        let count = store.delete_by_execution("exec-shared").unwrap();
        assert_eq!(count, 1);
        assert!(store.get("cp1").unwrap().is_none());
    }

    #[test]
    fn list_filters_by_status_and_paginates() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        for i in 0..3 {
            store.create(&new_checkpoint(&format!("cp{i}"), "skill-a", "machine-1", clock.now())).unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }
        let filter = CheckpointFilter {
            statuses: Some(vec![CheckpointStatus::InProgress]),
            limit: Some(2),
            ..Default::default()
        };
        let page = store.list(&filter).unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn unicode_and_empty_map_checkpoints_round_trip() {
        let clock = test_clock_at(Utc::now());
        let store = CheckpointStore::open_in_memory(clock.clone()).unwrap();
        let mut cp = new_checkpoint("cp1", "skill-a", "machine-1", clock.now());
        cp.input = "héllo \"wörld\" <tag> 日本語".to_string();
        cp.phase_results.clear();
        cp.phase_outputs.clear();
        store.create(&cp).unwrap();

        let fetched = store.get("cp1").unwrap().unwrap();
        assert_eq!(fetched.input, cp.input);
        assert!(fetched.phase_results.is_empty());
        assert!(fetched.phase_outputs.is_empty());
    }
}
