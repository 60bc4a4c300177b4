//! `rusqlite`-backed implementation of the Metrics Sink.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection};
use skillrunner_common::EngineError;

use super::types::{ExecutionRecord, ExecutionStatus, PhaseExecutionRecord, RollupStats, TimeWindow};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS execution_records (
    execution_id TEXT PRIMARY KEY,
    skill_id TEXT NOT NULL,
    skill_name TEXT NOT NULL,
    profile TEXT NOT NULL,
    status TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    cost REAL NOT NULL,
    duration_ms INTEGER NOT NULL,
    cache_hits INTEGER NOT NULL,
    cache_misses INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_execution_records_completed_at ON execution_records(completed_at);
CREATE INDEX IF NOT EXISTS idx_execution_records_skill ON execution_records(skill_id);

CREATE TABLE IF NOT EXISTS phase_execution_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    phase_id TEXT NOT NULL,
    phase_name TEXT NOT NULL,
    provider TEXT NOT NULL,
    model_id TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    cost REAL NOT NULL,
    duration_ms INTEGER NOT NULL,
    cache_hit INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_phase_execution_records_execution ON phase_execution_records(execution_id);
CREATE INDEX IF NOT EXISTS idx_phase_execution_records_provider ON phase_execution_records(provider);
CREATE INDEX IF NOT EXISTS idx_phase_execution_records_model ON phase_execution_records(model_id);
";

pub struct MetricsSink {
    conn: Mutex<Connection>,
}

impl MetricsSink {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path).map_err(|e| EngineError::internal("failed to open metrics database").with_cause(e))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::internal("failed to open in-memory metrics database").with_cause(e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| EngineError::internal("failed to migrate metrics database").with_cause(e))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn record_execution(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("metrics connection poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO execution_records
                (execution_id, skill_id, skill_name, profile, status, input_tokens, output_tokens,
                 cost, duration_ms, cache_hits, cache_misses, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.execution_id,
                record.skill_id,
                record.skill_name,
                record.profile,
                record.status.as_str(),
                record.input_tokens as i64,
                record.output_tokens as i64,
                record.cost,
                record.duration.as_millis() as i64,
                record.cache_hits as i64,
                record.cache_misses as i64,
                record.started_at.to_rfc3339(),
                record.completed_at.to_rfc3339(),
            ],
        )
        .map_err(|e| EngineError::internal("execution record insert failed").with_cause(e))?;
        Ok(())
    }

    pub fn record_phase(&self, record: &PhaseExecutionRecord) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("metrics connection poisoned");
        conn.execute(
            "INSERT INTO phase_execution_records
                (execution_id, phase_id, phase_name, provider, model_id, input_tokens, output_tokens,
                 cost, duration_ms, cache_hit, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.execution_id,
                record.phase_id,
                record.phase_name,
                record.provider,
                record.model_id,
                record.input_tokens as i64,
                record.output_tokens as i64,
                record.cost,
                record.duration.as_millis() as i64,
                record.cache_hit as i64,
                record.recorded_at.to_rfc3339(),
            ],
        )
        .map_err(|e| EngineError::internal("phase execution record insert failed").with_cause(e))?;
        Ok(())
    }

    /// `totals_for_window` — overall roll-up across every execution
    /// completed inside `window`.
    pub fn totals_for_window(&self, window: TimeWindow) -> Result<RollupStats, EngineError> {
        let conn = self.conn.lock().expect("metrics connection poisoned");
        let (total, success, failed, in_tok, out_tok, cost, avg_ms, hits, misses): (
            i64,
            i64,
            i64,
            i64,
            i64,
            f64,
            f64,
            i64,
            i64,
        ) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(input_tokens), 0),
                        COALESCE(SUM(output_tokens), 0),
                        COALESCE(SUM(cost), 0.0),
                        COALESCE(AVG(duration_ms), 0.0),
                        COALESCE(SUM(cache_hits), 0),
                        COALESCE(SUM(cache_misses), 0)
                 FROM execution_records WHERE completed_at BETWEEN ?1 AND ?2",
                params![window.start.to_rfc3339(), window.end.to_rfc3339()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                },
            )
            .map_err(|e| EngineError::internal("totals_for_window query failed").with_cause(e))?;

        let lookups = hits + misses;
        Ok(RollupStats {
            total_executions: total.max(0) as u64,
            success_count: success.max(0) as u64,
            failed_count: failed.max(0) as u64,
            total_input_tokens: in_tok.max(0) as u64,
            total_output_tokens: out_tok.max(0) as u64,
            total_cost: cost.max(0.0),
            avg_duration: Duration::from_millis(avg_ms.max(0.0) as u64),
            cache_hit_rate_percent: if lookups == 0 { 0.0 } else { (hits as f64 / lookups as f64) * 100.0 },
        })
    }

    pub fn by_skill(&self, window: TimeWindow) -> Result<Vec<(String, RollupStats)>, EngineError> {
        let conn = self.conn.lock().expect("metrics connection poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT skill_id, COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(input_tokens), 0), COALESCE(SUM(output_tokens), 0),
                        COALESCE(SUM(cost), 0.0), COALESCE(AVG(duration_ms), 0.0),
                        COALESCE(SUM(cache_hits), 0), COALESCE(SUM(cache_misses), 0)
                 FROM execution_records WHERE completed_at BETWEEN ?1 AND ?2
                 GROUP BY skill_id ORDER BY skill_id",
            )
            .map_err(|e| EngineError::internal("by_skill query failed").with_cause(e))?;
        let rows = stmt
            .query_map(params![window.start.to_rfc3339(), window.end.to_rfc3339()], |row| {
                let key: String = row.get(0)?;
                let total: i64 = row.get(1)?;
                let success: i64 = row.get(2)?;
                let failed: i64 = row.get(3)?;
                let in_tok: i64 = row.get(4)?;
                let out_tok: i64 = row.get(5)?;
                let cost: f64 = row.get(6)?;
                let avg_ms: f64 = row.get(7)?;
                let hits: i64 = row.get(8)?;
                let misses: i64 = row.get(9)?;
                let lookups = hits + misses;
                Ok((
                    key,
                    RollupStats {
                        total_executions: total.max(0) as u64,
                        success_count: success.max(0) as u64,
                        failed_count: failed.max(0) as u64,
                        total_input_tokens: in_tok.max(0) as u64,
                        total_output_tokens: out_tok.max(0) as u64,
                        total_cost: cost.max(0.0),
                        avg_duration: Duration::from_millis(avg_ms.max(0.0) as u64),
                        cache_hit_rate_percent: if lookups == 0 { 0.0 } else { (hits as f64 / lookups as f64) * 100.0 },
                    },
                ))
            })
            .map_err(|e| EngineError::internal("by_skill query failed").with_cause(e))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| EngineError::internal("by_skill row failed").with_cause(e))?);
        }
        Ok(out)
    }

    fn by_phase_column(&self, column: &str, window: TimeWindow) -> Result<Vec<(String, RollupStats)>, EngineError> {
        let conn = self.conn.lock().expect("metrics connection poisoned");
        let sql = format!(
            "SELECT p.{column},
                    COUNT(DISTINCT p.execution_id),
                    COUNT(DISTINCT CASE WHEN e.status = 'success' THEN p.execution_id END),
                    COUNT(DISTINCT CASE WHEN e.status = 'failed' THEN p.execution_id END),
                    COALESCE(SUM(p.input_tokens), 0), COALESCE(SUM(p.output_tokens), 0),
                    COALESCE(SUM(p.cost), 0.0), COALESCE(AVG(p.duration_ms), 0.0),
                    COALESCE(SUM(p.cache_hit), 0), COUNT(*)
             FROM phase_execution_records p
             JOIN execution_records e ON e.execution_id = p.execution_id
             WHERE e.completed_at BETWEEN ?1 AND ?2
             GROUP BY p.{column} ORDER BY p.{column}"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| EngineError::internal("metrics breakdown query failed").with_cause(e))?;
        let rows = stmt
            .query_map(params![window.start.to_rfc3339(), window.end.to_rfc3339()], |row| {
                let key: String = row.get(0)?;
                let total: i64 = row.get(1)?;
                let success: i64 = row.get(2)?;
                let failed: i64 = row.get(3)?;
                let in_tok: i64 = row.get(4)?;
                let out_tok: i64 = row.get(5)?;
                let cost: f64 = row.get(6)?;
                let avg_ms: f64 = row.get(7)?;
                let hits: i64 = row.get(8)?;
                let phase_count: i64 = row.get(9)?;
                Ok((
                    key,
                    RollupStats {
                        total_executions: total.max(0) as u64,
                        success_count: success.max(0) as u64,
                        failed_count: failed.max(0) as u64,
                        total_input_tokens: in_tok.max(0) as u64,
                        total_output_tokens: out_tok.max(0) as u64,
                        total_cost: cost.max(0.0),
                        avg_duration: Duration::from_millis(avg_ms.max(0.0) as u64),
                        cache_hit_rate_percent: if phase_count == 0 { 0.0 } else { (hits as f64 / phase_count as f64) * 100.0 },
                    },
                ))
            })
            .map_err(|e| EngineError::internal("metrics breakdown query failed").with_cause(e))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| EngineError::internal("metrics breakdown row failed").with_cause(e))?);
        }
        Ok(out)
    }

    pub fn by_provider(&self, window: TimeWindow) -> Result<Vec<(String, RollupStats)>, EngineError> {
        self.by_phase_column("provider", window)
    }

    pub fn by_model(&self, window: TimeWindow) -> Result<Vec<(String, RollupStats)>, EngineError> {
        self.by_phase_column("model_id", window)
    }
}
