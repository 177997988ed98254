use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use vigil_common::types::AlarmLevel;
use vigil_rules::rules::operation_gap::OperationGapRule;
use vigil_rules::rules::threshold_window::ThresholdWindowRule;
use vigil_rules::storage::RuleStorage;
use vigil_rules::AnalyzeRule;

const RULES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analyze_rules (
    id TEXT PRIMARY KEY,
    rule_name TEXT NOT NULL,
    program_name TEXT NOT NULL,
    operation_name TEXT NOT NULL DEFAULT '',
    rule_type TEXT NOT NULL,
    alarm_level TEXT NOT NULL,
    alarm_message TEXT NOT NULL,
    config_json TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rules_program ON analyze_rules(program_name);
";

/// One stored rule definition.
#[derive(Debug, Clone)]
pub struct AnalyzeRuleRow {
    pub id: String,
    pub rule_name: String,
    pub program_name: String,
    pub operation_name: String,
    pub rule_type: String,
    pub alarm_level: String,
    pub alarm_message: String,
    pub config_json: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---- Per-rule-type config JSON schemas ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdWindowConfig {
    pub threshold: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub failures_only: bool,
}

fn default_window_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationGapConfig {
    pub max_gap_secs: u64,
}

// ---- DB row -> AnalyzeRule trait object ----

/// Convert a single [`AnalyzeRuleRow`] into a rule instance.
pub fn build_rule_from_row(row: &AnalyzeRuleRow) -> Result<Arc<dyn AnalyzeRule>> {
    let level: AlarmLevel = row
        .alarm_level
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{e}"))?;
    match row.rule_type.as_str() {
        "threshold_window" => {
            let cfg: ThresholdWindowConfig = serde_json::from_str(&row.config_json)
                .map_err(|e| anyhow::anyhow!("invalid threshold_window config: {e}"))?;
            Ok(Arc::new(ThresholdWindowRule::new(
                &row.rule_name,
                &row.program_name,
                &row.operation_name,
                level,
                &row.alarm_message,
                cfg.threshold,
                Duration::seconds(cfg.window_secs as i64),
                cfg.failures_only,
            )))
        }
        "operation_gap" => {
            let cfg: OperationGapConfig = serde_json::from_str(&row.config_json)
                .map_err(|e| anyhow::anyhow!("invalid operation_gap config: {e}"))?;
            Ok(Arc::new(OperationGapRule::new(
                &row.rule_name,
                &row.program_name,
                &row.operation_name,
                level,
                &row.alarm_message,
                Duration::seconds(cfg.max_gap_secs as i64),
            )))
        }
        other => Err(anyhow::anyhow!("unknown rule type: {other}")),
    }
}

/// Convert multiple rows, skipping invalid ones with warnings.
pub fn build_rules_from_rows(rows: &[AnalyzeRuleRow]) -> Vec<Arc<dyn AnalyzeRule>> {
    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        match build_rule_from_row(row) {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(
                    rule_id = %row.id,
                    rule_name = %row.rule_name,
                    rule_type = %row.rule_type,
                    error = %e,
                    "Skipping invalid analyze rule"
                );
            }
        }
    }
    rules
}

/// SQLite-backed rule storage.
///
/// The engine only reads from it; the insert/delete surface exists for
/// operator tooling that installs rule definitions. Every fetch builds
/// fresh rule instances from rows, so evaluation state is never shared
/// with a previous generation.
pub struct SqliteRuleStore {
    conn: Mutex<Connection>,
}

impl SqliteRuleStore {
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(RULES_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(RULES_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_rule(&self, row: &AnalyzeRuleRow) -> Result<()> {
        self.lock_conn().execute(
            "INSERT OR REPLACE INTO analyze_rules
                (id, rule_name, program_name, operation_name, rule_type,
                 alarm_level, alarm_message, config_json, enabled,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                row.id,
                row.rule_name,
                row.program_name,
                row.operation_name,
                row.rule_type,
                row.alarm_level,
                row.alarm_message,
                row.config_json,
                row.enabled,
                row.created_at.timestamp_millis(),
                row.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_rule(&self, id: &str) -> Result<bool> {
        let deleted = self
            .lock_conn()
            .execute("DELETE FROM analyze_rules WHERE id = ?1", rusqlite::params![id])?;
        Ok(deleted > 0)
    }

    fn query_rows(&self, program_name: Option<&str>) -> Result<Vec<AnalyzeRuleRow>> {
        let conn = self.lock_conn();
        let (sql, params): (&str, Vec<&dyn rusqlite::ToSql>) = match program_name {
            Some(ref program) => (
                "SELECT id, rule_name, program_name, operation_name, rule_type,
                        alarm_level, alarm_message, config_json, enabled,
                        created_at, updated_at
                 FROM analyze_rules WHERE enabled = 1 AND program_name = ?1
                 ORDER BY rule_name",
                vec![program],
            ),
            None => (
                "SELECT id, rule_name, program_name, operation_name, rule_type,
                        alarm_level, alarm_message, config_json, enabled,
                        created_at, updated_at
                 FROM analyze_rules WHERE enabled = 1
                 ORDER BY program_name, rule_name",
                vec![],
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok(AnalyzeRuleRow {
                id: row.get(0)?,
                rule_name: row.get(1)?,
                program_name: row.get(2)?,
                operation_name: row.get(3)?,
                rule_type: row.get(4)?,
                alarm_level: row.get(5)?,
                alarm_message: row.get(6)?,
                config_json: row.get(7)?,
                enabled: row.get(8)?,
                created_at: DateTime::from_timestamp_millis(row.get(9)?)
                    .unwrap_or_else(Utc::now),
                updated_at: DateTime::from_timestamp_millis(row.get(10)?)
                    .unwrap_or_else(Utc::now),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl RuleStorage for SqliteRuleStore {
    async fn get_all_rules(&self) -> Result<Vec<Arc<dyn AnalyzeRule>>> {
        Ok(build_rules_from_rows(&self.query_rows(None)?))
    }

    async fn get_rules_for_program(
        &self,
        program_name: &str,
    ) -> Result<Vec<Arc<dyn AnalyzeRule>>> {
        Ok(build_rules_from_rows(&self.query_rows(Some(program_name))?))
    }
}
