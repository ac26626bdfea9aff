//! Run/issue ledger
//!
//! A `RunRecorder` accumulates run, step and issue records in memory and
//! appends them to the ledger tables once the run has an end state. The
//! ledger is a sink: nothing in the engine reads it back.

use crate::issue::{DriftIssue, SeverityCounts};
use chrono::{DateTime, Utc};
use courtdb_common::db::create_ledger_tables;
use courtdb_common::{Result, Severity};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Run status as stored in `etl_run.status`
///
/// `Failed` means validation found fatal issues; `Incomplete` means the run
/// was aborted by an infrastructure error before it could decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Incomplete,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// One step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub input_sources: Vec<String>,
    pub output_tables: Vec<String>,
    /// Free-form lineage data (fingerprints, match statistics)
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn begin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Succeeded,
            rows_inserted: 0,
            rows_updated: 0,
            rows_deleted: 0,
            input_sources: Vec::new(),
            output_tables: Vec::new(),
            metadata: serde_json::json!({}),
            error_message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn with_input(mut self, source: impl Into<String>) -> Self {
        self.input_sources.push(source.into());
        self
    }

    pub fn with_output(mut self, table: impl Into<String>) -> Self {
        self.output_tables.push(table.into());
        self
    }

    pub fn with_rows(mut self, inserted: u64, updated: u64, deleted: u64) -> Self {
        self.rows_inserted = inserted;
        self.rows_updated = updated;
        self.rows_deleted = deleted;
        self
    }

    /// Set one metadata key
    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Mark the step failed, or succeeded when its issues stay below the threshold
    pub fn judged(mut self, issues: &[DriftIssue], fatal_threshold: Severity) -> Self {
        if issues.iter().any(|i| i.is_fatal(fatal_threshold)) {
            self.status = StepStatus::Failed;
        }
        let counts = SeverityCounts::tally(issues);
        self.with_meta("issues", serde_json::json!(counts))
    }

    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.status = StepStatus::Skipped;
        self.error_message = Some(reason.into());
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = StepStatus::Failed;
        self.error_message = Some(message.into());
        self
    }

    pub fn end(mut self) -> Self {
        self.ended_at = Some(Utc::now());
        self
    }
}

/// In-memory record of one engine run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecorder {
    pub run_id: Uuid,
    pub job_name: String,
    pub mode: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    steps: Vec<StepRecord>,
    issues: Vec<DriftIssue>,
}

impl RunRecorder {
    pub fn start(job_name: impl Into<String>, mode: impl Into<String>) -> Self {
        let recorder = Self {
            run_id: Uuid::new_v4(),
            job_name: job_name.into(),
            mode: mode.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            message: None,
            steps: Vec::new(),
            issues: Vec::new(),
        };
        info!(
            run_id = %recorder.run_id,
            job = %recorder.job_name,
            mode = %recorder.mode,
            "Run started"
        );
        recorder
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn issues(&self) -> &[DriftIssue] {
        &self.issues
    }

    pub fn add_step(&mut self, step: StepRecord) {
        let step = if step.ended_at.is_none() { step.end() } else { step };
        debug!(
            run_id = %self.run_id,
            step = %step.name,
            status = step.status.as_str(),
            "Step recorded"
        );
        self.steps.push(step);
    }

    pub fn add_issues(&mut self, issues: impl IntoIterator<Item = DriftIssue>) {
        self.issues.extend(issues);
    }

    /// Set the end state; later calls overwrite earlier ones
    pub fn finish(&mut self, status: RunStatus, message: Option<String>) {
        self.status = status;
        self.message = message;
        self.ended_at = Some(Utc::now());
        let counts = SeverityCounts::tally(&self.issues);
        info!(
            run_id = %self.run_id,
            status = %status,
            steps = self.steps.len(),
            errors = counts.error,
            warnings = counts.warn,
            "Run finished"
        );
    }

    /// Append the run, its steps and its issues to the ledger tables
    ///
    /// Creates the tables when missing. Everything is written in one
    /// transaction so a run is either fully recorded or not at all.
    pub async fn persist(&self, pool: &SqlitePool) -> Result<()> {
        create_ledger_tables(pool).await?;

        let run_id = self.run_id.to_string();
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO etl_run (run_id, job_name, mode, status, started_at, ended_at, message)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run_id)
        .bind(&self.job_name)
        .bind(&self.mode)
        .bind(self.status.as_str())
        .bind(self.started_at.to_rfc3339())
        .bind(self.ended_at.map(|t| t.to_rfc3339()))
        .bind(&self.message)
        .execute(&mut *tx)
        .await?;

        for (seq, step) in self.steps.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO etl_run_step (
                    run_id, step_seq, step_name, status,
                    rows_inserted, rows_updated, rows_deleted,
                    input_sources, output_tables, metadata,
                    error_message, started_at, ended_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run_id)
            .bind(seq as i64 + 1)
            .bind(&step.name)
            .bind(step.status.as_str())
            .bind(step.rows_inserted as i64)
            .bind(step.rows_updated as i64)
            .bind(step.rows_deleted as i64)
            .bind(serde_json::to_string(&step.input_sources).unwrap_or_else(|_| "[]".to_string()))
            .bind(serde_json::to_string(&step.output_tables).unwrap_or_else(|_| "[]".to_string()))
            .bind(step.metadata.to_string())
            .bind(&step.error_message)
            .bind(step.started_at.to_rfc3339())
            .bind(step.ended_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        for issue in &self.issues {
            sqlx::query(
                r#"
                INSERT INTO etl_run_issue (
                    run_id, step_name, source_kind, source_id,
                    issue_type, severity, details, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run_id)
            .bind(&issue.step)
            .bind(issue.source_kind.as_str())
            .bind(&issue.source_id)
            .bind(issue.issue_type.as_str())
            .bind(issue.severity.as_str())
            .bind(issue.details.to_string())
            .bind(issue.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            run_id = %run_id,
            steps = self.steps.len(),
            issues = self.issues.len(),
            "Run recorded in ledger"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{IssueType, SourceKind};
    use courtdb_common::db::connect_in_memory;
    use serde_json::json;

    fn issue(severity: Severity) -> DriftIssue {
        let details = json!({ "row_count": 0 });
        DriftIssue::new(SourceKind::Table, "game", IssueType::EmptyTable, severity, details)
            .in_step("validate:summary")
    }

    #[test]
    fn test_step_judgement() {
        let issues = vec![issue(Severity::Warn)];
        let step = StepRecord::begin("validate").judged(&issues, Severity::Error);
        assert_eq!(step.status, StepStatus::Succeeded);
        assert_eq!(step.metadata["issues"]["warn"], 1);

        let step = StepRecord::begin("validate").judged(&issues, Severity::Warn);
        assert_eq!(step.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_persist_appends_run_steps_and_issues() {
        let pool = connect_in_memory().await.unwrap();

        let mut run = RunRecorder::start("preflight", "validate");
        run.add_step(
            StepRecord::begin("drift:player_box_scores")
                .with_input("stg_player_box_scores")
                .with_meta("fingerprint", json!("abc"))
                .with_rows(0, 0, 0),
        );
        run.add_step(StepRecord::begin("validate").with_output("etl_run_issue"));
        run.add_issues(vec![issue(Severity::Warn), issue(Severity::Error)]);
        run.finish(RunStatus::Failed, Some("1 fatal issue".to_string()));
        run.persist(&pool).await.unwrap();

        let (status, message): (String, Option<String>) =
            sqlx::query_as("SELECT status, message FROM etl_run WHERE run_id = ?")
                .bind(run.run_id.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "failed");
        assert_eq!(message.as_deref(), Some("1 fatal issue"));

        let steps: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT step_seq, step_name, input_sources FROM etl_run_step ORDER BY step_seq",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].0, 1);
        assert_eq!(steps[0].1, "drift:player_box_scores");
        assert_eq!(steps[0].2, "[\"stg_player_box_scores\"]");

        let severities: Vec<String> =
            sqlx::query_scalar("SELECT severity FROM etl_run_issue ORDER BY issue_id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(severities, vec!["warn", "error"]);
    }

    #[tokio::test]
    async fn test_runs_are_append_only() {
        let pool = connect_in_memory().await.unwrap();
        for _ in 0..2 {
            let mut run = RunRecorder::start("preflight", "validate");
            run.finish(RunStatus::Succeeded, None);
            run.persist(&pool).await.unwrap();
        }
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM etl_run").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 2);
    }
}
