//! Run ledger tables
//!
//! Append-only audit records: one row per run, per step and per issue.
//! Created idempotently; the engine writes here but never reads back
//! within the same run.

use crate::Result;
use sqlx::SqlitePool;

/// Ledger table names
pub const RUN_TABLE: &str = "etl_run";
pub const RUN_STEP_TABLE: &str = "etl_run_step";
pub const RUN_ISSUE_TABLE: &str = "etl_run_issue";

/// Create all ledger tables if they do not exist
pub async fn create_ledger_tables(pool: &SqlitePool) -> Result<()> {
    create_run_table(pool).await?;
    create_run_step_table(pool).await?;
    create_run_issue_table(pool).await?;
    Ok(())
}

async fn create_run_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etl_run (
            run_id TEXT PRIMARY KEY,
            job_name TEXT NOT NULL,
            mode TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TIMESTAMP NOT NULL,
            ended_at TIMESTAMP,
            message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_run_step_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etl_run_step (
            run_id TEXT NOT NULL REFERENCES etl_run(run_id),
            step_seq INTEGER NOT NULL,
            step_name TEXT NOT NULL,
            status TEXT NOT NULL,
            rows_inserted INTEGER NOT NULL DEFAULT 0,
            rows_updated INTEGER NOT NULL DEFAULT 0,
            rows_deleted INTEGER NOT NULL DEFAULT 0,
            input_sources TEXT NOT NULL DEFAULT '[]',
            output_tables TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            error_message TEXT,
            started_at TIMESTAMP NOT NULL,
            ended_at TIMESTAMP,
            PRIMARY KEY (run_id, step_seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_run_issue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etl_run_issue (
            issue_id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES etl_run(run_id),
            step_name TEXT,
            source_kind TEXT NOT NULL,
            source_id TEXT NOT NULL,
            issue_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_etl_run_issue_run ON etl_run_issue(run_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, SchemaIntrospector};

    #[tokio::test]
    async fn test_create_ledger_tables_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();

        create_ledger_tables(&pool).await.unwrap();
        create_ledger_tables(&pool).await.unwrap();

        for table in [RUN_TABLE, RUN_STEP_TABLE, RUN_ISSUE_TABLE] {
            assert!(
                SchemaIntrospector::object_exists(&pool, table).await.unwrap(),
                "missing ledger table {}",
                table
            );
        }
    }
}
