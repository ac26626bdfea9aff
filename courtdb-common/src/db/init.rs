//! Warehouse connection setup
//!
//! The engine needs a single connection (or a small pool) and no concurrent
//! writers. Read-only mode is used when the run ledger is disabled.

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Upper bound on pool size; the engine never needs more
pub const MAX_CONNECTIONS: u32 = 5;

/// Open the warehouse database
///
/// `read_only` opens with `mode=ro`; the file must already exist either way,
/// since the engine never creates a warehouse.
pub async fn connect_warehouse(db_path: &Path, read_only: bool) -> Result<SqlitePool> {
    if !db_path.exists() {
        return Err(Error::NotFound(format!(
            "Warehouse database not found: {}",
            db_path.display()
        )));
    }

    let mode = if read_only { "ro" } else { "rw" };
    let db_url = format!("sqlite://{}?mode={}", db_path.display(), mode);
    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(1)
        .connect_with(options)
        .await?;

    info!(
        "Opened warehouse {} ({})",
        db_path.display(),
        if read_only { "read-only" } else { "read-write" }
    );

    Ok(pool)
}

/// Single-connection in-memory database, used by tests and dry runs
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_warehouse_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");

        let result = connect_warehouse(&path, true).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.db");

        // Create the file with a writable connection first
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let setup = SqlitePool::connect(&url).await.unwrap();
        sqlx::query("CREATE TABLE player (player_id INTEGER PRIMARY KEY)")
            .execute(&setup)
            .await
            .unwrap();
        setup.close().await;

        let pool = connect_warehouse(&path, true).await.unwrap();
        let write = sqlx::query("INSERT INTO player (player_id) VALUES (1)")
            .execute(&pool)
            .await;
        assert!(write.is_err(), "Write should fail in read-only mode");
    }
}
