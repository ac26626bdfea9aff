//! Live warehouse introspection
//!
//! Reads table shape via `PRAGMA table_info` and object existence from
//! `sqlite_master`. Results feed the drift detector and the validation
//! orchestrator; nothing here judges whether a shape is acceptable.

use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Actual column from database introspection (PRAGMA table_info result)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualColumn {
    /// Column ID (position in table)
    pub cid: i32,
    /// Column name
    pub name: String,
    /// Declared SQL type (may be empty for views and untyped columns)
    pub type_name: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// Position in the primary key (0 = not part of it)
    pub pk: i32,
}

/// Kind of schema object in `sqlite_master`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
}

/// Storage affinity classes used for type comparison
///
/// Follows the SQLite affinity rules; logical names used by extract
/// descriptions (`string`, `float`, `boolean`, `date`) are mapped onto the
/// class they are stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeAffinity {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
}

impl TypeAffinity {
    /// Classify a declared or logical type name
    pub fn of(type_name: &str) -> Self {
        let t = type_name.trim().to_uppercase();

        if t.is_empty() {
            return TypeAffinity::Blob;
        }
        if t.contains("INT") || t == "BOOLEAN" || t == "BOOL" {
            return TypeAffinity::Integer;
        }
        if t.contains("CHAR")
            || t.contains("CLOB")
            || t.contains("TEXT")
            || t == "STRING"
            || t == "STR"
            || t == "UUID"
        {
            return TypeAffinity::Text;
        }
        if t.contains("BLOB") || t == "BYTES" {
            return TypeAffinity::Blob;
        }
        if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            return TypeAffinity::Real;
        }
        if t == "DATE" || t == "DATETIME" || t == "TIMESTAMP" {
            // Dates are stored as ISO-8601 text throughout the warehouse
            return TypeAffinity::Text;
        }
        TypeAffinity::Numeric
    }

    /// Whether a value observed with `observed` affinity satisfies `self`
    ///
    /// Integers satisfy real and numeric expectations; everything else must
    /// match exactly.
    pub fn accepts(&self, observed: TypeAffinity) -> bool {
        match (self, observed) {
            (a, b) if *a == b => true,
            (TypeAffinity::Real, TypeAffinity::Integer) => true,
            (TypeAffinity::Numeric, TypeAffinity::Integer | TypeAffinity::Real) => true,
            _ => false,
        }
    }
}

/// Check if two type names are compatible under affinity rules
pub fn types_compatible(expected: &str, actual: &str) -> bool {
    if expected.eq_ignore_ascii_case(actual) {
        return true;
    }
    TypeAffinity::of(expected).accepts(TypeAffinity::of(actual))
}

/// Schema introspection - read actual database schema
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Read actual columns from a table or view using PRAGMA table_info
    ///
    /// Returns columns in database order (by cid). A missing object yields
    /// an empty list; callers check existence first when that matters.
    pub async fn introspect_table(
        pool: &SqlitePool,
        table_name: &str,
    ) -> Result<Vec<ActualColumn>> {
        let query = format!("PRAGMA table_info({})", quote_ident(table_name));
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        let mut columns: Vec<ActualColumn> = rows
            .iter()
            .map(|row| ActualColumn {
                cid: row.get("cid"),
                name: row.get("name"),
                type_name: row.get("type"),
                not_null: row.get::<i32, _>("notnull") != 0,
                pk: row.get("pk"),
            })
            .collect();

        // Sort by cid to ensure consistent order
        columns.sort_by_key(|c| c.cid);

        Ok(columns)
    }

    /// Look up whether a table or view exists, and which kind it is
    pub async fn object_kind(pool: &SqlitePool, name: &str) -> Result<Option<ObjectKind>> {
        let kind: Option<String> = sqlx::query_scalar(
            r#"
            SELECT type FROM sqlite_master
            WHERE type IN ('table', 'view') AND name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(kind.map(|k| if k == "view" { ObjectKind::View } else { ObjectKind::Table }))
    }

    /// Check if a table or view exists
    pub async fn object_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
        Ok(Self::object_kind(pool, name).await?.is_some())
    }

    /// Count rows of a table or view
    pub async fn row_count(pool: &SqlitePool, name: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(name)))
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[test]
    fn test_types_compatible() {
        // Exact match, case insensitive
        assert!(types_compatible("TEXT", "TEXT"));
        assert!(types_compatible("integer", "INTEGER"));

        // Integer affinity
        assert!(types_compatible("INTEGER", "BIGINT"));
        assert!(types_compatible("boolean", "INTEGER"));

        // Text affinity
        assert!(types_compatible("string", "VARCHAR(32)"));
        assert!(types_compatible("date", "TEXT"));

        // Widening
        assert!(types_compatible("float", "INTEGER"));
        assert!(!types_compatible("integer", "REAL"));

        // Incompatible
        assert!(!types_compatible("TEXT", "INTEGER"));
        assert!(!types_compatible("REAL", "TEXT"));
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("game"), "\"game\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_introspect_table() {
        let pool = connect_in_memory().await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE player (
                player_id INTEGER PRIMARY KEY,
                full_name TEXT NOT NULL,
                height_in REAL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let columns = SchemaIntrospector::introspect_table(&pool, "player").await.unwrap();

        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].name, "player_id");
        assert_eq!(columns[0].pk, 1);
        assert_eq!(columns[1].type_name, "TEXT");
        assert!(columns[1].not_null);
        assert!(!columns[2].not_null);
    }

    #[tokio::test]
    async fn test_object_kind_and_counts() {
        let pool = connect_in_memory().await.unwrap();

        assert_eq!(SchemaIntrospector::object_kind(&pool, "game").await.unwrap(), None);

        sqlx::query("CREATE TABLE game (game_id TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE VIEW game_ids AS SELECT game_id FROM game")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO game (game_id) VALUES ('0022300001'), ('0022300002')")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(
            SchemaIntrospector::object_kind(&pool, "game").await.unwrap(),
            Some(ObjectKind::Table)
        );
        assert_eq!(
            SchemaIntrospector::object_kind(&pool, "game_ids").await.unwrap(),
            Some(ObjectKind::View)
        );
        assert_eq!(SchemaIntrospector::row_count(&pool, "game_ids").await.unwrap(), 2);
    }
}
