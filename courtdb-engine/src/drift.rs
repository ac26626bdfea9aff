//! Schema-drift detector
//!
//! Compares the observed shape of an incoming extract or a live warehouse
//! table against its expectation entry. Data-shape problems are returned as
//! `DriftIssue`s; only infrastructure failures (introspection, reads) are
//! errors, and only the async `observe_*` helpers can produce them.

use crate::expectations::{Expectation, ExpectationsConfig};
use crate::issue::{DriftIssue, IssueType, SourceKind};
use courtdb_common::db::{quote_ident, types_compatible, SchemaIntrospector, Snapshot, Value};
use courtdb_common::{Result, Severity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::debug;

/// Maximum duplicate key samples carried in issue details
const MAX_KEY_SAMPLES: usize = 5;

/// One observed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedColumn {
    pub name: String,
    /// Declared or inferred type; empty when unknown
    pub type_name: String,
    /// NULL count when it was measured
    pub null_count: Option<u64>,
}

impl ObservedColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into(), null_count: None }
    }

    pub fn with_nulls(mut self, null_count: u64) -> Self {
        self.null_count = Some(null_count);
        self
    }
}

/// Observed shape of an incoming extract
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedShape {
    pub columns: Vec<ObservedColumn>,
    /// Primary key tuples, one per row, in the entry's key order
    pub key_values: Vec<Vec<Value>>,
    pub row_count: u64,
}

impl ObservedShape {
    /// Describe a snapshot; key values are extracted for `primary_key`
    ///
    /// When any key column is absent no key tuples are produced (the
    /// missing column is reported on its own).
    pub fn from_snapshot(snapshot: &Snapshot, primary_key: &[String]) -> Self {
        let columns = snapshot
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                ObservedColumn::new(c.name.clone(), snapshot.column_type(i))
                    .with_nulls(snapshot.null_count(i))
            })
            .collect();

        let key_indexes: Option<Vec<usize>> =
            primary_key.iter().map(|k| snapshot.column_index(k)).collect();
        let key_values = match key_indexes {
            Some(indexes) if !indexes.is_empty() => snapshot
                .rows()
                .map(|row| indexes.iter().map(|i| row.values()[*i].clone()).collect())
                .collect(),
            _ => Vec::new(),
        };

        Self { columns, key_values, row_count: snapshot.len() as u64 }
    }
}

/// Check an incoming extract against its source expectation
///
/// A source with no entry has no checks (fail-open) and yields no issues.
pub fn check_source_shape(
    source_id: &str,
    columns: &[ObservedColumn],
    key_values: &[Vec<Value>],
    row_count: u64,
    expectations: &ExpectationsConfig,
) -> Vec<DriftIssue> {
    let entry = match expectations.get_source_expectation(source_id) {
        Some(entry) => entry,
        None => {
            debug!(source = %source_id, "No expectation entry; source shape not checked");
            return Vec::new();
        }
    };

    let diff = ShapeDiff { kind: SourceKind::Source, id: source_id, entry, expectations };
    let mut issues = Vec::new();

    if row_count == 0 {
        issues.push(diff.issue(IssueType::RowCountZero, json!({ "row_count": 0 })));
    }
    issues.extend(diff.compare_columns(columns));
    issues.extend(diff.compare_keys(key_values));

    debug!(source = %source_id, issues = issues.len(), "Checked source shape");
    issues
}

/// Check a live warehouse table against its table expectation
pub fn check_table_shape(
    table_name: &str,
    columns: &[ObservedColumn],
    expectations: &ExpectationsConfig,
) -> Vec<DriftIssue> {
    let entry = match expectations.get_table_expectation(table_name) {
        Some(entry) => entry,
        None => {
            debug!(table = %table_name, "No expectation entry; table shape not checked");
            return Vec::new();
        }
    };

    let diff = ShapeDiff { kind: SourceKind::Table, id: table_name, entry, expectations };
    let issues = diff.compare_columns(columns);

    debug!(table = %table_name, issues = issues.len(), "Checked table shape");
    issues
}

/// Observe a live table's columns via `PRAGMA table_info`
///
/// NULL counts are measured for the columns the entry declares
/// non-nullable or as part of the primary key.
pub async fn observe_table(
    pool: &SqlitePool,
    table_name: &str,
    entry: Option<&Expectation>,
) -> Result<Vec<ObservedColumn>> {
    let actual = SchemaIntrospector::introspect_table(pool, table_name).await?;
    let mut observed = Vec::with_capacity(actual.len());

    for column in actual {
        let measured = entry.is_some_and(|e| {
            e.primary_key.iter().any(|k| k.eq_ignore_ascii_case(&column.name))
                || find_ci(&e.columns, &column.name).is_some_and(|c| !c.nullable)
        });
        let mut item = ObservedColumn::new(column.name.clone(), column.type_name);
        if measured {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
                quote_ident(table_name),
                quote_ident(&column.name)
            );
            let nulls: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
            item = item.with_nulls(nulls as u64);
        }
        observed.push(item);
    }

    Ok(observed)
}

/// Read a staged extract and check it against its source expectation
///
/// Returns the issues together with the observed key tuples, which callers
/// fingerprint for lineage.
pub async fn observe_and_check_source(
    pool: &SqlitePool,
    source_id: &str,
    staging_table: &str,
    expectations: &ExpectationsConfig,
) -> Result<(Vec<DriftIssue>, ObservedShape)> {
    let snapshot = Snapshot::load_table(pool, staging_table).await?;
    let primary_key = expectations
        .get_source_expectation(source_id)
        .map(|e| e.primary_key.clone())
        .unwrap_or_default();
    let shape = ObservedShape::from_snapshot(&snapshot, &primary_key);
    let issues = check_source_shape(
        source_id,
        &shape.columns,
        &shape.key_values,
        shape.row_count,
        expectations,
    );
    Ok((issues, shape))
}

fn find_ci<'a, V>(map: &'a BTreeMap<String, V>, name: &str) -> Option<&'a V> {
    map.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v)
}

/// Comparison of one observed shape against one expectation entry
struct ShapeDiff<'a> {
    kind: SourceKind,
    id: &'a str,
    entry: &'a Expectation,
    expectations: &'a ExpectationsConfig,
}

impl ShapeDiff<'_> {
    fn issue(&self, issue_type: IssueType, details: serde_json::Value) -> DriftIssue {
        let severity = match issue_type.policy_key() {
            Some(key) => self.expectations.resolve_severity(key, Some(self.entry), None),
            None => Severity::Warn,
        };
        DriftIssue::new(self.kind, self.id, issue_type, severity, details)
    }

    fn is_key_column(&self, name: &str) -> bool {
        self.entry.primary_key.iter().any(|k| k.eq_ignore_ascii_case(name))
    }

    fn compare_columns(&self, observed: &[ObservedColumn]) -> Vec<DriftIssue> {
        let mut issues = Vec::new();
        let find = |name: &str| observed.iter().find(|c| c.name.eq_ignore_ascii_case(name));

        for (name, expected) in &self.entry.columns {
            let actual = match find(name) {
                Some(actual) => actual,
                None => {
                    if expected.required {
                        let details = json!({ "column": name });
                        issues.push(self.issue(IssueType::MissingColumn, details));
                    }
                    continue;
                }
            };

            // Unknown observed type (untyped view column, all-NULL extract) is not a mismatch
            if let Some(expected_type) = expected.type_name.as_deref() {
                let observed_type = actual.type_name.as_str();
                if !observed_type.trim().is_empty()
                    && !types_compatible(expected_type, observed_type)
                {
                    issues.push(self.issue(
                        IssueType::TypeMismatch,
                        json!({
                            "column": name,
                            "expected": expected_type,
                            "actual": observed_type,
                        }),
                    ));
                }
            }

            if !expected.nullable && !self.is_key_column(name) {
                if let Some(nulls) = actual.null_count.filter(|n| *n > 0) {
                    let details = json!({ "column": name, "null_count": nulls });
                    issues.push(self.issue(IssueType::NullInRequired, details));
                }
            }
        }

        // Key columns are checked for NULLs even without a column declaration
        if self.kind == SourceKind::Table {
            for key in &self.entry.primary_key {
                if let Some(nulls) = find(key).and_then(|c| c.null_count).filter(|n| *n > 0) {
                    let details = json!({ "column": key, "null_count": nulls });
                    issues.push(self.issue(IssueType::NullInPrimaryKey, details));
                }
            }
        }

        if !self.entry.columns.is_empty() {
            for column in observed {
                if find_ci(&self.entry.columns, &column.name).is_none() {
                    let details = json!({ "column": column.name });
                    issues.push(self.issue(IssueType::ExtraColumn, details));
                }
            }
        }

        issues
    }

    fn compare_keys(&self, key_values: &[Vec<Value>]) -> Vec<DriftIssue> {
        let mut issues = Vec::new();
        if self.entry.primary_key.is_empty() || key_values.is_empty() {
            return issues;
        }

        let mut null_rows = 0u64;
        let mut seen: BTreeMap<String, u64> = BTreeMap::new();
        for key in key_values {
            if key.iter().any(Value::is_null) {
                null_rows += 1;
                continue;
            }
            let repr = key.iter().map(Value::key_repr).collect::<Vec<_>>().join("|");
            *seen.entry(repr).or_default() += 1;
        }

        if null_rows > 0 {
            issues.push(self.issue(
                IssueType::NullInPrimaryKey,
                json!({ "primary_key": self.entry.primary_key, "null_rows": null_rows }),
            ));
        }

        let duplicates: Vec<(&String, &u64)> = seen.iter().filter(|(_, n)| **n > 1).collect();
        if !duplicates.is_empty() {
            let samples: Vec<&String> =
                duplicates.iter().take(MAX_KEY_SAMPLES).map(|(k, _)| *k).collect();
            let duplicate_rows: u64 = duplicates.iter().map(|(_, n)| **n - 1).sum();
            issues.push(self.issue(
                IssueType::PrimaryKeyViolation,
                json!({
                    "primary_key": self.entry.primary_key,
                    "duplicate_keys": duplicates.len(),
                    "duplicate_rows": duplicate_rows,
                    "samples": samples,
                }),
            ));
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectations::ColumnExpectation;
    use crate::issue::PolicyKey;

    fn expectations() -> ExpectationsConfig {
        let mut config = ExpectationsConfig::default();
        config.sources.insert(
            "player_box_scores".to_string(),
            Expectation::default()
                .with_column("game_id", ColumnExpectation::new("string").not_null())
                .with_column("player_id", ColumnExpectation::new("integer"))
                .with_column("pts", ColumnExpectation::new("integer").not_null())
                .with_column("minutes", ColumnExpectation::new("float").optional())
                .with_primary_key(&["game_id", "player_id"])
                .with_policy(PolicyKey::ExtraColumn, Severity::Info),
        );
        config.tables.insert(
            "player".to_string(),
            Expectation::default()
                .with_column("player_id", ColumnExpectation::new("integer"))
                .with_primary_key(&["player_id"]),
        );
        config
    }

    fn types_of(issues: &[DriftIssue]) -> Vec<IssueType> {
        issues.iter().map(|i| i.issue_type).collect()
    }

    #[test]
    fn test_clean_source_has_no_issues() {
        let columns = vec![
            ObservedColumn::new("game_id", "TEXT").with_nulls(0),
            ObservedColumn::new("player_id", "INTEGER"),
            ObservedColumn::new("pts", "INTEGER").with_nulls(0),
        ];
        let keys = vec![
            vec![Value::from("g1"), Value::from(1)],
            vec![Value::from("g1"), Value::from(2)],
        ];
        let issues = check_source_shape("player_box_scores", &columns, &keys, 2, &expectations());
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_column_drift_with_policy_severities() {
        let columns = vec![
            ObservedColumn::new("game_id", "TEXT"),
            ObservedColumn::new("player_id", "TEXT"),
            ObservedColumn::new("plus_minus", "INTEGER"),
        ];
        let issues = check_source_shape("player_box_scores", &columns, &[], 3, &expectations());

        assert_eq!(
            types_of(&issues),
            vec![IssueType::TypeMismatch, IssueType::MissingColumn, IssueType::ExtraColumn]
        );
        assert_eq!(issues[0].severity, Severity::Warn);
        assert_eq!(issues[1].severity, Severity::Error);
        assert_eq!(issues[1].details["column"], "pts");
        // Entry-level override
        assert_eq!(issues[2].severity, Severity::Info);
    }

    #[test]
    fn test_key_nulls_and_duplicates() {
        let columns = vec![
            ObservedColumn::new("game_id", "TEXT"),
            ObservedColumn::new("player_id", "INTEGER"),
            ObservedColumn::new("pts", "INTEGER"),
        ];
        let keys = vec![
            vec![Value::from("g1"), Value::from(1)],
            vec![Value::from("g1"), Value::from(1)],
            vec![Value::from("g1"), Value::from(1)],
            vec![Value::Null, Value::from(2)],
        ];
        let issues = check_source_shape("player_box_scores", &columns, &keys, 4, &expectations());

        assert_eq!(
            types_of(&issues),
            vec![IssueType::NullInPrimaryKey, IssueType::PrimaryKeyViolation]
        );
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[1].details["duplicate_keys"], 1);
        assert_eq!(issues[1].details["duplicate_rows"], 2);
        assert_eq!(issues[1].details["samples"][0], "g1|1");
    }

    #[test]
    fn test_null_in_required_and_zero_rows() {
        let columns = vec![
            ObservedColumn::new("game_id", "TEXT"),
            ObservedColumn::new("player_id", "INTEGER"),
            ObservedColumn::new("pts", "INTEGER").with_nulls(4),
        ];
        let issues = check_source_shape("player_box_scores", &columns, &[], 0, &expectations());
        assert_eq!(types_of(&issues), vec![IssueType::RowCountZero, IssueType::NullInRequired]);
        assert_eq!(issues[0].severity, Severity::Warn);
        assert_eq!(issues[1].details["null_count"], 4);
    }

    #[test]
    fn test_unknown_source_is_fail_open() {
        let issues = check_source_shape("mystery_feed", &[], &[], 0, &expectations());
        assert!(issues.is_empty());
        assert!(check_table_shape("award", &[], &expectations()).is_empty());
    }

    #[test]
    fn test_from_snapshot_extracts_keys() {
        let snap = Snapshot::from_rows(
            "stg_player_box_scores",
            &["game_id", "player_id", "pts"],
            vec![
                vec!["g1".into(), 1.into(), 10.into()],
                vec!["g1".into(), 1.into(), Value::Null],
            ],
        )
        .unwrap();
        let key = ["game_id".to_string(), "player_id".to_string()];
        let shape = ObservedShape::from_snapshot(&snap, &key);

        assert_eq!(shape.row_count, 2);
        assert_eq!(shape.key_values.len(), 2);
        assert_eq!(shape.columns[2].null_count, Some(1));
        assert_eq!(shape.columns[1].type_name, "INTEGER");

        let no_keys = ObservedShape::from_snapshot(&snap, &["season_id".to_string()]);
        assert!(no_keys.key_values.is_empty());
    }

    #[tokio::test]
    async fn test_observe_live_table() {
        let pool = courtdb_common::db::connect_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE player (player_id INTEGER, full_name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO player VALUES (NULL, 'Ghost'), (1, 'Someone')")
            .execute(&pool)
            .await
            .unwrap();

        let config = expectations();
        let observed = observe_table(&pool, "player", config.get_table_expectation("player"))
            .await
            .unwrap();
        assert_eq!(observed[0].null_count, Some(1));
        assert_eq!(observed[1].null_count, None);

        let issues = check_table_shape("player", &observed, &config);
        assert_eq!(types_of(&issues), vec![IssueType::NullInPrimaryKey, IssueType::ExtraColumn]);
    }
}
