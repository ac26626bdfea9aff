//! Tabular snapshots
//!
//! A `Snapshot` is a column-typed row set read from a warehouse table (or
//! any query) at one point in time. Lookup builders and the drift detector
//! consume snapshots instead of live connections, which keeps them pure.
//!
//! Getters are total: a column that is absent from the snapshot reads as
//! `None` for every row, so callers degrade instead of failing.

use crate::db::introspect::{quote_ident, SchemaIntrospector, TypeAffinity};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::fmt;

/// A single cell value, mirroring SQLite storage classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view; integral reals and numeric text are accepted
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 && r.is_finite() => Some(*r as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Text view; numbers are rendered, blank text is treated as absent
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) if s.trim().is_empty() => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) => Some(r.to_string()),
            Value::Null => None,
        }
    }

    /// Storage affinity of this value, `None` for NULL
    pub fn affinity(&self) -> Option<TypeAffinity> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(TypeAffinity::Integer),
            Value::Real(_) => Some(TypeAffinity::Real),
            Value::Text(_) => Some(TypeAffinity::Text),
        }
    }

    /// Stable textual form used for hashing and duplicate detection
    pub fn key_repr(&self) -> String {
        match self {
            Value::Null => "\u{0}NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) if r.fract() == 0.0 && r.is_finite() => format!("{}", *r as i64),
            Value::Real(r) => r.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared column of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotColumn {
    pub name: String,
    /// Declared type when known (from PRAGMA table_info), else empty
    pub declared_type: String,
}

/// Immutable column-typed row set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    name: String,
    columns: Vec<SnapshotColumn>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Snapshot {
    /// Build a snapshot from column names and rows
    ///
    /// Rows shorter than the header are padded with NULL; longer rows are
    /// rejected since that indicates a reader bug, not a data problem.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<SnapshotColumn>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let name = name.into();
        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(Error::Internal(format!(
                    "Snapshot '{}' row {} has {} values for {} columns",
                    name,
                    i,
                    row.len(),
                    width
                )));
            }
            row.resize(width, Value::Null);
            padded.push(row);
        }

        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_lowercase(), i))
            .collect();

        Ok(Self { name, columns, index, rows: padded })
    }

    /// Convenience constructor for in-memory extracts with untyped columns
    pub fn from_rows(
        name: impl Into<String>,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|c| SnapshotColumn { name: c.to_string(), declared_type: String::new() })
            .collect();
        Self::new(name, columns, rows)
    }

    /// Empty snapshot with no columns, used when an optional input is absent
    pub fn empty(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[SnapshotColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column position, case-insensitive
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Iterate rows in snapshot order
    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |values| RowRef { snapshot: self, values })
    }

    /// Effective type of a column: declared type, else the affinity of the
    /// first non-null value, else empty
    pub fn column_type(&self, idx: usize) -> String {
        let declared = &self.columns[idx].declared_type;
        if !declared.trim().is_empty() {
            return declared.clone();
        }
        self.rows
            .iter()
            .find_map(|r| r[idx].affinity())
            .map(|a| format!("{:?}", a).to_uppercase())
            .unwrap_or_default()
    }

    /// Number of NULL values per column
    pub fn null_count(&self, idx: usize) -> u64 {
        self.rows.iter().filter(|r| r[idx].is_null()).count() as u64
    }

    /// Read a whole table, using PRAGMA table_info for column metadata
    pub async fn load_table(pool: &SqlitePool, table: &str) -> Result<Self> {
        let introspected = SchemaIntrospector::introspect_table(pool, table).await?;
        if introspected.is_empty() {
            return Err(Error::NotFound(format!("Table or view '{}' does not exist", table)));
        }
        let columns: Vec<SnapshotColumn> = introspected
            .into_iter()
            .map(|c| SnapshotColumn { name: c.name, declared_type: c.type_name })
            .collect();

        let select_list = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", select_list, quote_ident(table));
        let rows = sqlx::query(&sql).fetch_all(pool).await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            values.push(decode_row(row)?);
        }

        Self::new(table, columns, values)
    }
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            values.push(Value::Null);
            continue;
        }
        let storage = raw.type_info().name().to_string();
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(i)?),
            "REAL" => Value::Real(row.try_get_unchecked::<f64, _>(i)?),
            "BLOB" => Value::Null,
            _ => Value::Text(row.try_get_unchecked::<String, _>(i)?),
        };
        values.push(value);
    }
    Ok(values)
}

/// Borrowed view of one snapshot row
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    snapshot: &'a Snapshot,
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.snapshot.column_index(column).map(|i| &self.values[i])
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn get_text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::as_text)
    }

    /// First present text value among several candidate columns
    pub fn first_text(&self, columns: &[&str]) -> Option<String> {
        columns.iter().find_map(|c| self.get_text(c))
    }

    /// First present integer value among several candidate columns
    pub fn first_i64(&self, columns: &[&str]) -> Option<i64> {
        columns.iter().find_map(|c| self.get_i64(c))
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}
