//! SQL queries behind the validator checks
//!
//! Each query measures one thing and returns numbers; turning numbers into
//! issues is the validator's job.

use super::plan::{Bounds, ForeignKey, HubSatellite, MetricBound};
use courtdb_common::db::{quote_ident, SchemaIntrospector};
use courtdb_common::Result;
use sqlx::SqlitePool;

/// Sample size for offending key values in issue details
pub(crate) const SAMPLE_LIMIT: i64 = 5;

/// Orphan count and a few distinct orphan values
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct OrphanCount {
    pub count: i64,
    pub samples: Vec<String>,
}

/// Values outside a range: count plus observed extremes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct RangeStats {
    pub count: i64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

fn orphan_filter(
    child_table: &str,
    child_column: &str,
    parent_table: &str,
    parent_column: &str,
) -> String {
    format!(
        "FROM {ct} c WHERE c.{cc} IS NOT NULL \
         AND NOT EXISTS (SELECT 1 FROM {pt} p WHERE p.{pc} = c.{cc})",
        ct = quote_ident(child_table),
        cc = quote_ident(child_column),
        pt = quote_ident(parent_table),
        pc = quote_ident(parent_column),
    )
}

async fn count_orphans(
    pool: &SqlitePool,
    child_table: &str,
    child_column: &str,
    parent_table: &str,
    parent_column: &str,
) -> Result<OrphanCount> {
    let filter = orphan_filter(child_table, child_column, parent_table, parent_column);

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", filter))
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Ok(OrphanCount::default());
    }

    let samples: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT DISTINCT CAST(c.{} AS TEXT) {} ORDER BY 1 LIMIT ?",
        quote_ident(child_column),
        filter
    ))
    .bind(SAMPLE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(OrphanCount { count, samples })
}

/// Child rows whose foreign key has no parent row
pub(crate) async fn foreign_key_orphans(
    pool: &SqlitePool,
    fk: &ForeignKey,
) -> Result<OrphanCount> {
    count_orphans(pool, &fk.child_table, &fk.child_column, &fk.parent_table, &fk.parent_column)
        .await
}

/// Satellite rows whose key has no hub row
pub(crate) async fn satellite_orphans(
    pool: &SqlitePool,
    pair: &HubSatellite,
) -> Result<OrphanCount> {
    count_orphans(
        pool,
        &pair.satellite_table,
        &pair.satellite_key,
        &pair.hub_table,
        &pair.hub_key,
    )
    .await
}

/// Hub keys carrying more than `max` satellite rows
pub(crate) async fn overfull_hubs(
    pool: &SqlitePool,
    pair: &HubSatellite,
    max: u64,
) -> Result<OrphanCount> {
    let grouped = format!(
        "FROM (SELECT {key} AS k, COUNT(*) AS n FROM {sat} \
         WHERE {key} IS NOT NULL GROUP BY {key} HAVING COUNT(*) > ?)",
        key = quote_ident(&pair.satellite_key),
        sat = quote_ident(&pair.satellite_table),
    );
    let max = i64::try_from(max).unwrap_or(i64::MAX);

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", grouped))
        .bind(max)
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Ok(OrphanCount::default());
    }

    let sql = format!("SELECT CAST(k AS TEXT) {} ORDER BY 1 LIMIT ?", grouped);
    let samples: Vec<String> = sqlx::query_scalar(&sql)
        .bind(max)
        .bind(SAMPLE_LIMIT)
        .fetch_all(pool)
        .await?;

    Ok(OrphanCount { count, samples })
}

/// Non-NULL metric values outside `outside`, optionally restricted to
/// those still inside `within`
pub(crate) async fn values_outside(
    pool: &SqlitePool,
    metric: &MetricBound,
    outside: Bounds,
    within: Option<Bounds>,
) -> Result<RangeStats> {
    let col = quote_ident(&metric.column);
    let mut sql = format!(
        "SELECT COUNT(*), MIN(CAST({col} AS REAL)), MAX(CAST({col} AS REAL)) FROM {obj} \
         WHERE {col} IS NOT NULL AND ({col} < ? OR {col} > ?)",
        col = col,
        obj = quote_ident(&metric.object),
    );
    if within.is_some() {
        sql.push_str(&format!(" AND {col} >= ? AND {col} <= ?", col = col));
    }

    let mut query = sqlx::query_as::<_, (i64, Option<f64>, Option<f64>)>(&sql)
        .bind(outside.min)
        .bind(outside.max);
    if let Some(within) = within {
        query = query.bind(within.min).bind(within.max);
    }
    let (count, min, max) = query.fetch_one(pool).await?;

    Ok(RangeStats { count, min, max })
}

/// Whether an object exposes a column (tables and views alike)
pub(crate) async fn has_column(pool: &SqlitePool, object: &str, column: &str) -> Result<bool> {
    let columns = SchemaIntrospector::introspect_table(pool, object).await?;
    Ok(columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
}
