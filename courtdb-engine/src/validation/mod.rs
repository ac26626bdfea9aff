//! Validation orchestrator
//!
//! Runs the plan's checks against post-load warehouse state in a fixed
//! order and folds every finding into one `ValidationOutcome`:
//!
//! 1. structural: required tables and views exist
//! 2. referential: declared foreign keys have no orphans
//! 3. hub/satellite: satellite keys exist in the hub, per-hub cardinality
//! 4. summary: core tables are non-empty and meet `min_rows`
//! 5. metric: derived metric columns stay inside soft/hard bounds
//!
//! Steps 1-3 stop at the first fatal finding; the checks they did not get to
//! are recorded as skipped. Steps 4 and 5 always run to completion.

mod checks;
pub mod plan;

pub use plan::{Bounds, ForeignKey, HubSatellite, MetricBound, ValidationPlan};

use crate::expectations::ExpectationsConfig;
use crate::issue::{DriftIssue, IssueType, PolicyKey, SeverityCounts, SourceKind};
use courtdb_common::db::{ObjectKind, SchemaIntrospector};
use courtdb_common::{Error, Result, Severity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Step names recorded on issues and in the run ledger
pub const STEP_STRUCTURAL: &str = "validate:structural";
pub const STEP_REFERENTIAL: &str = "validate:referential";
pub const STEP_HUB_SATELLITE: &str = "validate:hub_satellite";
pub const STEP_SUMMARY: &str = "validate:summary";
pub const STEP_METRIC: &str = "validate:metric";

/// Skip reason for checks after a fatal structural or referential finding
const AFTER_FATAL: &str = "after fatal finding";

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    Pending,
    Running,
    Passed,
    Failed,
}

/// Aggregate result of one validation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub state: ValidationState,
    pub issues: Vec<DriftIssue>,
    pub counts: SeverityCounts,
    pub fatal_threshold: Severity,
}

impl ValidationOutcome {
    pub fn failed(&self) -> bool {
        self.state == ValidationState::Failed
    }

    /// Issues at exactly `severity`
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &DriftIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }
}

/// Validation orchestrator for one run
pub struct Validator<'a> {
    plan: ValidationPlan,
    expectations: &'a ExpectationsConfig,
    fatal_threshold: Severity,
    state: ValidationState,
    issues: Vec<DriftIssue>,
}

impl<'a> Validator<'a> {
    pub fn new(
        plan: ValidationPlan,
        expectations: &'a ExpectationsConfig,
        fatal_threshold: Severity,
    ) -> Self {
        Self {
            plan,
            expectations,
            fatal_threshold,
            state: ValidationState::Pending,
            issues: Vec::new(),
        }
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    fn transition_to(&mut self, new_state: ValidationState) {
        debug!("Validation state {:?} -> {:?}", self.state, new_state);
        self.state = new_state;
    }

    fn is_fatal(&self, issue: &DriftIssue) -> bool {
        issue.is_fatal(self.fatal_threshold)
    }

    /// Push issues; returns whether any of them is fatal
    fn record(&mut self, issues: Vec<DriftIssue>) -> bool {
        let fatal = issues.iter().any(|i| self.is_fatal(i));
        self.issues.extend(issues);
        fatal
    }

    fn skipped(&mut self, step: &str, kind: SourceKind, id: String, reason: &str) {
        let details = json!({ "reason": reason });
        let issue = DriftIssue::new(kind, id, IssueType::CheckSkipped, Severity::Info, details);
        self.issues.push(issue.in_step(step));
    }

    /// Run every check in the plan
    ///
    /// Infrastructure errors abort the pass and are returned as `Err`; the
    /// validator then stays `Running` and cannot be reused.
    pub async fn run_all(&mut self, pool: &SqlitePool) -> Result<ValidationOutcome> {
        if self.state != ValidationState::Pending {
            return Err(Error::InvalidInput(format!(
                "Validator already used (state {:?})",
                self.state
            )));
        }
        self.transition_to(ValidationState::Running);

        let stopped = self.run_dependent_checks(pool).await?;
        if stopped {
            warn!("Fatal structural or referential finding; dependent checks skipped");
        }
        self.check_summary(pool).await?;
        self.check_metrics(pool).await?;

        let failed = self.issues.iter().any(|i| self.is_fatal(i));
        self.transition_to(if failed { ValidationState::Failed } else { ValidationState::Passed });

        let counts = SeverityCounts::tally(&self.issues);
        info!(
            state = ?self.state,
            info = counts.info,
            warn = counts.warn,
            error = counts.error,
            "Validation finished"
        );

        Ok(ValidationOutcome {
            state: self.state,
            issues: std::mem::take(&mut self.issues),
            counts,
            fatal_threshold: self.fatal_threshold,
        })
    }

    /// Structural, referential and hub/satellite checks; returns whether a
    /// fatal finding stopped the sequence
    async fn run_dependent_checks(&mut self, pool: &SqlitePool) -> Result<bool> {
        let objects = self.plan.required_objects.clone();
        let foreign_keys = self.plan.foreign_keys.clone();
        let pairs = self.plan.hub_satellites.clone();
        let mut stopped = false;

        for object in &objects {
            if stopped {
                self.skipped(STEP_STRUCTURAL, SourceKind::Table, object.clone(), AFTER_FATAL);
                continue;
            }
            stopped = self.check_object_exists(pool, object).await?;
        }

        for fk in &foreign_keys {
            if stopped {
                self.skipped(STEP_REFERENTIAL, SourceKind::Relationship, fk.label(), AFTER_FATAL);
                continue;
            }
            stopped = self.check_foreign_key(pool, fk).await?;
        }

        for pair in &pairs {
            if stopped {
                let label = pair.label();
                self.skipped(STEP_HUB_SATELLITE, SourceKind::Relationship, label, AFTER_FATAL);
                continue;
            }
            stopped = self.check_hub_satellite(pool, pair).await?;
        }

        Ok(stopped)
    }

    async fn check_object_exists(&mut self, pool: &SqlitePool, object: &str) -> Result<bool> {
        if SchemaIntrospector::object_exists(pool, object).await? {
            return Ok(false);
        }
        let issue = DriftIssue::new(
            SourceKind::Table,
            object,
            IssueType::MissingObject,
            Severity::Error,
            json!({ "object": object }),
        )
        .in_step(STEP_STRUCTURAL);
        Ok(self.record(vec![issue]))
    }

    /// Objects a relationship check needs; records a skip when one is absent
    async fn objects_present(
        &mut self,
        pool: &SqlitePool,
        step: &str,
        label: String,
        objects: [&str; 2],
    ) -> Result<bool> {
        for object in objects {
            if !SchemaIntrospector::object_exists(pool, object).await? {
                let reason = format!("'{}' does not exist", object);
                self.skipped(step, SourceKind::Relationship, label, &reason);
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn check_foreign_key(&mut self, pool: &SqlitePool, fk: &ForeignKey) -> Result<bool> {
        let objects = [fk.child_table.as_str(), fk.parent_table.as_str()];
        if !self.objects_present(pool, STEP_REFERENTIAL, fk.label(), objects).await? {
            return Ok(false);
        }

        let orphans = checks::foreign_key_orphans(pool, fk).await?;
        if orphans.count == 0 {
            return Ok(false);
        }
        debug!(relationship = %fk.label(), orphans = orphans.count, "Orphaned child rows");

        let issue = DriftIssue::new(
            SourceKind::Relationship,
            fk.label(),
            IssueType::Orphan,
            Severity::Error,
            json!({
                "child": fk.child_table,
                "column": fk.child_column,
                "parent": fk.parent_table,
                "orphan_rows": orphans.count,
                "samples": orphans.samples,
            }),
        )
        .in_step(STEP_REFERENTIAL);
        Ok(self.record(vec![issue]))
    }

    async fn check_hub_satellite(
        &mut self,
        pool: &SqlitePool,
        pair: &HubSatellite,
    ) -> Result<bool> {
        let objects = [pair.hub_table.as_str(), pair.satellite_table.as_str()];
        if !self.objects_present(pool, STEP_HUB_SATELLITE, pair.label(), objects).await? {
            return Ok(false);
        }

        let mut issues = Vec::new();
        let orphans = checks::satellite_orphans(pool, pair).await?;
        if orphans.count > 0 {
            issues.push(
                DriftIssue::new(
                    SourceKind::Relationship,
                    pair.label(),
                    IssueType::Orphan,
                    Severity::Error,
                    json!({
                        "hub": pair.hub_table,
                        "satellite": pair.satellite_table,
                        "orphan_rows": orphans.count,
                        "samples": orphans.samples,
                    }),
                )
                .in_step(STEP_HUB_SATELLITE),
            );
        }

        if let Some(max) = pair.max_per_hub {
            let overfull = checks::overfull_hubs(pool, pair, max).await?;
            if overfull.count > 0 {
                issues.push(
                    DriftIssue::new(
                        SourceKind::Relationship,
                        pair.label(),
                        IssueType::SatelliteCardinality,
                        Severity::Error,
                        json!({
                            "hub": pair.hub_table,
                            "satellite": pair.satellite_table,
                            "max_per_hub": max,
                            "overfull_hubs": overfull.count,
                            "samples": overfull.samples,
                        }),
                    )
                    .in_step(STEP_HUB_SATELLITE),
                );
            }
        }

        Ok(self.record(issues))
    }

    async fn check_summary(&mut self, pool: &SqlitePool) -> Result<()> {
        let expectations = self.expectations;
        for table in self.plan.summary_tables.clone() {
            let kind = match SchemaIntrospector::object_kind(pool, &table).await? {
                Some(ObjectKind::View) => SourceKind::View,
                Some(ObjectKind::Table) => SourceKind::Table,
                None => {
                    self.skipped(STEP_SUMMARY, SourceKind::Table, table, "object does not exist");
                    continue;
                }
            };

            let rows = SchemaIntrospector::row_count(pool, &table).await?.max(0) as u64;
            let entry = expectations.get_table_expectation(&table);

            if rows == 0 {
                let severity = expectations.resolve_severity(PolicyKey::RowCountZero, entry, None);
                let details = json!({ "row_count": 0 });
                let issue =
                    DriftIssue::new(kind, table.as_str(), IssueType::EmptyTable, severity, details)
                        .in_step(STEP_SUMMARY);
                self.issues.push(issue);
                continue;
            }

            if let Some(min_rows) = entry.and_then(|e| e.min_rows).filter(|m| rows < *m) {
                let issue = DriftIssue::new(
                    kind,
                    table.as_str(),
                    IssueType::BelowMinRows,
                    Severity::Warn,
                    json!({ "row_count": rows, "min_rows": min_rows }),
                )
                .in_step(STEP_SUMMARY);
                self.issues.push(issue);
            }
        }
        Ok(())
    }

    async fn check_metrics(&mut self, pool: &SqlitePool) -> Result<()> {
        for metric in self.plan.metrics.clone() {
            let label = metric.label();
            if !SchemaIntrospector::object_exists(pool, &metric.object).await? {
                self.skipped(STEP_METRIC, SourceKind::Metric, label, "object does not exist");
                continue;
            }
            if !checks::has_column(pool, &metric.object, &metric.column).await? {
                self.skipped(STEP_METRIC, SourceKind::Metric, label, "column does not exist");
                continue;
            }

            let hard = checks::values_outside(pool, &metric, metric.hard, None).await?;
            if hard.count > 0 {
                self.issues.push(metric_issue(
                    &metric,
                    IssueType::MetricOutOfHardBounds,
                    Severity::Error,
                    metric.hard,
                    &hard,
                ));
            }
            let soft = checks::values_outside(pool, &metric, metric.soft, Some(metric.hard)).await?;
            if soft.count > 0 {
                self.issues.push(metric_issue(
                    &metric,
                    IssueType::MetricOutOfSoftBounds,
                    Severity::Warn,
                    metric.soft,
                    &soft,
                ));
            }
        }
        Ok(())
    }
}

fn metric_issue(
    metric: &MetricBound,
    issue_type: IssueType,
    severity: Severity,
    bounds: Bounds,
    stats: &checks::RangeStats,
) -> DriftIssue {
    DriftIssue::new(
        SourceKind::Metric,
        metric.label(),
        issue_type,
        severity,
        json!({
            "bounds": [bounds.min, bounds.max],
            "rows": stats.count,
            "observed_min": stats.min,
            "observed_max": stats.max,
        }),
    )
    .in_step(STEP_METRIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectations::Expectation;
    use courtdb_common::db::connect_in_memory;

    async fn exec(pool: &SqlitePool, sql: &str) {
        sqlx::query(sql).execute(pool).await.unwrap();
    }

    async fn games_pool() -> SqlitePool {
        let pool = connect_in_memory().await.unwrap();
        exec(&pool, "CREATE TABLE game (game_id TEXT PRIMARY KEY)").await;
        exec(&pool, "CREATE TABLE team_box_score (game_id TEXT, team_id INTEGER)").await;
        exec(&pool, "INSERT INTO game VALUES ('g1'), ('g2')").await;
        exec(&pool, "INSERT INTO team_box_score VALUES ('g1', 1), ('g1', 2), ('g2', 1)").await;
        pool
    }

    fn game_plan() -> ValidationPlan {
        ValidationPlan {
            required_objects: vec!["game".into(), "team_box_score".into()],
            hub_satellites: vec![HubSatellite::new(
                ("game", "game_id"),
                ("team_box_score", "game_id"),
                Some(2),
            )],
            summary_tables: vec!["game".into(), "team_box_score".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clean_warehouse_passes() {
        let pool = games_pool().await;
        let expectations = ExpectationsConfig::default();
        let mut validator = Validator::new(game_plan(), &expectations, Severity::Error);
        assert_eq!(validator.state(), ValidationState::Pending);

        let outcome = validator.run_all(&pool).await.unwrap();
        assert_eq!(outcome.state, ValidationState::Passed);
        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        assert_eq!(validator.state(), ValidationState::Passed);
    }

    #[tokio::test]
    async fn test_one_satellite_orphan_fails_with_one_issue() {
        let pool = games_pool().await;
        exec(&pool, "INSERT INTO team_box_score VALUES ('g9', 3)").await;
        let expectations = ExpectationsConfig::default();

        let outcome = Validator::new(game_plan(), &expectations, Severity::Error)
            .run_all(&pool)
            .await
            .unwrap();

        let orphans: Vec<_> =
            outcome.issues.iter().filter(|i| i.issue_type == IssueType::Orphan).collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].severity, Severity::Error);
        assert_eq!(orphans[0].details["samples"][0], "g9");
        assert!(outcome.failed());
    }

    #[tokio::test]
    async fn test_cardinality_bound() {
        let pool = games_pool().await;
        exec(&pool, "INSERT INTO team_box_score VALUES ('g1', 3)").await;
        let expectations = ExpectationsConfig::default();

        let outcome = Validator::new(game_plan(), &expectations, Severity::Error)
            .run_all(&pool)
            .await
            .unwrap();

        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].issue_type, IssueType::SatelliteCardinality);
        assert_eq!(outcome.issues[0].details["overfull_hubs"], 1);
        assert!(outcome.failed());
    }

    #[tokio::test]
    async fn test_missing_table_stops_dependent_checks() {
        let pool = connect_in_memory().await.unwrap();
        exec(&pool, "CREATE TABLE team_box_score (game_id TEXT)").await;
        let plan = ValidationPlan {
            required_objects: vec!["game".into(), "team_box_score".into()],
            foreign_keys: vec![ForeignKey::new(("team_box_score", "game_id"), ("game", "game_id"))],
            summary_tables: vec!["team_box_score".into()],
            ..Default::default()
        };
        let expectations = ExpectationsConfig::default();

        let outcome =
            Validator::new(plan, &expectations, Severity::Error).run_all(&pool).await.unwrap();
        let types: Vec<_> = outcome.issues.iter().map(|i| i.issue_type).collect();

        // Summary still runs after the structural stop
        assert_eq!(
            types,
            vec![
                IssueType::MissingObject,
                IssueType::CheckSkipped,
                IssueType::CheckSkipped,
                IssueType::EmptyTable
            ]
        );
        assert!(outcome.failed());
        assert_eq!(outcome.counts.info, 2);
    }

    #[tokio::test]
    async fn test_min_rows_from_table_expectation() {
        let pool = games_pool().await;
        let mut expectations = ExpectationsConfig::default();
        let entry = Expectation { min_rows: Some(10), ..Default::default() };
        expectations.tables.insert("game".into(), entry);

        let outcome = Validator::new(game_plan(), &expectations, Severity::Error)
            .run_all(&pool)
            .await
            .unwrap();

        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].issue_type, IssueType::BelowMinRows);
        assert_eq!(outcome.state, ValidationState::Passed);
    }

    fn metric_plan() -> ValidationPlan {
        ValidationPlan {
            metrics: vec![MetricBound::new(
                "player_game_advanced",
                "ts_pct",
                Bounds::new(0.0, 1.5),
                Bounds::new(0.0, 3.0),
            )],
            ..Default::default()
        }
    }

    async fn metric_pool(value: f64) -> SqlitePool {
        let pool = connect_in_memory().await.unwrap();
        exec(&pool, "CREATE TABLE shots (player_id INTEGER, ts REAL)").await;
        exec(
            &pool,
            "CREATE VIEW player_game_advanced AS SELECT player_id, ts AS ts_pct FROM shots",
        )
        .await;
        sqlx::query("INSERT INTO shots VALUES (1, 0.55), (2, ?)")
            .bind(value)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_metric_within_soft_bound_passes() {
        let pool = metric_pool(1.2).await;
        let expectations = ExpectationsConfig::default();
        let outcome = Validator::new(metric_plan(), &expectations, Severity::Error)
            .run_all(&pool)
            .await
            .unwrap();

        assert!(!outcome.failed());
        assert_eq!(outcome.counts.error, 0);
    }

    #[tokio::test]
    async fn test_metric_between_soft_and_hard_warns() {
        let pool = metric_pool(2.0).await;
        let expectations = ExpectationsConfig::default();
        let outcome = Validator::new(metric_plan(), &expectations, Severity::Error)
            .run_all(&pool)
            .await
            .unwrap();

        assert!(!outcome.failed());
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].issue_type, IssueType::MetricOutOfSoftBounds);
        assert_eq!(outcome.issues[0].severity, Severity::Warn);
    }

    #[tokio::test]
    async fn test_metric_outside_hard_bound_fails() {
        let pool = metric_pool(5.0).await;
        let expectations = ExpectationsConfig::default();
        let outcome = Validator::new(metric_plan(), &expectations, Severity::Error)
            .run_all(&pool)
            .await
            .unwrap();

        assert!(outcome.failed());
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].issue_type, IssueType::MetricOutOfHardBounds);
        assert_eq!(outcome.issues[0].severity, Severity::Error);
        assert_eq!(outcome.issues[0].details["observed_max"], 5.0);
    }

    #[tokio::test]
    async fn test_missing_metric_object_is_skipped() {
        let pool = connect_in_memory().await.unwrap();
        let expectations = ExpectationsConfig::default();
        let outcome = Validator::new(metric_plan(), &expectations, Severity::Error)
            .run_all(&pool)
            .await
            .unwrap();

        assert!(!outcome.failed());
        assert_eq!(outcome.issues[0].issue_type, IssueType::CheckSkipped);
    }

    #[tokio::test]
    async fn test_skipped_metric_passes_at_info_threshold() {
        let pool = connect_in_memory().await.unwrap();
        let expectations = ExpectationsConfig::default();
        let outcome = Validator::new(metric_plan(), &expectations, Severity::Info)
            .run_all(&pool)
            .await
            .unwrap();

        assert_eq!(outcome.state, ValidationState::Passed);
        assert!(outcome.issues.iter().all(|i| i.issue_type == IssueType::CheckSkipped));
        assert_eq!(outcome.counts.info, outcome.issues.len());
    }

    #[tokio::test]
    async fn test_validator_runs_once() {
        let pool = connect_in_memory().await.unwrap();
        let expectations = ExpectationsConfig::default();
        let mut validator =
            Validator::new(ValidationPlan::default(), &expectations, Severity::Error);
        validator.run_all(&pool).await.unwrap();
        assert!(matches!(validator.run_all(&pool).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_lower_threshold_fails_on_warnings() {
        let pool = metric_pool(2.0).await;
        let expectations = ExpectationsConfig::default();
        let outcome = Validator::new(metric_plan(), &expectations, Severity::Warn)
            .run_all(&pool)
            .await
            .unwrap();
        assert!(outcome.failed());
    }
}
