//! courtdb preflight runner
//!
//! Runs the drift checks, optional batch resolution and the validation pass
//! against one warehouse, records the run in the ledger and maps the result
//! onto the process exit code:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | clean, or findings below the fatal threshold |
//! | 1 | at least one finding at or above the fatal threshold |
//! | 2 | infrastructure error; the run is recorded as `incomplete` |

use courtdb_common::config::Settings;
use courtdb_common::db::{connect_warehouse, SchemaIntrospector, Snapshot};
use courtdb_common::{Result, Severity};
use courtdb_engine::drift::{check_table_shape, observe_and_check_source, observe_table};
use courtdb_engine::fingerprint::fingerprint_keys;
use courtdb_engine::ingest::{
    resolve_box_scores, resolve_draft_picks, BoxScorePolicies, DraftPolicies,
};
use courtdb_engine::ledger::{RunRecorder, RunStatus, StepRecord, StepStatus};
use courtdb_engine::lookup::{
    default_abbreviation_remaps, Lookups, GAME_TABLE, PLAYER_TABLE, SEASON_TABLE, TEAM_TABLE,
};
use courtdb_engine::records::{staging_table, DRAFT_PICKS_SOURCE, PLAYER_BOX_SCORES_SOURCE};
use courtdb_engine::{DriftIssue, ExpectationsConfig, SeverityCounts, ValidationPlan, Validator};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

pub const EXIT_CLEAN: u8 = 0;
pub const EXIT_FATAL: u8 = 1;
pub const EXIT_INFRASTRUCTURE: u8 = 2;

/// Ledger job name
pub const JOB_NAME: &str = "courtdb-preflight";

/// What a run does beyond validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Drift checks and warehouse validation
    Preflight,
    /// Preflight plus batch resolution of the staged extracts
    Resolve,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Preflight => "preflight",
            Mode::Resolve => "resolve",
        }
    }
}

/// Outcome of a run that reached a decision
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub issues: Vec<DriftIssue>,
    pub counts: SeverityCounts,
}

impl RunReport {
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Failed => EXIT_FATAL,
            RunStatus::Incomplete | RunStatus::Running => EXIT_INFRASTRUCTURE,
            RunStatus::Succeeded => EXIT_CLEAN,
        }
    }
}

/// Run every step against an open warehouse
///
/// Issues and steps are accumulated on `recorder`. Any `Err` is an
/// infrastructure failure; data findings never surface as errors.
pub async fn run_steps(
    pool: &SqlitePool,
    settings: &Settings,
    expectations: &ExpectationsConfig,
    plan: ValidationPlan,
    mode: Mode,
    recorder: &mut RunRecorder,
) -> Result<RunReport> {
    check_tables(pool, expectations, settings.fatal_threshold, recorder).await?;
    check_sources(pool, expectations, settings.fatal_threshold, recorder).await?;

    if mode == Mode::Resolve {
        resolve_staged(pool, settings, expectations, recorder).await?;
    }

    let mut validator = Validator::new(plan, expectations, settings.fatal_threshold);
    let outcome = validator.run_all(pool).await?;
    recorder.add_step(
        StepRecord::begin("validate")
            .judged(&outcome.issues, settings.fatal_threshold)
            .with_meta("state", json!(outcome.state)),
    );
    recorder.add_issues(outcome.issues);

    let issues = recorder.issues().to_vec();
    let counts = SeverityCounts::tally(&issues);
    let fatal = issues.iter().any(|i| i.is_fatal(settings.fatal_threshold));
    let status = if fatal { RunStatus::Failed } else { RunStatus::Succeeded };

    Ok(RunReport { status, issues, counts })
}

/// Table-shape drift for every table with an expectation entry
async fn check_tables(
    pool: &SqlitePool,
    expectations: &ExpectationsConfig,
    fatal_threshold: Severity,
    recorder: &mut RunRecorder,
) -> Result<()> {
    for (table, entry) in &expectations.tables {
        let step = StepRecord::begin(format!("drift:table:{}", table)).with_input(table.as_str());
        if !SchemaIntrospector::object_exists(pool, table).await? {
            // Reported by the structural check when the table is required
            recorder.add_step(step.skipped("table does not exist"));
            continue;
        }

        let observed = observe_table(pool, table, Some(entry)).await?;
        let issues = check_table_shape(table, &observed, expectations);
        let issues = tag(issues, &step.name);
        recorder.add_step(step.judged(&issues, fatal_threshold));
        recorder.add_issues(issues);
    }
    Ok(())
}

/// Source-shape drift for every staged extract with an expectation entry
async fn check_sources(
    pool: &SqlitePool,
    expectations: &ExpectationsConfig,
    fatal_threshold: Severity,
    recorder: &mut RunRecorder,
) -> Result<()> {
    for source_id in expectations.sources.keys() {
        let staged = staging_table(source_id);
        let step = StepRecord::begin(source_drift_step(source_id)).with_input(staged.as_str());
        if !SchemaIntrospector::object_exists(pool, &staged).await? {
            debug!(source = %source_id, "No staged extract");
            recorder.add_step(step.skipped(format!("{} does not exist", staged)));
            continue;
        }

        let (issues, shape) =
            observe_and_check_source(pool, source_id, &staged, expectations).await?;
        let fingerprint = fingerprint_keys(expectations.defaults.hash_algorithm, &shape.key_values);
        let issues = tag(issues, &step.name);
        recorder.add_step(
            step.judged(&issues, fatal_threshold)
                .with_meta("row_count", json!(shape.row_count))
                .with_meta("hash_algorithm", json!(expectations.defaults.hash_algorithm.as_str()))
                .with_meta("key_fingerprint", json!(fingerprint)),
        );
        recorder.add_issues(issues);
    }
    Ok(())
}

/// Dimension tables the lookups are built from
const LOOKUP_TABLES: [&str; 4] = [PLAYER_TABLE, TEAM_TABLE, SEASON_TABLE, GAME_TABLE];

fn source_drift_step(source_id: &str) -> String {
    format!("drift:source:{}", source_id)
}

fn resolve_step(source_id: &str) -> String {
    format!("resolve:{}", source_id)
}

/// Whether the source's drift step failed in this run
fn drift_failed(recorder: &RunRecorder, source_id: &str) -> bool {
    let name = source_drift_step(source_id);
    recorder.steps().iter().any(|s| s.name == name && s.status == StepStatus::Failed)
}

/// Resolve the staged box score and draft extracts against fresh lookups
///
/// A missing dimension table skips resolution so the structural check can
/// report it; a source whose drift step failed is not resolved.
async fn resolve_staged(
    pool: &SqlitePool,
    settings: &Settings,
    expectations: &ExpectationsConfig,
    recorder: &mut RunRecorder,
) -> Result<()> {
    let mut staged = Vec::new();
    for source_id in [PLAYER_BOX_SCORES_SOURCE, DRAFT_PICKS_SOURCE] {
        let table = staging_table(source_id);
        if SchemaIntrospector::object_exists(pool, &table).await? {
            staged.push((source_id, table));
        }
    }
    if staged.is_empty() {
        debug!("No staged extracts to resolve");
        return Ok(());
    }

    let mut missing = Vec::new();
    for table in LOOKUP_TABLES {
        if !SchemaIntrospector::object_exists(pool, table).await? {
            missing.push(table);
        }
    }
    if !missing.is_empty() {
        warn!("Lookup tables missing ({}); resolution skipped", missing.join(", "));
        for (source_id, table) in &staged {
            recorder.add_step(
                StepRecord::begin(resolve_step(source_id))
                    .with_input(table.as_str())
                    .skipped(format!("lookup tables missing: {}", missing.join(", "))),
            );
        }
        return Ok(());
    }

    let lookups =
        Lookups::load(pool, &settings.primary_league, &default_abbreviation_remaps()).await?;

    for (source_id, table) in staged {
        let step = StepRecord::begin(resolve_step(source_id)).with_input(table.as_str());
        if drift_failed(recorder, source_id) {
            warn!(source = source_id, "Source drift failed; resolution skipped");
            recorder.add_step(step.skipped(format!("{} failed", source_drift_step(source_id))));
            continue;
        }

        let snapshot = Snapshot::load_table(pool, &table).await?;
        let (step, issues) = if source_id == PLAYER_BOX_SCORES_SOURCE {
            let batch = resolve_box_scores(
                &snapshot,
                &lookups,
                BoxScorePolicies::default(),
                expectations,
                settings.copy_batch_size,
            );
            let step = step
                .with_output("player_box_score")
                .judged(&batch.issues, settings.fatal_threshold)
                .with_meta("resolution", batch.summary())
                .with_meta("chunks", json!(batch.chunks().count()));
            (step, batch.issues)
        } else {
            let batch = resolve_draft_picks(
                &snapshot,
                &lookups,
                DraftPolicies::default(),
                expectations,
                settings.copy_batch_size,
            );
            let step = step
                .with_output("draft")
                .judged(&batch.issues, settings.fatal_threshold)
                .with_meta("resolution", batch.summary())
                .with_meta("chunks", json!(batch.chunks().count()));
            (step, batch.issues)
        };
        recorder.add_step(step);
        recorder.add_issues(issues);
    }

    Ok(())
}

fn tag(issues: Vec<DriftIssue>, step: &str) -> Vec<DriftIssue> {
    issues.into_iter().map(|i| i.in_step(step)).collect()
}

/// Run end to end and return the process exit code
///
/// Opens the warehouse (read-only when the ledger is disabled), loads the
/// expectations fail-open, runs every step and records the run. An
/// infrastructure error ends the run as `incomplete` with exit code 2.
pub async fn execute(settings: &Settings, plan: ValidationPlan, mode: Mode) -> u8 {
    let expectations = ExpectationsConfig::load(&settings.expectations_path);
    let mut recorder = RunRecorder::start(JOB_NAME, mode.as_str());

    let pool = match connect_warehouse(&settings.database_path, !settings.record_ledger).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Cannot open warehouse: {}", e);
            recorder.finish(RunStatus::Incomplete, Some(e.to_string()));
            return EXIT_INFRASTRUCTURE;
        }
    };

    let code = match run_steps(&pool, settings, &expectations, plan, mode, &mut recorder).await {
        Ok(report) => {
            for issue in &report.issues {
                if issue.is_fatal(settings.fatal_threshold) {
                    error!("{}", issue);
                } else {
                    info!("{}", issue);
                }
            }
            let message = format!(
                "{} errors, {} warnings, {} info",
                report.counts.error, report.counts.warn, report.counts.info
            );
            recorder.finish(report.status, Some(message));
            report.exit_code()
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            recorder.add_step(StepRecord::begin("abort").failed(e.to_string()));
            recorder.finish(RunStatus::Incomplete, Some(e.to_string()));
            EXIT_INFRASTRUCTURE
        }
    };

    if settings.record_ledger {
        if let Err(e) = recorder.persist(&pool).await {
            // The decision stands; only the audit trail is missing
            warn!("Failed to record run {} in ledger: {}", recorder.run_id, e);
        }
    }

    pool.close().await;
    code
}
