//! Drift and validation issue model
//!
//! Issues are data, never errors. They are produced by the drift detector,
//! the validation orchestrator and batch resolution, and consumed by the run
//! ledger and by the pass/fail decision.

use chrono::{DateTime, Utc};
use courtdb_common::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of object an issue is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Incoming external extract
    Source,
    /// Warehouse table
    Table,
    /// Warehouse view
    View,
    /// Parent/child or hub/satellite relationship
    Relationship,
    /// Derived metric column
    Metric,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Source => "source",
            SourceKind::Table => "table",
            SourceKind::View => "view",
            SourceKind::Relationship => "relationship",
            SourceKind::Metric => "metric",
        }
    }
}

/// Configurable severity policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKey {
    MissingColumn,
    ExtraColumn,
    TypeMismatch,
    PrimaryKeyViolation,
    NullInRequired,
    RowCountZero,
}

impl PolicyKey {
    pub const ALL: [PolicyKey; 6] = [
        PolicyKey::MissingColumn,
        PolicyKey::ExtraColumn,
        PolicyKey::TypeMismatch,
        PolicyKey::PrimaryKeyViolation,
        PolicyKey::NullInRequired,
        PolicyKey::RowCountZero,
    ];

    /// Built-in global default
    pub fn default_severity(&self) -> Severity {
        match self {
            PolicyKey::MissingColumn => Severity::Error,
            PolicyKey::ExtraColumn => Severity::Warn,
            PolicyKey::TypeMismatch => Severity::Warn,
            PolicyKey::PrimaryKeyViolation => Severity::Error,
            PolicyKey::NullInRequired => Severity::Error,
            PolicyKey::RowCountZero => Severity::Warn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKey::MissingColumn => "missing_column",
            PolicyKey::ExtraColumn => "extra_column",
            PolicyKey::TypeMismatch => "type_mismatch",
            PolicyKey::PrimaryKeyViolation => "primary_key_violation",
            PolicyKey::NullInRequired => "null_in_required",
            PolicyKey::RowCountZero => "row_count_zero",
        }
    }
}

/// Issue classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    // Shape drift
    MissingColumn,
    ExtraColumn,
    TypeMismatch,
    NullInPrimaryKey,
    PrimaryKeyViolation,
    NullInRequired,
    RowCountZero,
    // Warehouse validation
    MissingObject,
    Orphan,
    SatelliteCardinality,
    EmptyTable,
    BelowMinRows,
    MetricOutOfSoftBounds,
    MetricOutOfHardBounds,
    CheckSkipped,
    // Batch resolution
    UnresolvedReference,
}

impl IssueType {
    /// Fixed mapping from shape-drift issue types to severity policies
    pub fn policy_key(&self) -> Option<PolicyKey> {
        match self {
            IssueType::MissingColumn => Some(PolicyKey::MissingColumn),
            IssueType::ExtraColumn => Some(PolicyKey::ExtraColumn),
            IssueType::TypeMismatch => Some(PolicyKey::TypeMismatch),
            IssueType::NullInPrimaryKey => Some(PolicyKey::NullInRequired),
            IssueType::PrimaryKeyViolation => Some(PolicyKey::PrimaryKeyViolation),
            IssueType::NullInRequired => Some(PolicyKey::NullInRequired),
            IssueType::RowCountZero => Some(PolicyKey::RowCountZero),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::MissingColumn => "missing_column",
            IssueType::ExtraColumn => "extra_column",
            IssueType::TypeMismatch => "type_mismatch",
            IssueType::NullInPrimaryKey => "null_in_primary_key",
            IssueType::PrimaryKeyViolation => "primary_key_violation",
            IssueType::NullInRequired => "null_in_required",
            IssueType::RowCountZero => "row_count_zero",
            IssueType::MissingObject => "missing_object",
            IssueType::Orphan => "orphan",
            IssueType::SatelliteCardinality => "satellite_cardinality",
            IssueType::EmptyTable => "empty_table",
            IssueType::BelowMinRows => "below_min_rows",
            IssueType::MetricOutOfSoftBounds => "metric_out_of_soft_bounds",
            IssueType::MetricOutOfHardBounds => "metric_out_of_hard_bounds",
            IssueType::CheckSkipped => "check_skipped",
            IssueType::UnresolvedReference => "unresolved_reference",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed, severity-tagged finding. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftIssue {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    /// Structured details (column names, counts, samples)
    pub details: serde_json::Value,
    /// Run step that produced the issue
    pub step: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DriftIssue {
    pub fn new(
        source_kind: SourceKind,
        source_id: impl Into<String>,
        issue_type: IssueType,
        severity: Severity,
        details: serde_json::Value,
    ) -> Self {
        Self {
            source_kind,
            source_id: source_id.into(),
            issue_type,
            severity,
            details,
            step: None,
            timestamp: Utc::now(),
        }
    }

    /// Tag the issue with the step that produced it
    pub fn in_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Whether this finding fails a run at `threshold`
    ///
    /// Skipped checks are bookkeeping and never count, whatever the threshold.
    pub fn is_fatal(&self, threshold: Severity) -> bool {
        self.issue_type != IssueType::CheckSkipped && self.severity.is_at_least(threshold)
    }
}

impl fmt::Display for DriftIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {} {}",
            self.severity,
            self.source_kind.as_str(),
            self.source_id,
            self.issue_type,
            self.details
        )
    }
}

/// Issue counts partitioned by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warn: usize,
    pub error: usize,
}

impl SeverityCounts {
    pub fn tally<'a>(issues: impl IntoIterator<Item = &'a DriftIssue>) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            match issue.severity {
                Severity::Info => counts.info += 1,
                Severity::Warn => counts.warn += 1,
                Severity::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.info + self.warn + self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_policy_mapping_covers_shape_issues_only() {
        assert_eq!(IssueType::NullInPrimaryKey.policy_key(), Some(PolicyKey::NullInRequired));
        assert_eq!(IssueType::RowCountZero.policy_key(), Some(PolicyKey::RowCountZero));
        assert_eq!(IssueType::Orphan.policy_key(), None);
        assert_eq!(IssueType::MetricOutOfHardBounds.policy_key(), None);
    }

    #[test]
    fn test_issue_serializes_snake_case() {
        let issue = DriftIssue::new(
            SourceKind::Source,
            "player_box_scores",
            IssueType::ExtraColumn,
            Severity::Warn,
            json!({"column": "plus_minus"}),
        )
        .in_step("drift:player_box_scores");

        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["issue_type"], "extra_column");
        assert_eq!(value["source_kind"], "source");
        assert_eq!(value["severity"], "warn");
        assert_eq!(value["step"], "drift:player_box_scores");
    }

    #[test]
    fn test_skipped_check_is_never_fatal() {
        let skipped = DriftIssue::new(
            SourceKind::Metric,
            "player_game_advanced.ts_pct",
            IssueType::CheckSkipped,
            Severity::Info,
            json!({ "reason": "object does not exist" }),
        );
        assert!(!skipped.is_fatal(Severity::Info));

        let empty = DriftIssue::new(
            SourceKind::Table,
            "award",
            IssueType::EmptyTable,
            Severity::Info,
            json!({}),
        );
        assert!(empty.is_fatal(Severity::Info));
        assert!(!empty.is_fatal(Severity::Warn));
    }

    #[test]
    fn test_severity_counts() {
        let mk =
            |s| DriftIssue::new(SourceKind::Table, "game", IssueType::EmptyTable, s, json!({}));
        let issues = vec![mk(Severity::Warn), mk(Severity::Error), mk(Severity::Warn)];
        let counts = SeverityCounts::tally(&issues);
        assert_eq!(counts, SeverityCounts { info: 0, warn: 2, error: 1 });
        assert_eq!(counts.total(), 3);
    }
}
