//! # courtdb engine
//!
//! Dimensional id resolution and schema-drift validation for the courtdb
//! basketball warehouse.
//!
//! - `expectations`: declarative per-source and per-table expectations
//! - `lookup`: immutable per-run lookups from warehouse snapshots
//! - `resolve`: pure identity resolvers over those lookups
//! - `drift`: shape comparison of extracts and tables against expectations
//! - `validation`: post-load warehouse checks and the pass/fail decision
//! - `ingest`: typed batch resolution of staged extracts
//! - `ledger`: run, step and issue records

pub mod drift;
pub mod expectations;
pub mod fingerprint;
pub mod ingest;
pub mod issue;
pub mod ledger;
pub mod lookup;
pub mod records;
pub mod resolve;
pub mod validation;

pub use expectations::{ColumnExpectation, Expectation, ExpectationsConfig};
pub use issue::{DriftIssue, IssueType, PolicyKey, SeverityCounts, SourceKind};
pub use lookup::Lookups;
pub use resolve::{MatchPath, Resolution};
pub use validation::{ValidationOutcome, ValidationPlan, ValidationState, Validator};
