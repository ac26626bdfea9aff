//! Expectations model
//!
//! Declares, per external source and per warehouse table, the expected
//! columns, types, logical primary key and severity policy overrides.
//!
//! Loading is fail-open: a missing or malformed document yields an empty
//! configuration (no source or table checks) with the built-in severity
//! defaults, and exactly one warning line. Absent configuration must never
//! halt ingestion.
//!
//! # Format
//!
//! ```toml
//! version = 1
//! [defaults]
//! missing_column = "error"
//! hash_algorithm = "sha256"
//!
//! [sources.player_box_scores]
//! primary_key = ["game_id", "player_id"]
//! [sources.player_box_scores.columns]
//! game_id = { type = "string", nullable = false }
//! [sources.player_box_scores.policy]
//! extra_column = "info"
//!
//! [tables.player]
//! min_rows = 1
//! ```

use crate::fingerprint::HashAlgorithm;
use crate::issue::PolicyKey;
use courtdb_common::{Error, Result, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Highest document version this build understands
pub const SUPPORTED_VERSION: u32 = 1;

/// Expected shape of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnExpectation {
    /// Logical or SQL type name; `None` disables the type check
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    /// Absence of a required column is a `missing_column` issue
    #[serde(default = "default_true")]
    pub required: bool,
    /// `false` turns observed NULLs into `null_in_required` issues
    #[serde(default = "default_true")]
    pub nullable: bool,
}

impl ColumnExpectation {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: Some(type_name.into()), required: true, nullable: true }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

fn default_true() -> bool {
    true
}

/// Expectation entry for one source or table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Expectation {
    pub columns: BTreeMap<String, ColumnExpectation>,
    /// Logical primary key column set, in key order
    pub primary_key: Vec<String>,
    /// Entry-level severity overrides
    pub policy: BTreeMap<PolicyKey, Severity>,
    /// Minimum live row count (tables only)
    pub min_rows: Option<u64>,
    pub description: Option<String>,
}

impl Expectation {
    pub fn with_column(mut self, name: &str, column: ColumnExpectation) -> Self {
        self.columns.insert(name.to_string(), column);
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_policy(mut self, key: PolicyKey, severity: Severity) -> Self {
        self.policy.insert(key, severity);
        self
    }
}

/// Global policy defaults
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Defaults {
    /// Always fully populated with every `PolicyKey`
    pub policies: BTreeMap<PolicyKey, Severity>,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            policies: PolicyKey::ALL.iter().map(|k| (*k, k.default_severity())).collect(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

/// Loaded expectations. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectationsConfig {
    pub version: u32,
    pub defaults: Defaults,
    pub sources: BTreeMap<String, Expectation>,
    pub tables: BTreeMap<String, Expectation>,
}

impl Default for ExpectationsConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            defaults: Defaults::default(),
            sources: BTreeMap::new(),
            tables: BTreeMap::new(),
        }
    }
}

// Raw document shapes. Policy maps are read with string keys and converted,
// so an unknown policy name is reported with its own message.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    defaults: RawDefaults,
    #[serde(default)]
    sources: BTreeMap<String, RawExpectation>,
    #[serde(default)]
    tables: BTreeMap<String, RawExpectation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefaults {
    missing_column: Option<Severity>,
    extra_column: Option<Severity>,
    type_mismatch: Option<Severity>,
    primary_key_violation: Option<Severity>,
    null_in_required: Option<Severity>,
    row_count_zero: Option<Severity>,
    hash_algorithm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExpectation {
    #[serde(default)]
    columns: BTreeMap<String, ColumnExpectation>,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default)]
    policy: BTreeMap<String, Severity>,
    #[serde(default)]
    min_rows: Option<u64>,
    #[serde(default)]
    description: Option<String>,
}

impl FromStr for PolicyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PolicyKey::ALL
            .iter()
            .find(|k| k.as_str() == s.trim())
            .copied()
            .ok_or_else(|| Error::Config(format!("Unknown severity policy '{}'", s)))
    }
}

impl RawExpectation {
    fn into_expectation(self, name: &str) -> Result<Expectation> {
        let mut policy = BTreeMap::new();
        for (key, severity) in self.policy {
            let key = key
                .parse::<PolicyKey>()
                .map_err(|e| Error::Config(format!("{} (in '{}')", e, name)))?;
            policy.insert(key, severity);
        }

        Ok(Expectation {
            columns: self.columns,
            primary_key: self.primary_key,
            policy,
            min_rows: self.min_rows,
            description: self.description,
        })
    }
}

impl ExpectationsConfig {
    /// Load expectations, substituting the empty default on any failure
    ///
    /// Never fails: a missing or unparsable file logs one warning and
    /// returns a config with no sources or tables.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => {
                info!(
                    "Loaded expectations from {} ({} sources, {} tables)",
                    path.display(),
                    config.sources.len(),
                    config.tables.len()
                );
                config
            }
            Err(e) => {
                warn!("Expectations unavailable, source and table checks disabled: {}", e);
                Self::default()
            }
        }
    }

    /// Strict load: I/O and parse failures are returned
    pub fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Strict parse of a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawDocument = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Malformed expectations document: {}", e)))?;

        let version = raw.version.unwrap_or(SUPPORTED_VERSION);
        if version > SUPPORTED_VERSION {
            warn!(
                "Expectations version {} is newer than supported {}; reading anyway",
                version, SUPPORTED_VERSION
            );
        }

        let mut defaults = Defaults::default();
        let overrides = [
            (PolicyKey::MissingColumn, raw.defaults.missing_column),
            (PolicyKey::ExtraColumn, raw.defaults.extra_column),
            (PolicyKey::TypeMismatch, raw.defaults.type_mismatch),
            (PolicyKey::PrimaryKeyViolation, raw.defaults.primary_key_violation),
            (PolicyKey::NullInRequired, raw.defaults.null_in_required),
            (PolicyKey::RowCountZero, raw.defaults.row_count_zero),
        ];
        for (key, severity) in overrides {
            if let Some(severity) = severity {
                defaults.policies.insert(key, severity);
            }
        }
        if let Some(name) = raw.defaults.hash_algorithm.as_deref() {
            defaults.hash_algorithm = HashAlgorithm::from_name(name);
        }

        let mut sources = BTreeMap::new();
        for (name, entry) in raw.sources {
            let expectation = entry.into_expectation(&name)?;
            sources.insert(name, expectation);
        }
        let mut tables = BTreeMap::new();
        for (name, entry) in raw.tables {
            let expectation = entry.into_expectation(&name)?;
            tables.insert(name, expectation);
        }

        Ok(Self { version, defaults, sources, tables })
    }

    pub fn get_source_expectation(&self, source_id: &str) -> Option<&Expectation> {
        self.sources.get(source_id)
    }

    pub fn get_table_expectation(&self, table_name: &str) -> Option<&Expectation> {
        self.tables.get(table_name)
    }

    /// Resolve the effective severity for a policy
    ///
    /// Precedence: explicit override, then entry-level policy, then global
    /// default, then `warn`.
    pub fn resolve_severity(
        &self,
        key: PolicyKey,
        entry: Option<&Expectation>,
        override_severity: Option<Severity>,
    ) -> Severity {
        override_severity
            .or_else(|| entry.and_then(|e| e.policy.get(&key).copied()))
            .or_else(|| self.defaults.policies.get(&key).copied())
            .unwrap_or(Severity::Warn)
    }
}
