//! Bootstrap settings loading
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`COURTDB_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Every scalar override fails loud: a value that does not parse is a
//! `Error::Config`, whether it came from the environment or the TOML file.
//! Only the expectations file is fail-open, and that is handled by the engine.

use crate::{Error, Result, Severity};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Environment variable names
pub const ENV_CONFIG: &str = "COURTDB_CONFIG";
pub const ENV_DATABASE: &str = "COURTDB_DATABASE";
pub const ENV_EXPECTATIONS: &str = "COURTDB_EXPECTATIONS";
pub const ENV_LOG_LEVEL: &str = "COURTDB_LOG_LEVEL";
pub const ENV_FATAL_THRESHOLD: &str = "COURTDB_FATAL_THRESHOLD";
pub const ENV_COPY_BATCH_SIZE: &str = "COURTDB_COPY_BATCH_SIZE";
pub const ENV_PRIMARY_LEAGUE: &str = "COURTDB_PRIMARY_LEAGUE";
pub const ENV_RECORD_LEDGER: &str = "COURTDB_RECORD_LEDGER";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Path to the SQLite warehouse file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Path to the expectations document
    #[serde(default)]
    pub expectations_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Engine tuning knobs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub fatal_threshold: Option<Severity>,
    #[serde(default)]
    pub copy_batch_size: Option<usize>,
    #[serde(default)]
    pub primary_league: Option<String>,
    #[serde(default)]
    pub record_ledger: Option<bool>,
}

impl TomlConfig {
    /// Parse a bootstrap file; any syntax or type error is fatal
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub expectations_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub fatal_threshold: Option<Severity>,
    pub record_ledger: Option<bool>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub expectations_path: PathBuf,
    pub log_level: String,
    /// Findings at or above this severity fail the run
    pub fatal_threshold: Severity,
    /// Row chunk size handed to the external bulk writer
    pub copy_batch_size: usize,
    /// League code used when a season reference carries none
    pub primary_league: String,
    pub record_ledger: bool,
}

/// Compiled defaults
pub const DEFAULT_COPY_BATCH_SIZE: usize = 5_000;
pub const DEFAULT_PRIMARY_LEAGUE: &str = "NBA";
pub const DEFAULT_LOG_LEVEL: &str = "info";

impl Settings {
    /// Compiled defaults for the current platform
    pub fn defaults() -> Self {
        Self {
            database_path: default_data_dir().join("warehouse.db"),
            expectations_path: default_config_dir().join("expectations.toml"),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            fatal_threshold: Severity::Error,
            copy_batch_size: DEFAULT_COPY_BATCH_SIZE,
            primary_league: DEFAULT_PRIMARY_LEAGUE.to_string(),
            record_ledger: true,
        }
    }

    /// Resolve settings from CLI, environment, TOML file and defaults
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = match locate_config_file(cli.config_path.as_deref())? {
            Some(path) => {
                info!("Loading bootstrap config: {}", path.display());
                TomlConfig::from_file(&path)?
            }
            None => {
                debug!("No bootstrap config file found, using defaults");
                TomlConfig::default()
            }
        };

        Self::resolve_with(cli, &file)
    }

    /// Resolve settings against an already-parsed bootstrap file
    pub fn resolve_with(cli: &CliOverrides, file: &TomlConfig) -> Result<Self> {
        let defaults = Self::defaults();

        let database_path = pick(
            cli.database_path.clone(),
            env_override::<PathBuf>(ENV_DATABASE)?,
            file.database_path.clone(),
            defaults.database_path,
        );
        let expectations_path = pick(
            cli.expectations_path.clone(),
            env_override::<PathBuf>(ENV_EXPECTATIONS)?,
            file.expectations_path.clone(),
            defaults.expectations_path,
        );
        let log_level = pick(
            cli.log_level.clone(),
            env_override::<String>(ENV_LOG_LEVEL)?,
            file.logging.level.clone(),
            defaults.log_level,
        );
        let fatal_threshold = pick(
            cli.fatal_threshold,
            env_override::<Severity>(ENV_FATAL_THRESHOLD)?,
            file.engine.fatal_threshold,
            defaults.fatal_threshold,
        );
        let copy_batch_size = pick(
            None,
            env_override::<usize>(ENV_COPY_BATCH_SIZE)?,
            file.engine.copy_batch_size,
            defaults.copy_batch_size,
        );
        let primary_league = pick(
            None,
            env_override::<String>(ENV_PRIMARY_LEAGUE)?,
            file.engine.primary_league.clone(),
            defaults.primary_league,
        );
        let record_ledger = pick(
            cli.record_ledger,
            env_bool(ENV_RECORD_LEDGER)?,
            file.engine.record_ledger,
            defaults.record_ledger,
        );

        if copy_batch_size == 0 {
            return Err(Error::Config("copy_batch_size must be greater than zero".to_string()));
        }
        let primary_league = primary_league.trim().to_uppercase();
        if primary_league.is_empty() {
            return Err(Error::Config("primary_league must not be blank".to_string()));
        }

        Ok(Self {
            database_path,
            expectations_path,
            log_level,
            fatal_threshold,
            copy_batch_size,
            primary_league,
            record_ledger,
        })
    }
}

fn pick<T>(cli: Option<T>, env: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(env).or(file).unwrap_or(default)
}

/// Read and parse an environment override
///
/// Unset or empty means "no override"; anything else must parse.
pub fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}='{}': {}", name, raw, e))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => {
            Err(Error::Config(format!("{} is not valid unicode", name)))
        }
    }
}

/// Boolean environment override, same fail-loud policy as every other scalar
pub fn env_bool(name: &str) -> Result<Option<bool>> {
    let raw = match env_override::<String>(name)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    parse_bool(&raw)
        .map(Some)
        .ok_or_else(|| Error::Config(format!("Invalid boolean for {}='{}'", name, raw)))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Find the bootstrap config file
///
/// An explicit path (CLI or `COURTDB_CONFIG`) must exist. Otherwise the user
/// config directory and then `/etc/courtdb` are tried; neither is required.
fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let explicit = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => env_override::<PathBuf>(ENV_CONFIG)?,
    };
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(Error::Config(format!("Config file not found: {}", path.display())));
    }

    let user_config = default_config_dir().join("courtdb.toml");
    if user_config.exists() {
        return Ok(Some(user_config));
    }

    let system_config = PathBuf::from("/etc/courtdb/courtdb.toml");
    if cfg!(unix) && system_config.exists() {
        return Ok(Some(system_config));
    }

    Ok(None)
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("courtdb"))
        .unwrap_or_else(|| PathBuf::from("./courtdb_config"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("courtdb"))
        .unwrap_or_else(|| PathBuf::from("./courtdb_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_forms() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_pick_priority() {
        assert_eq!(pick(Some(1), Some(2), Some(3), 4), 1);
        assert_eq!(pick(None, Some(2), Some(3), 4), 2);
        assert_eq!(pick(None, None, Some(3), 4), 3);
        assert_eq!(pick(None, None, None, 4), 4);
    }

    #[test]
    fn test_toml_config_rejects_malformed_batch_size() {
        let result: std::result::Result<TomlConfig, _> =
            toml::from_str("[engine]\ncopy_batch_size = \"lots\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_config_rejects_malformed_bool() {
        let result: std::result::Result<TomlConfig, _> =
            toml::from_str("[engine]\nrecord_ledger = \"sometimes\"\n");
        assert!(result.is_err());
    }
}
