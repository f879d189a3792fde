//! Core runtime configuration.
//!
//! # Responsibility
//! - Resolve database location, log file settings, and busy timeout from
//!   `FOLIO_*` environment variables or a JSON document.
//!
//! # Invariants
//! - Missing values fall back to defaults; present but malformed values are
//!   rejected instead of silently ignored.

use crate::logging::{default_log_level, normalize_level};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "FOLIO_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "FOLIO_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "FOLIO_LOG_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "FOLIO_BUSY_TIMEOUT_MS";
pub const ENV_LOG_FILE_BASENAME: &str = "FOLIO_LOG_FILE_BASENAME";
pub const ENV_LOG_MAX_FILE_BYTES: &str = "FOLIO_LOG_MAX_FILE_BYTES";
pub const ENV_LOG_KEEP_FILES: &str = "FOLIO_LOG_KEEP_FILES";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_LOG_FILE_BASENAME: &str = "folio";
const DEFAULT_LOG_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_LOG_KEEP_FILES: usize = 5;

/// Errors from configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// One variable holds a value that cannot be used.
    InvalidValue { key: &'static str, value: String },
    /// JSON document could not be parsed.
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: `{value}`"),
            Self::Parse(err) => write!(f, "invalid configuration document: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

/// Settings consumed by the CLI and embedding hosts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite file. `None` means an in-memory database.
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute log directory. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    /// File name stem; rotated files get a numeric suffix.
    pub log_file_basename: String,
    /// Size at which the active log file rotates.
    pub log_max_file_bytes: u64,
    /// Rotated files retained next to the active one.
    pub log_keep_files: usize,
    pub busy_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            log_file_basename: DEFAULT_LOG_FILE_BASENAME.to_string(),
            log_max_file_bytes: DEFAULT_LOG_MAX_FILE_BYTES,
            log_keep_files: DEFAULT_LOG_KEEP_FILES,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl CoreConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = non_blank(lookup(ENV_DB_PATH)) {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(level) = non_blank(lookup(ENV_LOG_LEVEL)) {
            config.log_level = normalize_level(&level)
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_LOG_LEVEL,
                    value: level.clone(),
                })?
                .to_string();
        }
        if let Some(dir) = non_blank(lookup(ENV_LOG_DIR)) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(basename) = non_blank(lookup(ENV_LOG_FILE_BASENAME)) {
            config.log_file_basename = basename.trim().to_string();
        }
        if let Some(bytes) = non_blank(lookup(ENV_LOG_MAX_FILE_BYTES)) {
            config.log_max_file_bytes = parse_number(ENV_LOG_MAX_FILE_BYTES, bytes)?;
        }
        if let Some(keep) = non_blank(lookup(ENV_LOG_KEEP_FILES)) {
            config.log_keep_files = parse_number(ENV_LOG_KEEP_FILES, keep)?;
        }
        if let Some(timeout) = non_blank(lookup(ENV_BUSY_TIMEOUT_MS)) {
            config.busy_timeout_ms = parse_number(ENV_BUSY_TIMEOUT_MS, timeout)?;
        }
        Ok(config)
    }

    /// Parses a JSON configuration document; absent fields take defaults.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(document).map_err(ConfigError::Parse)?;
        config.log_level = normalize_level(&config.log_level)
            .map_err(|_| ConfigError::InvalidValue {
                key: ENV_LOG_LEVEL,
                value: config.log_level.clone(),
            })?
            .to_string();
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_number<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, CoreConfig, ENV_BUSY_TIMEOUT_MS, ENV_DB_PATH, ENV_LOG_FILE_BASENAME,
        ENV_LOG_KEEP_FILES, ENV_LOG_LEVEL, ENV_LOG_MAX_FILE_BYTES,
    };
    use crate::logging::default_log_level;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = CoreConfig::from_lookup(lookup(&[])).expect("defaults should load");
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.log_level, default_log_level());
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_file_basename, "folio");
        assert_eq!(config.log_max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.log_keep_files, 5);
    }

    #[test]
    fn environment_values_override_defaults() {
        let config = CoreConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/tmp/folio.db"),
            (ENV_LOG_LEVEL, " WARNING "),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_LOG_FILE_BASENAME, " authoring "),
            (ENV_LOG_MAX_FILE_BYTES, "1048576"),
            (ENV_LOG_KEEP_FILES, "3"),
        ]))
        .expect("values should load");

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/folio.db")));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.log_dir, None);
        assert_eq!(config.log_file_basename, "authoring");
        assert_eq!(config.log_max_file_bytes, 1_048_576);
        assert_eq!(config.log_keep_files, 3);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let error = CoreConfig::from_lookup(lookup(&[(ENV_BUSY_TIMEOUT_MS, "soon")]))
            .expect_err("non-numeric timeout must fail");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                key: ENV_BUSY_TIMEOUT_MS,
                ..
            }
        ));

        let error = CoreConfig::from_lookup(lookup(&[(ENV_LOG_LEVEL, "verbose")]))
            .expect_err("unknown level must fail");
        assert!(matches!(error, ConfigError::InvalidValue { key: ENV_LOG_LEVEL, .. }));

        let error = CoreConfig::from_lookup(lookup(&[(ENV_LOG_KEEP_FILES, "-1")]))
            .expect_err("negative keep count must fail");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                key: ENV_LOG_KEEP_FILES,
                ..
            }
        ));
    }

    #[test]
    fn json_document_fills_missing_fields_with_defaults() {
        let config = CoreConfig::from_json_str(r#"{"log_level":"ERROR","log_dir":"/var/log/folio"}"#)
            .expect("document should parse");
        assert_eq!(config.log_level, "error");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/folio")));
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert_eq!(config.log_file_basename, "folio");

        let config = CoreConfig::from_json_str(
            r#"{"log_file_basename":"folio_api","log_max_file_bytes":4096,"log_keep_files":1}"#,
        )
        .expect("rotation fields should parse");
        assert_eq!(config.log_file_basename, "folio_api");
        assert_eq!(config.log_max_file_bytes, 4096);
        assert_eq!(config.log_keep_files, 1);

        let error = CoreConfig::from_json_str(r#"{"cache_size":1}"#)
            .expect_err("unknown fields must fail");
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
