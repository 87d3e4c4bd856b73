//! Core configuration.
//!
//! # Responsibility
//! - Load the JSON settings file used by request-surface hosts.
//! - Carry the policy switches for rules whose enforcement is still
//!   undecided (primary-contact area check, synergy exclusivity).
//!
//! # Invariants
//! - Every field has a default; an empty object `{}` is a valid config.
//! - Keys are camelCase on the wire.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// How a synergy contact that already works at the deal's company is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynergyExclusivity {
    /// Log a warning and accept the replacement.
    #[default]
    Advisory,
    /// Reject the replacement with a conflict.
    Enforced,
}

/// How the request surface executes multi-step sagas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaMode {
    /// One storage call per step; failures can leave partial state.
    #[default]
    Stepwise,
    /// All steps inside one transaction; failures roll back every step.
    Transactional,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DesignationPolicy {
    /// Require an area at the company before a contact can become its
    /// primary contact.
    pub primary_contact_requires_area: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynergyPolicy {
    pub exclusivity: SynergyExclusivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

/// Settings stored in `relatrack.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub logging: LoggingConfig,
    pub designation: DesignationPolicy,
    pub synergy: SynergyPolicy,
    pub saga_mode: SagaMode,
}

impl CoreConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "logging.maxFileSizeBytes must be greater than zero".to_string(),
            ));
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid(
                "logging.maxFiles must be greater than zero".to_string(),
            ));
        }
        if let Some(dir) = &self.logging.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.logDir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Reads a config file from disk.
pub fn load_config(path: impl AsRef<Path>) -> Result<CoreConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    CoreConfig::from_json_str(&raw)
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config, ConfigError, CoreConfig, SagaMode, SynergyExclusivity};

    #[test]
    fn empty_object_yields_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.synergy.exclusivity, SynergyExclusivity::Advisory);
        assert_eq!(config.saga_mode, SagaMode::Stepwise);
        assert!(!config.designation.primary_contact_requires_area);
    }

    #[test]
    fn camel_case_keys_are_read() {
        let config = CoreConfig::from_json_str(
            r#"{
                "sagaMode": "transactional",
                "synergy": { "exclusivity": "enforced" },
                "designation": { "primaryContactRequiresArea": true },
                "logging": { "level": "warn", "maxFiles": 2 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.saga_mode, SagaMode::Transactional);
        assert_eq!(config.synergy.exclusivity, SynergyExclusivity::Enforced);
        assert!(config.designation.primary_contact_requires_area);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.max_files, 2);
    }

    #[test]
    fn relative_log_dir_is_rejected() {
        let err = CoreConfig::from_json_str(r#"{ "logging": { "logDir": "logs" } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
