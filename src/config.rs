//! Project configuration.
//!
//! Configuration lives in `runguard.yaml` at the project root (or a path
//! given explicitly). It supplies the event log location, column mapping,
//! timestamp format and quality thresholds. A copy is written into each run
//! directory as `config_snapshot.yaml` for audit.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::quality::{LogColumns, Thresholds, TimestampFormat};

/// Supported configuration schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Default configuration file name looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "runguard.yaml";

/// File name of the per-run configuration snapshot.
pub const SNAPSHOT_FILE_NAME: &str = "config_snapshot.yaml";

/// Something that can persist a point-in-time copy of the run configuration.
pub trait SnapshotWriter {
    fn write_snapshot(&self, path: &Path) -> Result<(), ConfigError>;
}

/// Top-level project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where this config was loaded from. Never serialized.
    #[serde(skip)]
    pub path: Option<PathBuf>,
    pub version: u32,
    pub project: ProjectConfig,
    pub quality: QualityConfig,
    pub connectors: Vec<ConnectorSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
}

/// Column mapping and thresholds for the review step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub case_column: String,
    pub activity_column: String,
    pub timestamp_column: String,
    /// Empty means RFC 3339.
    pub timestamp_format: String,
    pub thresholds: Thresholds,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let columns = LogColumns::default();
        Self {
            case_column: columns.case,
            activity_column: columns.activity,
            timestamp_column: columns.timestamp,
            timestamp_format: String::new(),
            thresholds: Thresholds::default(),
        }
    }
}

impl QualityConfig {
    pub fn columns(&self) -> LogColumns {
        LogColumns::new(
            self.case_column.as_str(),
            self.activity_column.as_str(),
            self.timestamp_column.as_str(),
        )
    }

    pub fn timestamp_format(&self) -> TimestampFormat {
        TimestampFormat::from_pattern(&self.timestamp_format)
    }
}

/// A data source the pipeline can ingest from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileConnector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConnector {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            version: CONFIG_VERSION,
            project: ProjectConfig::default(),
            quality: QualityConfig::default(),
            connectors: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from `runguard.yaml` in
    /// `project_dir` when no path is given.
    ///
    /// A missing file yields defaults. Environment overrides are applied
    /// before validation.
    pub fn load(path: Option<&Path>, project_dir: &Path) -> Result<Self, ConfigError> {
        let resolved = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_dir.join(CONFIG_FILE_NAME));

        let mut config = match fs::read_to_string(&resolved) {
            Ok(data) => {
                let mut config: Config = serde_yaml::from_str(&data)?;
                config.path = Some(resolved.clone());
                debug!(path = %resolved.display(), "Loaded configuration");
                config
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %resolved.display(), "No configuration file; using defaults");
                Config::default()
            }
            Err(err) => return Err(err.into()),
        };

        if config.version == 0 {
            config.version = CONFIG_VERSION;
        }
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `RUNGUARD_*_THRESHOLD` environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RUNGUARD_MISSING_THRESHOLD`
    /// - `RUNGUARD_DUPLICATE_THRESHOLD`
    /// - `RUNGUARD_ORDER_THRESHOLD`
    /// - `RUNGUARD_PARSE_THRESHOLD`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let thresholds = &mut self.quality.thresholds;
        let targets: [(&str, &mut f64); 4] = [
            ("RUNGUARD_MISSING_THRESHOLD", &mut thresholds.missing_value),
            ("RUNGUARD_DUPLICATE_THRESHOLD", &mut thresholds.duplicate),
            ("RUNGUARD_ORDER_THRESHOLD", &mut thresholds.order_violation),
            ("RUNGUARD_PARSE_THRESHOLD", &mut thresholds.parse_failure),
        ];
        for (key, target) in targets {
            if let Some(raw) = lookup(key) {
                *target = parse_fraction(key, &raw)?;
            }
        }
        Ok(())
    }

    /// Checks schema version, threshold ranges and connector shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        self.quality.thresholds.validate()?;
        for connector in &self.connectors {
            if connector.kind.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "connector '{}' has no type",
                    connector.name
                )));
            }
            if connector.kind == "file"
                && connector.file.as_ref().map_or(true, |f| f.paths.is_empty())
            {
                return Err(ConfigError::ValidationFailed(format!(
                    "file connector '{}' has no paths",
                    connector.name
                )));
            }
        }
        Ok(())
    }

    /// First path of the first file connector, if any.
    pub fn active_log_path(&self) -> Option<&Path> {
        self.connectors
            .iter()
            .filter(|c| c.kind == "file")
            .filter_map(|c| c.file.as_ref())
            .find_map(|f| f.paths.first())
            .map(PathBuf::as_path)
    }
}

impl SnapshotWriter for Config {
    fn write_snapshot(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }
}

/// Parses a threshold value in `[0, 1]`.
pub fn parse_fraction(key: &str, raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}' is not a number", raw),
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{} is outside [0, 1]", value),
        });
    }
    Ok(value)
}
