//! Error types for runguard operations.
//!
//! Defines error types for each subsystem:
//! - Content fingerprinting of run inputs and outputs
//! - Run manifest persistence and step lifecycle
//! - Quality gate evaluation and report output
//! - Project configuration loading and snapshots
//! - Step driver operations that combine the above

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fingerprinting files.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Errors that can occur during run manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Run ID is required")]
    MissingRunId,

    #[error("Run ID '{0}' must be a single path segment")]
    InvalidRunId(String),

    #[error("Output directory is required")]
    MissingDirectory,

    #[error("Step name is required")]
    MissingStepName,

    #[error("Unsupported manifest schema version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("Run ID mismatch: expected '{expected}', found '{found}'")]
    RunIdMismatch { expected: String, found: String },

    #[error("Manifest lock poisoned")]
    LockPoisoned,

    #[error("Failed to persist manifest '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during quality gate evaluation.
#[derive(Debug, Error)]
pub enum QualityError {
    #[error("Failed to open input log '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported config schema version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors surfaced by the step driver, which spans the run store, the
/// quality gate and configuration snapshots.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Quality error: {0}")]
    Quality(#[from] QualityError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
