use std::path::{Component, Path};

use chrono::{DateTime, Utc};

use crate::error::ManifestError;

/// Timestamp layout used for generated run IDs. Sorts lexically by time.
const RUN_ID_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Generates a run ID from the current UTC time, e.g. `20240101-100000`.
pub fn default_run_id() -> String {
    run_id_at(Utc::now())
}

pub fn run_id_at(now: DateTime<Utc>) -> String {
    now.format(RUN_ID_FORMAT).to_string()
}

/// Rejects run IDs that cannot name a run directory.
///
/// A run ID must be a single plain path segment so that its run directory
/// stays directly under `outputs/`.
pub fn validate_run_id(run_id: &str) -> Result<(), ManifestError> {
    if run_id.trim().is_empty() {
        return Err(ManifestError::MissingRunId);
    }
    let invalid = || ManifestError::InvalidRunId(run_id.to_string());
    if run_id.contains(['/', '\\']) {
        return Err(invalid());
    }
    let mut components = Path::new(run_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}
