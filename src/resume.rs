//! Resume advice for interrupted or partial runs.
//!
//! The pipeline is a fixed sequence of steps. The next step to run is the
//! first one that has not cleanly completed in the given run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::ManifestError;
use crate::manifest::{read_manifest, RunManifest, StepStatus, MANIFEST_FILE_NAME};

/// Pipeline steps in execution order.
pub const PIPELINE_STEPS: [&str; 6] = ["ingest", "map", "prepare", "mine", "report", "review"];

/// Directory under the project root that holds one subdirectory per run.
pub const OUTPUTS_DIR_NAME: &str = "outputs";

/// Returns the first pipeline step that is missing, failed or still started.
///
/// `None` means every step in [`PIPELINE_STEPS`] is completed.
pub fn next_step(manifest: &RunManifest) -> Option<&'static str> {
    let statuses: HashMap<&str, StepStatus> = manifest
        .steps
        .iter()
        .map(|step| (step.name.as_str(), step.status))
        .collect();

    PIPELINE_STEPS
        .iter()
        .copied()
        .find(|step| statuses.get(step) != Some(&StepStatus::Completed))
}

/// Path of a run's directory under the project root.
pub fn run_dir(project_dir: &Path, run_id: &str) -> PathBuf {
    project_dir.join(OUTPUTS_DIR_NAME).join(run_id)
}

/// Loads the most recently modified run document under `<project>/outputs/*/`.
///
/// Returns `Ok(None)` when no run exists yet.
pub fn latest_run(project_dir: &Path) -> Result<Option<RunManifest>, ManifestError> {
    let outputs = project_dir.join(OUTPUTS_DIR_NAME);
    let entries = match fs::read_dir(&outputs) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut candidates: Vec<(Option<SystemTime>, PathBuf)> = Vec::new();
    for entry in entries {
        let path = entry?.path().join(MANIFEST_FILE_NAME);
        if !path.is_file() {
            continue;
        }
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
        candidates.push((modified, path));
    }

    // Newest first; paths break ties and order entries without a readable mtime.
    candidates.sort_by(|(a_time, a_path), (b_time, b_path)| {
        b_time.cmp(a_time).then_with(|| b_path.cmp(a_path))
    });

    match candidates.into_iter().next() {
        Some((_, path)) => {
            debug!(path = %path.display(), "Latest run manifest");
            read_manifest(&path).map(Some)
        }
        None => Ok(None),
    }
}
