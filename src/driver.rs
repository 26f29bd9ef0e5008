//! Helpers for pipeline step processes.
//!
//! Each step of the pipeline runs as its own process. These helpers wrap the
//! run store with the bookkeeping every step performs: opening the run and
//! snapshotting config, marking the step started and finished, and for the
//! review step, running the quality gate and writing its artifacts.

use std::path::Path;

use tracing::{info, warn};

use crate::config::{SnapshotWriter, SNAPSHOT_FILE_NAME};
use crate::error::{ManifestError, RunError};
use crate::manifest::{default_run_id, RunStatus, RunStore};
use crate::quality::{write_outputs, GateOutcome, QualityArtifacts, QualityGate};
use crate::resume::run_dir;

/// Step name used for the quality gate.
pub const REVIEW_STEP: &str = "review";

/// Message recorded when the review step halts on blocking issues.
pub const BLOCKING_MESSAGE: &str = "blocking QA issues detected";

const ABORTED_MESSAGE: &str = "step did not complete";

/// Opens (or creates) the run under `<project>/outputs/<run_id>/` and
/// records a fresh configuration snapshot in it.
///
/// A new run ID is generated from the current time when none is given.
pub fn init_run(
    project_dir: &Path,
    run_id: Option<&str>,
    snapshot: &dyn SnapshotWriter,
) -> Result<RunStore, RunError> {
    let run_id = match run_id {
        Some(id) => id.to_string(),
        None => default_run_id(),
    };
    let (store, manifest) = RunStore::open(&run_id, run_dir(project_dir, &run_id))?;

    let snapshot_path = store.dir().join(SNAPSHOT_FILE_NAME);
    snapshot.write_snapshot(&snapshot_path)?;
    store.set_config_snapshot(&snapshot_path)?;

    info!(
        run_id = %store.run_id(),
        status = %manifest.status,
        dir = %store.dir().display(),
        "Run initialized"
    );
    Ok(store)
}

/// Marks a step started and guarantees it ends up finished.
///
/// Dropping the scope without calling [`StepScope::complete`] or
/// [`StepScope::fail`] marks the step and the run failed.
pub struct StepScope<'a> {
    store: &'a RunStore,
    name: String,
    finished: bool,
}

impl<'a> StepScope<'a> {
    pub fn begin(store: &'a RunStore, name: &str) -> Result<Self, ManifestError> {
        store.start_step(name)?;
        info!(run_id = %store.run_id(), step = name, "Step started");
        Ok(Self {
            store,
            name: name.to_string(),
            finished: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn complete(mut self) -> Result<(), ManifestError> {
        self.finished = true;
        self.store.complete_step(&self.name)?;
        info!(run_id = %self.store.run_id(), step = %self.name, "Step completed");
        Ok(())
    }

    /// Marks the step and the whole run failed.
    pub fn fail(mut self, message: &str) -> Result<(), ManifestError> {
        self.finished = true;
        mark_failed(self.store, &self.name, message)
    }
}

impl Drop for StepScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = mark_failed(self.store, &self.name, ABORTED_MESSAGE) {
            warn!(step = %self.name, error = %err, "Failed to record aborted step");
        }
    }
}

fn mark_failed(store: &RunStore, step: &str, message: &str) -> Result<(), ManifestError> {
    store.fail_step(step, message)?;
    store.set_status(RunStatus::Failed)?;
    warn!(run_id = %store.run_id(), step, message, "Step failed");
    Ok(())
}

/// Result of a review step.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    /// The run passed review (or blocking issues were allowed) and is complete.
    Completed {
        gate: GateOutcome,
        artifacts: QualityArtifacts,
    },
    /// Blocking issues halted the run; the step and run are marked failed.
    Blocked {
        gate: GateOutcome,
        artifacts: QualityArtifacts,
    },
}

impl ReviewOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ReviewOutcome::Blocked { .. })
    }

    pub fn gate(&self) -> &GateOutcome {
        match self {
            ReviewOutcome::Completed { gate, .. } | ReviewOutcome::Blocked { gate, .. } => gate,
        }
    }

    pub fn artifacts(&self) -> &QualityArtifacts {
        match self {
            ReviewOutcome::Completed { artifacts, .. }
            | ReviewOutcome::Blocked { artifacts, .. } => artifacts,
        }
    }
}

/// Runs the review step: evaluates `log_path`, writes the quality artifacts
/// into the run directory and finishes the step.
///
/// Blocking issues fail the step and the run unless `allow_blocking` is set.
/// Any error along the way also leaves the step and run failed.
pub fn run_review(
    store: &RunStore,
    log_path: &Path,
    gate: &QualityGate,
    allow_blocking: bool,
) -> Result<ReviewOutcome, RunError> {
    let scope = StepScope::begin(store, REVIEW_STEP)?;
    store.add_inputs(&[log_path])?;

    let outcome = gate.evaluate(log_path)?;
    let artifacts = write_outputs(store.dir(), &outcome.report, &outcome.backlog)?;

    if outcome.is_blocked() && !allow_blocking {
        scope.fail(BLOCKING_MESSAGE)?;
        return Ok(ReviewOutcome::Blocked {
            gate: outcome,
            artifacts,
        });
    }
    if outcome.is_blocked() {
        warn!(
            issues = outcome.report.blocking_issues.len(),
            "Continuing past blocking QA issues"
        );
    }

    store.add_outputs(&[artifacts.dir.as_path()])?;
    scope.complete()?;
    store.set_status(RunStatus::Completed)?;
    Ok(ReviewOutcome::Completed {
        gate: outcome,
        artifacts,
    })
}
