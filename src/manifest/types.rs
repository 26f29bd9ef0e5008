use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::fingerprint::FileEntry;

/// The only manifest schema version this crate reads or writes.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the run document inside a run directory.
pub const MANIFEST_FILE_NAME: &str = "run_manifest.json";

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether this status closes the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Status of a single pipeline step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepStatus::Started => "started",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle record for one named step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure detail. Kept across later transitions unless replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepRecord {
    fn new(name: &str, status: StepStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            started_at: None,
            completed_at: None,
            message: None,
        }
    }

    /// Applies a status transition at time `now`.
    ///
    /// `started_at` is only stamped the first time the step enters
    /// `started`; `completed_at` is refreshed on every finishing transition.
    pub fn transition(&mut self, status: StepStatus, message: Option<&str>, now: DateTime<Utc>) {
        self.status = status;
        if status == StepStatus::Started && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_finished() {
            self.completed_at = Some(now);
        }
        if let Some(message) = message.filter(|m| !m.is_empty()) {
            self.message = Some(message.to_string());
        }
    }
}

/// Durable record of a pipeline run.
///
/// Serialized as `run_manifest.json` in the run directory. Other tooling
/// (status dashboards, resume helpers) reads this document directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FileEntry>,
}

impl RunManifest {
    /// Creates a fresh manifest in the `running` state.
    pub fn new(run_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.into(),
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
            config_snapshot: None,
            steps: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Looks up a step by name.
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Finds the named step or appends a new one, then applies the transition.
    pub fn record_step(
        &mut self,
        name: &str,
        status: StepStatus,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let index = match self.steps.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.steps.push(StepRecord::new(name, status));
                self.steps.len() - 1
            }
        };
        self.steps[index].transition(status, message, now);
    }

    /// Updates the run-level status, stamping `completed_at` on terminal values.
    pub fn set_status(&mut self, status: RunStatus, now: DateTime<Utc>) {
        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(now);
        } else {
            self.completed_at = None;
        }
    }
}

/// Merges `incoming` into `existing` with first-path-wins semantics.
///
/// Returns the merged list sorted by path, plus the incoming entries whose
/// path was already registered with a different digest.
pub fn merge_entries(
    existing: Vec<FileEntry>,
    incoming: Vec<FileEntry>,
) -> (Vec<FileEntry>, Vec<FileEntry>) {
    let mut merged = existing;
    merged.sort_by(|a, b| a.path.cmp(&b.path));
    merged.dedup_by(|a, b| a.path == b.path);

    // Digest already on record for each known path.
    let mut known: HashMap<String, String> = merged
        .iter()
        .map(|e| (e.path.clone(), e.sha256.clone()))
        .collect();

    let mut conflicts = Vec::new();
    for entry in incoming {
        match known.get(&entry.path) {
            Some(sha256) => {
                if *sha256 != entry.sha256 {
                    conflicts.push(entry);
                }
            }
            None => {
                known.insert(entry.path.clone(), entry.sha256.clone());
                merged.push(entry);
            }
        }
    }
    merged.sort_by(|a, b| a.path.cmp(&b.path));
    (merged, conflicts)
}
