//! File-backed run state store.
//!
//! Every mutation is a full load → mutate → save of the run document. Saves
//! go through a temporary file in the run directory which is fsynced and then
//! renamed over the document, so a crash mid-write leaves the previous
//! version intact. The in-process mutex serializes callers sharing a store;
//! there is no cross-process locking.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::run_id::validate_run_id;
use super::types::{
    merge_entries, RunManifest, RunStatus, StepStatus, MANIFEST_FILE_NAME, SCHEMA_VERSION,
};
use crate::error::ManifestError;
use crate::fingerprint::fingerprint;

#[derive(Deserialize)]
struct SchemaHeader {
    #[serde(default)]
    schema_version: u32,
}

#[derive(Debug, Clone, Copy)]
enum FileList {
    Inputs,
    Outputs,
}

/// Handle on one run's `run_manifest.json`.
#[derive(Debug)]
pub struct RunStore {
    run_id: String,
    dir: PathBuf,
    path: PathBuf,
    lock: Mutex<()>,
}

impl RunStore {
    /// Opens the run document in `dir`, creating it if absent.
    ///
    /// A new document starts in `running` with `started_at` set to now. An
    /// existing document is loaded and checked for schema version and run ID.
    pub fn open(
        run_id: &str,
        dir: impl AsRef<Path>,
    ) -> Result<(Self, RunManifest), ManifestError> {
        validate_run_id(run_id)?;
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(ManifestError::MissingDirectory);
        }
        fs::create_dir_all(dir)?;

        let store = Self {
            run_id: run_id.to_string(),
            dir: dir.to_path_buf(),
            path: dir.join(MANIFEST_FILE_NAME),
            lock: Mutex::new(()),
        };

        let manifest = {
            let _guard = store.lock.lock().map_err(|_| ManifestError::LockPoisoned)?;
            if store.path.exists() {
                let manifest = store.load()?;
                debug!(run_id, path = %store.path.display(), "Loaded run manifest");
                manifest
            } else {
                let manifest = RunManifest::new(run_id, Utc::now());
                store.save(&manifest)?;
                info!(run_id, path = %store.path.display(), "Created run manifest");
                manifest
            }
        };

        Ok((store, manifest))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory holding the run document; file paths are recorded relative to it.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.path
    }

    /// Reads the current state of the document.
    pub fn manifest(&self) -> Result<RunManifest, ManifestError> {
        let _guard = self.lock.lock().map_err(|_| ManifestError::LockPoisoned)?;
        self.load()
    }

    pub fn start_step(&self, name: &str) -> Result<(), ManifestError> {
        self.update_step(name, StepStatus::Started, None)
    }

    pub fn complete_step(&self, name: &str) -> Result<(), ManifestError> {
        self.update_step(name, StepStatus::Completed, None)
    }

    pub fn fail_step(&self, name: &str, message: &str) -> Result<(), ManifestError> {
        self.update_step(name, StepStatus::Failed, Some(message))
    }

    /// Sets the run-level status. Terminal values stamp `completed_at`.
    pub fn set_status(&self, status: RunStatus) -> Result<(), ManifestError> {
        self.update(|manifest| {
            manifest.set_status(status, Utc::now());
            Ok(())
        })?;
        info!(run_id = %self.run_id, %status, "Run status updated");
        Ok(())
    }

    /// Records where the configuration snapshot for this run was written.
    pub fn set_config_snapshot(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.update(|manifest| {
            manifest.config_snapshot = Some(path);
            Ok(())
        })
    }

    pub fn add_inputs<P: AsRef<Path>>(&self, paths: &[P]) -> Result<(), ManifestError> {
        self.add_files(paths, FileList::Inputs)
    }

    pub fn add_outputs<P: AsRef<Path>>(&self, paths: &[P]) -> Result<(), ManifestError> {
        self.add_files(paths, FileList::Outputs)
    }

    fn add_files<P: AsRef<Path>>(&self, paths: &[P], list: FileList) -> Result<(), ManifestError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.update(|manifest| {
            let entries = fingerprint(paths, Some(&self.dir))?;
            let target = match list {
                FileList::Inputs => &mut manifest.inputs,
                FileList::Outputs => &mut manifest.outputs,
            };
            let (merged, conflicts) = merge_entries(std::mem::take(target), entries);
            *target = merged;
            for conflict in conflicts {
                warn!(
                    run_id = %self.run_id,
                    path = %conflict.path,
                    sha256 = %conflict.sha256,
                    "File already registered with different content; keeping first entry"
                );
            }
            Ok(())
        })
    }

    fn update_step(
        &self,
        name: &str,
        status: StepStatus,
        message: Option<&str>,
    ) -> Result<(), ManifestError> {
        if name.trim().is_empty() {
            return Err(ManifestError::MissingStepName);
        }
        self.update(|manifest| {
            manifest.record_step(name, status, message, Utc::now());
            Ok(())
        })?;
        info!(run_id = %self.run_id, step = name, %status, "Step status updated");
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> Result<(), ManifestError>
    where
        F: FnOnce(&mut RunManifest) -> Result<(), ManifestError>,
    {
        let _guard = self.lock.lock().map_err(|_| ManifestError::LockPoisoned)?;
        let mut manifest = self.load()?;
        mutate(&mut manifest)?;
        self.save(&manifest)
    }

    fn load(&self) -> Result<RunManifest, ManifestError> {
        let manifest = read_manifest(&self.path)?;
        if manifest.run_id != self.run_id {
            return Err(ManifestError::RunIdMismatch {
                expected: self.run_id.clone(),
                found: manifest.run_id,
            });
        }
        Ok(manifest)
    }

    fn save(&self, manifest: &RunManifest) -> Result<(), ManifestError> {
        let json = serde_json::to_string_pretty(manifest)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ManifestError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

/// Loads a run document directly from disk without opening a store.
///
/// Used by status tooling that inspects runs it does not own.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<RunManifest, ManifestError> {
    let data = fs::read_to_string(path.as_ref())?;

    // Check the version before the full parse so a newer layout reports as unsupported.
    let header: SchemaHeader = serde_json::from_str(&data)?;
    if header.schema_version != SCHEMA_VERSION {
        return Err(ManifestError::UnsupportedSchemaVersion {
            found: header.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RunStore {
        RunStore::open("run-123", dir.path()).unwrap().0
    }

    #[test]
    fn test_open_creates_running_manifest() {
        let dir = TempDir::new().unwrap();
        let (store, manifest) = RunStore::open("run-123", dir.path()).unwrap();

        assert!(store.manifest_path().exists());
        assert_eq!(manifest.run_id, "run-123");
        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(manifest.status, RunStatus::Running);
        assert!(manifest.completed_at.is_none());
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("outputs").join("run-123");
        let (store, _) = RunStore::open("run-123", &nested).unwrap();
        assert!(store.manifest_path().exists());
    }

    #[test]
    fn test_reopen_preserves_identity() {
        let dir = TempDir::new().unwrap();
        let (_, first) = RunStore::open("run-123", dir.path()).unwrap();
        let (_, second) = RunStore::open("run-123", dir.path()).unwrap();

        assert_eq!(first.run_id, second.run_id);
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn test_open_rejects_empty_arguments() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RunStore::open("", dir.path()),
            Err(ManifestError::MissingRunId)
        ));
        assert!(matches!(
            RunStore::open("run-1", ""),
            Err(ManifestError::MissingDirectory)
        ));
        assert!(!dir.path().join(MANIFEST_FILE_NAME).exists());
    }

    #[test]
    fn test_open_rejects_unsupported_schema() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            r#"{"schema_version": 2, "run_id": "run-123", "started_at": "2024-01-01T00:00:00Z", "status": "running"}"#,
        )
        .unwrap();

        let result = RunStore::open("run-123", dir.path());
        assert!(matches!(
            result,
            Err(ManifestError::UnsupportedSchemaVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn test_open_rejects_foreign_run_document() {
        let dir = TempDir::new().unwrap();
        RunStore::open("run-a", dir.path()).unwrap();
        assert!(matches!(
            RunStore::open("run-b", dir.path()),
            Err(ManifestError::RunIdMismatch { .. })
        ));
    }

    #[test]
    fn test_complete_step_twice_keeps_single_entry() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.start_step("ingest").unwrap();
        store.complete_step("ingest").unwrap();
        let first = store.manifest().unwrap().step("ingest").unwrap().completed_at;
        store.complete_step("ingest").unwrap();

        let manifest = store.manifest().unwrap();
        assert_eq!(manifest.steps.len(), 1);
        let step = manifest.step("ingest").unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert!(step.completed_at >= first);
    }

    #[test]
    fn test_fail_step_records_message() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.start_step("map").unwrap();
        store.fail_step("map", "mapping failed").unwrap();
        store.set_status(RunStatus::Failed).unwrap();

        let manifest = store.manifest().unwrap();
        let step = manifest.step("map").unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.message.as_deref(), Some("mapping failed"));
        assert_eq!(manifest.status, RunStatus::Failed);
        assert!(manifest.completed_at.is_some());
    }

    #[test]
    fn test_step_name_required() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(matches!(
            store.start_step(""),
            Err(ManifestError::MissingStepName)
        ));
    }

    #[test]
    fn test_add_outputs_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let out = dir.path().join("quality");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("qa_results.json"), "{}").unwrap();
        fs::write(out.join("qa_summary.md"), "# QA").unwrap();

        store.add_outputs(&[&out]).unwrap();
        let once = store.manifest().unwrap().outputs;
        store.add_outputs(&[&out]).unwrap();
        let twice = store.manifest().unwrap().outputs;

        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].path, "quality/qa_results.json");
    }

    #[test]
    fn test_add_files_keeps_first_registration() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let file = dir.path().join("output.txt");
        fs::write(&file, "first").unwrap();
        store.add_outputs(&[&file]).unwrap();
        let original = store.manifest().unwrap().outputs[0].sha256.clone();

        fs::write(&file, "rewritten").unwrap();
        store.add_outputs(&[&file]).unwrap();

        let outputs = store.manifest().unwrap().outputs;
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].sha256, original);
    }

    #[test]
    fn test_add_empty_list_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let before = fs::read_to_string(store.manifest_path()).unwrap();
        store.add_inputs::<PathBuf>(&[]).unwrap();
        let after = fs::read_to_string(store.manifest_path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_config_snapshot_pointer() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.set_config_snapshot("config_snapshot.yaml").unwrap();
        assert_eq!(
            store.manifest().unwrap().config_snapshot.as_deref(),
            Some("config_snapshot.yaml")
        );
    }

    #[test]
    fn test_document_is_pretty_printed() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let raw = fs::read_to_string(store.manifest_path()).unwrap();
        assert!(raw.starts_with("{\n  \"schema_version\": 1,"));
        assert!(!raw.contains("completed_at"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.start_step("ingest").unwrap();
        store.complete_step("ingest").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![MANIFEST_FILE_NAME.to_string()]);
    }
}
