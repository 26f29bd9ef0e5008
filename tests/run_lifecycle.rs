//! Integration tests for the run document lifecycle.
//!
//! Each test simulates separate step processes by re-opening the store
//! between transitions, as pipeline steps do in practice.

use std::fs;

use runguard::manifest::{read_manifest, RunStatus, RunStore, StepStatus};
use runguard::resume::{latest_run, next_step, run_dir};
use runguard::{init_run, Config, ManifestError, RunError, StepScope, PIPELINE_STEPS};
use tempfile::TempDir;

#[test]
fn test_reopen_preserves_identity() {
    let dir = TempDir::new().expect("temp dir");
    let (_, first) = RunStore::open("20240101-120000", dir.path()).expect("open");
    let (_, second) = RunStore::open("20240101-120000", dir.path()).expect("reopen");

    assert_eq!(first.run_id, second.run_id);
    assert_eq!(first.started_at, second.started_at);
    assert_eq!(first.status, second.status);
}

#[test]
fn test_full_pipeline_across_processes() {
    let project = TempDir::new().expect("temp dir");
    let run_id = "20240101-120000";

    for step in PIPELINE_STEPS {
        let store = init_run(project.path(), Some(run_id), &Config::default()).expect("init");
        let scope = StepScope::begin(&store, step).expect("begin");
        let artifact = store.dir().join(format!("{}.out", step));
        fs::write(&artifact, step).expect("write artifact");
        store.add_outputs(&[&artifact]).expect("register output");
        scope.complete().expect("complete");
    }

    let store = init_run(project.path(), Some(run_id), &Config::default()).expect("init");
    store.set_status(RunStatus::Completed).expect("status");

    let manifest = latest_run(project.path()).expect("latest").expect("run exists");
    assert_eq!(manifest.run_id, run_id);
    assert_eq!(manifest.status, RunStatus::Completed);
    assert!(manifest.completed_at.is_some());
    assert_eq!(manifest.steps.len(), PIPELINE_STEPS.len());
    assert_eq!(next_step(&manifest), None);

    let paths: Vec<&str> = manifest.outputs.iter().map(|e| e.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(paths, sorted);
    assert_eq!(paths.len(), PIPELINE_STEPS.len());
}

#[test]
fn test_crash_leaves_resumable_state() {
    let project = TempDir::new().expect("temp dir");
    let run_id = "20240101-120000";

    {
        let store = init_run(project.path(), Some(run_id), &Config::default()).expect("init");
        StepScope::begin(&store, "ingest").expect("begin").complete().expect("complete");
        let _scope = StepScope::begin(&store, "map").expect("begin");
        // scope dropped without completing
    }

    let manifest = read_manifest(run_dir(project.path(), run_id).join("run_manifest.json"))
        .expect("read");
    assert_eq!(manifest.status, RunStatus::Failed);
    assert_eq!(manifest.step("map").map(|s| s.status), Some(StepStatus::Failed));
    assert_eq!(next_step(&manifest), Some("map"));

    // Retry resumes the same document.
    let store = init_run(project.path(), Some(run_id), &Config::default()).expect("init");
    StepScope::begin(&store, "map").expect("begin").complete().expect("complete");
    let manifest = store.manifest().expect("manifest");
    assert_eq!(manifest.steps.len(), 2);
    assert_eq!(next_step(&manifest), Some("prepare"));
}

#[test]
fn test_repeated_registration_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let data = dir.path().join("data");
    fs::create_dir_all(data.join("nested")).expect("mkdir");
    fs::write(data.join("b.csv"), "b").expect("write");
    fs::write(data.join("nested").join("a.csv"), "a").expect("write");

    let (store, _) = RunStore::open("run-1", dir.path()).expect("open");
    store.add_outputs(&[&data]).expect("first");
    let once = store.manifest().expect("manifest").outputs;
    store.add_outputs(&[&data]).expect("second");
    let twice = store.manifest().expect("manifest").outputs;

    assert_eq!(once, twice);
    assert_eq!(
        once.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(),
        vec!["data/b.csv", "data/nested/a.csv"]
    );
}

#[test]
fn test_rewritten_file_keeps_first_fingerprint() {
    let dir = TempDir::new().expect("temp dir");
    let file = dir.path().join("model.json");
    fs::write(&file, "v1").expect("write");

    let (store, _) = RunStore::open("run-1", dir.path()).expect("open");
    store.add_outputs(&[&file]).expect("register");
    let original = store.manifest().expect("manifest").outputs[0].sha256.clone();

    fs::write(&file, "v2").expect("rewrite");
    store.add_outputs(&[&file]).expect("register again");
    let outputs = store.manifest().expect("manifest").outputs;

    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].sha256, original);
}

#[test]
fn test_structural_errors_create_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let target = dir.path().join("run");

    assert!(matches!(
        RunStore::open("", &target),
        Err(ManifestError::MissingRunId)
    ));
    assert!(!target.exists());

    assert!(matches!(
        RunStore::open("run-1", ""),
        Err(ManifestError::MissingDirectory)
    ));
}

#[test]
fn test_run_id_cannot_escape_outputs() {
    let project = TempDir::new().expect("temp dir");

    for run_id in ["../escaped", "..", ".", "nested/run"] {
        let result = init_run(project.path(), Some(run_id), &Config::default());
        assert!(
            matches!(result, Err(RunError::Manifest(ManifestError::InvalidRunId(_)))),
            "{run_id} should be rejected"
        );
    }
    assert!(!project.path().join("escaped").exists());
    assert!(!project.path().join("outputs").join("nested").exists());
    assert!(latest_run(project.path()).expect("latest").is_none());
}

#[test]
fn test_future_schema_version_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("run_manifest.json"),
        r#"{"schema_version": 2, "run_id": "run-1", "started_at": "2024-01-01T00:00:00Z", "status": "running"}"#,
    )
    .expect("write");

    assert!(matches!(
        RunStore::open("run-1", dir.path()),
        Err(ManifestError::UnsupportedSchemaVersion { found: 2, supported: 1 })
    ));
}
