//! Integration tests for the quality gate and its artifacts.

use std::fs;
use std::path::PathBuf;

use runguard::quality::{
    evaluate, write_outputs, QualityReport, Severity, Thresholds, BACKLOG_FILE_NAME,
    RESULTS_FILE_NAME, SUMMARY_FILE_NAME,
};
use tempfile::TempDir;

fn write_log(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("events.csv");
    fs::write(&path, content).expect("write log");
    path
}

fn evaluate_default(path: &PathBuf, threshold: f64) -> runguard::GateOutcome {
    evaluate(
        path,
        "case_id",
        "activity",
        "timestamp",
        "",
        Thresholds::uniform(threshold),
    )
    .expect("evaluation succeeds")
}

#[test]
fn test_clean_log_passes() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_log(
        &dir,
        "case_id,activity,timestamp\n\
         1,A,2024-01-01T10:00:00Z\n\
         1,B,2024-01-01T11:00:00Z\n",
    );

    let outcome = evaluate_default(&log, 0.1);
    let report = &outcome.report;
    assert_eq!(report.row_count, 2);
    assert_eq!(report.duplicate_rate, 0.0);
    assert_eq!(report.timestamp_parse_rate, 1.0);
    assert_eq!(report.order_violation_rate, 0.0);
    assert!(report.blocking_issues.is_empty());
    assert!(report.warnings.is_empty());
    assert!(outcome.backlog.is_empty());
}

#[test]
fn test_missing_column_is_single_blocking_issue() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_log(
        &dir,
        "case_id,timestamp\n\
         1,2024-01-01T10:00:00Z\n\
         1,not-a-date\n\
         1,2024-01-01T10:00:00Z\n",
    );

    let outcome = evaluate_default(&log, 0.0);
    let report = &outcome.report;
    assert_eq!(report.row_count, 0);
    assert_eq!(report.blocking_issues.len(), 1);
    assert!(report.blocking_issues[0].contains("activity"));
    assert!(report.warnings.is_empty());
    assert_eq!(outcome.backlog.len(), 1);
    assert_eq!(outcome.backlog[0].severity, Severity::Blocking);
}

#[test]
fn test_out_of_order_case_warns() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_log(
        &dir,
        "case_id,activity,timestamp\n\
         1,A,2024-01-01T11:00:00Z\n\
         1,B,2024-01-01T10:00:00Z\n\
         2,A,2024-01-01T09:00:00Z\n",
    );

    let outcome = evaluate_default(&log, 0.1);
    let report = &outcome.report;
    assert!(report.order_violation_rate > 0.0);
    assert!(report.warnings.iter().any(|w| w.starts_with("Order violations")));
    assert!(outcome
        .backlog
        .iter()
        .any(|item| item.severity == Severity::Warning && item.issue.contains("order")));
}

#[test]
fn test_custom_timestamp_format() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_log(
        &dir,
        "case,step,when\n\
         1,A,2024-01-01 10:00:00\n\
         1,B,2024-01-01 11:00:00\n",
    );

    let outcome = evaluate(
        &log,
        "case",
        "step",
        "when",
        "%Y-%m-%d %H:%M:%S",
        Thresholds::default(),
    )
    .expect("evaluation succeeds");
    assert_eq!(outcome.report.timestamp_parse_rate, 1.0);
    assert!(!outcome.is_blocked());
}

#[test]
fn test_missing_log_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    let result = evaluate(
        &dir.path().join("absent.csv"),
        "case_id",
        "activity",
        "timestamp",
        "",
        Thresholds::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_artifacts_match_report() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_log(
        &dir,
        "case_id,activity,timestamp\n\
         1,A,2024-01-01T10:00:00Z\n\
         1,A,2024-01-01T10:00:00Z\n\
         2,,bad\n",
    );
    let outcome = evaluate_default(&log, 0.0);
    assert!(!outcome.is_blocked());
    assert!(!outcome.backlog.is_empty());

    let run = dir.path().join("run");
    let artifacts = write_outputs(&run, &outcome.report, &outcome.backlog).expect("write");
    assert_eq!(artifacts.results, run.join("quality").join(RESULTS_FILE_NAME));
    assert_eq!(artifacts.summary, run.join("quality").join(SUMMARY_FILE_NAME));
    assert_eq!(artifacts.backlog, run.join("quality").join(BACKLOG_FILE_NAME));

    let stored: QualityReport =
        serde_json::from_str(&fs::read_to_string(&artifacts.results).expect("read"))
            .expect("parse");
    assert_eq!(stored, outcome.report);

    let backlog = fs::read_to_string(&artifacts.backlog).expect("read");
    assert_eq!(backlog.lines().count(), outcome.backlog.len() + 1);

    let summary = fs::read_to_string(&artifacts.summary).expect("read");
    assert!(summary.contains("- Rows: 3"));
}
