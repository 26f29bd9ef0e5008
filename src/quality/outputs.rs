//! Writers for the three quality gate artifacts.
//!
//! Artifacts land in `<run_dir>/quality/`:
//! - `qa_results.json`: the full report
//! - `qa_summary.md`: human-readable summary
//! - `issues_backlog.csv`: the backlog with columns `severity,issue,suggested_fix`

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::report::{BacklogItem, QualityReport};
use crate::error::QualityError;

pub const QUALITY_DIR_NAME: &str = "quality";
pub const RESULTS_FILE_NAME: &str = "qa_results.json";
pub const SUMMARY_FILE_NAME: &str = "qa_summary.md";
pub const BACKLOG_FILE_NAME: &str = "issues_backlog.csv";

/// Paths of the artifacts written for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityArtifacts {
    pub dir: PathBuf,
    pub results: PathBuf,
    pub summary: PathBuf,
    pub backlog: PathBuf,
}

/// Writes the JSON report, Markdown summary and CSV backlog under `run_dir`.
pub fn write_outputs(
    run_dir: &Path,
    report: &QualityReport,
    backlog: &[BacklogItem],
) -> Result<QualityArtifacts, QualityError> {
    let dir = run_dir.join(QUALITY_DIR_NAME);
    fs::create_dir_all(&dir)?;

    let artifacts = QualityArtifacts {
        results: dir.join(RESULTS_FILE_NAME),
        summary: dir.join(SUMMARY_FILE_NAME),
        backlog: dir.join(BACKLOG_FILE_NAME),
        dir,
    };

    fs::write(&artifacts.results, serde_json::to_string_pretty(report)?)?;
    fs::write(&artifacts.summary, render_summary(report, backlog))?;
    write_backlog_csv(&artifacts.backlog, backlog)?;

    info!(dir = %artifacts.dir.display(), items = backlog.len(), "Quality artifacts written");
    Ok(artifacts)
}

/// Renders the Markdown summary.
pub fn render_summary(report: &QualityReport, backlog: &[BacklogItem]) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# QA Summary");
    let _ = writeln!(md);
    let _ = writeln!(md, "- Rows: {}", report.row_count);
    let _ = writeln!(md, "- Duplicate rate: {:.2}", report.duplicate_rate);
    let _ = writeln!(md, "- Timestamp parse rate: {:.2}", report.timestamp_parse_rate);
    let _ = writeln!(md, "- Order violation rate: {:.2}", report.order_violation_rate);
    let _ = writeln!(md);
    let _ = writeln!(md, "## Missing Rates");
    for (column, rate) in &report.missing_rates {
        let _ = writeln!(md, "- {}: {:.2}", column, rate);
    }

    if !report.blocking_issues.is_empty() {
        let _ = writeln!(md);
        let _ = writeln!(md, "## Blocking Issues");
        for issue in &report.blocking_issues {
            let _ = writeln!(md, "- {}", issue);
        }
    }

    let _ = writeln!(md);
    let _ = writeln!(md, "## Warnings");
    if report.warnings.is_empty() {
        let _ = writeln!(md, "- None");
    }
    for warning in &report.warnings {
        let _ = writeln!(md, "- {}", warning);
    }

    let _ = writeln!(md);
    let _ = writeln!(md, "## Backlog");
    if backlog.is_empty() {
        let _ = writeln!(md, "- None");
    }
    for item in backlog {
        let _ = writeln!(
            md,
            "- [{}] {} (Fix: {})",
            item.severity, item.issue, item.suggested_fix
        );
    }
    md
}

fn write_backlog_csv(path: &Path, backlog: &[BacklogItem]) -> Result<(), QualityError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["severity", "issue", "suggested_fix"])?;
    for item in backlog {
        writer.write_record([
            item.severity.as_str(),
            item.issue.as_str(),
            item.suggested_fix.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::report::Severity;
    use crate::quality::thresholds::Thresholds;
    use tempfile::TempDir;

    fn sample() -> (QualityReport, Vec<BacklogItem>) {
        let mut report = QualityReport::empty(Thresholds::default());
        report.row_count = 10;
        report.missing_rates.insert("activity".to_string(), 0.1);
        report.duplicate_rate = 0.05;
        report.timestamp_parse_rate = 1.0;
        report
            .warnings
            .push("Duplicate rate above threshold: 0.05".to_string());
        let backlog = vec![BacklogItem::new(
            Severity::Warning,
            "Duplicate rate above threshold",
            "Adjust dedupe keys, or filter duplicates.",
        )];
        (report, backlog)
    }

    #[test]
    fn test_write_outputs_creates_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let (report, backlog) = sample();

        let artifacts = write_outputs(dir.path(), &report, &backlog).unwrap();
        assert_eq!(artifacts.dir, dir.path().join("quality"));
        assert!(artifacts.results.exists());
        assert!(artifacts.summary.exists());
        assert!(artifacts.backlog.exists());

        let json = fs::read_to_string(&artifacts.results).unwrap();
        let parsed: QualityReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_backlog_csv_quotes_fields() {
        let dir = TempDir::new().unwrap();
        let (report, backlog) = sample();
        let artifacts = write_outputs(dir.path(), &report, &backlog).unwrap();

        let csv = fs::read_to_string(&artifacts.backlog).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("severity,issue,suggested_fix"));
        assert_eq!(
            lines.next(),
            Some("warning,Duplicate rate above threshold,\"Adjust dedupe keys, or filter duplicates.\"")
        );
    }

    #[test]
    fn test_summary_sections() {
        let (report, backlog) = sample();
        let md = render_summary(&report, &backlog);
        assert!(md.starts_with("# QA Summary\n"));
        assert!(md.contains("- Rows: 10"));
        assert!(md.contains("- activity: 0.10"));
        assert!(md.contains("- [warning] Duplicate rate above threshold"));
        assert!(!md.contains("## Blocking Issues"));
    }

    #[test]
    fn test_summary_empty_sections_say_none() {
        let report = QualityReport::empty(Thresholds::default());
        let md = render_summary(&report, &[]);
        assert!(md.contains("## Warnings\n- None"));
        assert!(md.contains("## Backlog\n- None"));
    }
}
