//! Single-pass quality gate over a tabular event log.
//!
//! The log is streamed once. Per row the gate counts empty required values,
//! repeated (case, activity, timestamp) triples, unparsable timestamps and
//! events that go back in time within their case. Auxiliary memory is
//! bounded by the number of distinct keys and case IDs.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info};

use super::report::{BacklogItem, GateOutcome, QualityReport, Severity};
use super::thresholds::Thresholds;
use crate::error::QualityError;

const FIX_MISSING_COLUMNS: &str = "Update column mapping or re-run ingest.";
const FIX_EMPTY_DATASET: &str = "Check ingestion filters or source file.";
const FIX_MISSING_VALUES: &str = "Review missingness strategy.";
const FIX_DUPLICATES: &str = "Adjust dedupe keys or filter duplicates.";
const FIX_PARSE_FAILURES: &str = "Specify timestamp format or clean source data.";
const FIX_ORDER_VIOLATIONS: &str = "Sort by case and timestamp or review logging order.";

/// Names of the three columns every event log must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogColumns {
    pub case: String,
    pub activity: String,
    pub timestamp: String,
}

impl Default for LogColumns {
    fn default() -> Self {
        Self::new("case_id", "activity", "timestamp")
    }
}

impl LogColumns {
    pub fn new(
        case: impl Into<String>,
        activity: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            case: case.into(),
            activity: activity.into(),
            timestamp: timestamp.into(),
        }
    }

    fn required(&self) -> [&str; 3] {
        [self.case.as_str(), self.activity.as_str(), self.timestamp.as_str()]
    }
}

/// Strict timestamp format used when parsing the timestamp column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// RFC 3339, e.g. `2024-01-01T10:00:00Z`.
    #[default]
    Rfc3339,
    /// A `chrono` strftime pattern. Values without an offset are read as UTC.
    Pattern(String),
}

impl TimestampFormat {
    /// Empty or blank input selects RFC 3339.
    pub fn from_pattern(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern.eq_ignore_ascii_case("rfc3339") {
            TimestampFormat::Rfc3339
        } else {
            TimestampFormat::Pattern(pattern.to_string())
        }
    }

    pub fn parse(&self, value: &str) -> Option<DateTime<Utc>> {
        match self {
            TimestampFormat::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            TimestampFormat::Pattern(pattern) => {
                if let Ok(dt) = DateTime::parse_from_str(value, pattern) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(naive) = NaiveDateTime::parse_from_str(value, pattern) {
                    return Some(naive.and_utc());
                }
                NaiveDate::parse_from_str(value, pattern)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
            }
        }
    }
}

/// Raw counters accumulated during the scan.
#[derive(Debug, Default)]
struct ScanCounters {
    rows: u64,
    missing: Vec<u64>,
    duplicates: u64,
    parsed: u64,
    parse_failures: u64,
    order_violations: u64,
}

/// Quality gate configured with column names, timestamp format and thresholds.
#[derive(Debug, Clone)]
pub struct QualityGate {
    columns: LogColumns,
    timestamp_format: TimestampFormat,
    thresholds: Thresholds,
}

impl QualityGate {
    pub fn new(columns: LogColumns, thresholds: Thresholds) -> Self {
        Self {
            columns,
            timestamp_format: TimestampFormat::default(),
            thresholds,
        }
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Evaluates the CSV event log at `path`.
    pub fn evaluate(&self, path: &Path) -> Result<GateOutcome, QualityError> {
        let file = File::open(path).map_err(|source| QualityError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let outcome = self.evaluate_reader(file)?;
        info!(
            path = %path.display(),
            rows = outcome.report.row_count,
            warnings = outcome.report.warnings.len(),
            blocking = outcome.report.blocking_issues.len(),
            "Quality gate evaluated"
        );
        Ok(outcome)
    }

    /// Evaluates CSV content from any reader. The first record is the header.
    pub fn evaluate_reader<R: Read>(&self, reader: R) -> Result<GateOutcome, QualityError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        // Values are raw bytes; logs exported in legacy encodings stay readable.
        let header = csv.byte_headers()?.clone();
        let index_of = |name: &str| header.iter().position(|h| h == name.as_bytes());

        let missing_columns: Vec<&str> = self
            .columns
            .required()
            .into_iter()
            .filter(|col| index_of(*col).is_none())
            .collect();
        if !missing_columns.is_empty() {
            debug!(missing = ?missing_columns, "Required columns absent from header");
            let mut report = QualityReport::empty(self.thresholds);
            report.blocking_issues.push(format!(
                "Missing required columns: {}",
                missing_columns.join(", ")
            ));
            let backlog = vec![BacklogItem::new(
                Severity::Blocking,
                "Missing required columns",
                FIX_MISSING_COLUMNS,
            )];
            return Ok(GateOutcome { report, backlog });
        }

        // Presence was checked above, so every lookup resolves.
        let case_idx = index_of(self.columns.case.as_str()).unwrap_or_default();
        let activity_idx = index_of(self.columns.activity.as_str()).unwrap_or_default();
        let timestamp_idx = index_of(self.columns.timestamp.as_str()).unwrap_or_default();

        let tracked = self.tracked_columns();
        let tracked_idx: Vec<usize> = tracked
            .iter()
            .map(|col| index_of(col.as_str()).unwrap_or_default())
            .collect();

        let mut counters = ScanCounters {
            missing: vec![0; tracked.len()],
            ..ScanCounters::default()
        };
        let mut seen_keys: HashSet<Vec<u8>> = HashSet::new();
        let mut case_latest: HashMap<Vec<u8>, DateTime<Utc>> = HashMap::new();

        let mut record = csv::ByteRecord::new();
        while csv.read_byte_record(&mut record)? {
            counters.rows += 1;
            let value = |idx: usize| record.get(idx).unwrap_or(b"");
            let case_val = value(case_idx);
            let activity_val = value(activity_idx);
            let timestamp_val = String::from_utf8_lossy(value(timestamp_idx));

            for (slot, idx) in tracked_idx.iter().enumerate() {
                if is_blank(value(*idx)) {
                    counters.missing[slot] += 1;
                }
            }

            let mut key = Vec::new();
            key.extend_from_slice(case_val);
            key.push(b'|');
            key.extend_from_slice(activity_val);
            key.push(b'|');
            key.extend_from_slice(value(timestamp_idx));
            if !seen_keys.insert(key) {
                counters.duplicates += 1;
            }

            if timestamp_val.trim().is_empty() {
                continue;
            }
            match self.timestamp_format.parse(&timestamp_val) {
                None => counters.parse_failures += 1,
                Some(parsed) => {
                    counters.parsed += 1;
                    match case_latest.entry(case_val.to_vec()) {
                        Entry::Occupied(mut latest) => {
                            if parsed < *latest.get() {
                                counters.order_violations += 1;
                            }
                            latest.insert(parsed);
                        }
                        Entry::Vacant(slot) => {
                            slot.insert(parsed);
                        }
                    }
                }
            }
        }

        Ok(self.classify(&tracked, counters))
    }

    /// Required columns with repeats removed, in declaration order.
    fn tracked_columns(&self) -> Vec<String> {
        let mut tracked: Vec<String> = Vec::with_capacity(3);
        for col in self.columns.required() {
            if !tracked.iter().any(|t| t == col) {
                tracked.push(col.to_string());
            }
        }
        tracked
    }

    fn classify(&self, tracked: &[String], counters: ScanCounters) -> GateOutcome {
        let thresholds = self.thresholds;
        let mut report = QualityReport::empty(thresholds);
        let mut blocking = Vec::new();
        let mut warnings = Vec::new();

        let rows = counters.rows;
        report.row_count = rows;
        let rate = |count: u64, total: u64| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        if rows == 0 {
            report
                .blocking_issues
                .push("No rows found in input log".to_string());
            blocking.push(BacklogItem::new(
                Severity::Blocking,
                "Empty dataset",
                FIX_EMPTY_DATASET,
            ));
        }

        for (col, count) in tracked.iter().zip(&counters.missing) {
            report.missing_rates.insert(col.clone(), rate(*count, rows));
        }
        report.duplicate_rate = rate(counters.duplicates, rows);
        report.order_violation_rate = rate(counters.order_violations, rows);
        report.timestamp_parse_rate =
            rate(counters.parsed, counters.parsed + counters.parse_failures);

        for col in tracked {
            let missing_rate = report.missing_rates.get(col).copied().unwrap_or(0.0);
            if missing_rate > thresholds.missing_value {
                report
                    .warnings
                    .push(format!("High missing rate for {}: {:.2}", col, missing_rate));
                warnings.push(BacklogItem::new(
                    Severity::Warning,
                    format!("Missing values above threshold in {}", col),
                    FIX_MISSING_VALUES,
                ));
            }
        }

        if report.duplicate_rate > thresholds.duplicate {
            report.warnings.push(format!(
                "Duplicate rate above threshold: {:.2}",
                report.duplicate_rate
            ));
            warnings.push(BacklogItem::new(
                Severity::Warning,
                "Duplicate rate above threshold",
                FIX_DUPLICATES,
            ));
        }

        let failure_rate = 1.0 - report.timestamp_parse_rate;
        if failure_rate > thresholds.parse_failure {
            report.warnings.push(format!(
                "Timestamp parse failures above threshold: {:.2}",
                failure_rate
            ));
            warnings.push(BacklogItem::new(
                Severity::Warning,
                "Timestamp parse failures above threshold",
                FIX_PARSE_FAILURES,
            ));
        }

        if report.order_violation_rate > thresholds.order_violation {
            report.warnings.push(format!(
                "Order violations above threshold: {:.2}",
                report.order_violation_rate
            ));
            warnings.push(BacklogItem::new(
                Severity::Warning,
                "Case order violations above threshold",
                FIX_ORDER_VIOLATIONS,
            ));
        }

        blocking.extend(warnings);
        GateOutcome {
            report,
            backlog: blocking,
        }
    }
}

fn is_blank(value: &[u8]) -> bool {
    String::from_utf8_lossy(value).trim().is_empty()
}

/// Evaluates `log_path` against the given columns, timestamp format and thresholds.
///
/// An empty `timestamp_format` selects RFC 3339. Structural problems (missing
/// columns, zero rows) are reported as blocking issues, not errors.
pub fn evaluate(
    log_path: &Path,
    case_column: &str,
    activity_column: &str,
    timestamp_column: &str,
    timestamp_format: &str,
    thresholds: Thresholds,
) -> Result<GateOutcome, QualityError> {
    QualityGate::new(
        LogColumns::new(case_column, activity_column, timestamp_column),
        thresholds,
    )
    .with_timestamp_format(TimestampFormat::from_pattern(timestamp_format))
    .evaluate(log_path)
}
