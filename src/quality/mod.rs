//! Data-quality gate for event logs.
//!
//! This module streams a CSV event log once, computes defect rates for the
//! case, activity and timestamp columns, classifies them against thresholds
//! and produces a prioritized remediation backlog. Structural problems are
//! blocking; rate excesses are advisory warnings.

mod gate;
mod outputs;
mod report;
mod thresholds;

pub use gate::{evaluate, LogColumns, QualityGate, TimestampFormat};
pub use outputs::{
    render_summary, write_outputs, QualityArtifacts, BACKLOG_FILE_NAME, QUALITY_DIR_NAME,
    RESULTS_FILE_NAME, SUMMARY_FILE_NAME,
};
pub use report::{BacklogItem, GateOutcome, QualityReport, Severity};
pub use thresholds::{
    Thresholds, DEFAULT_DUPLICATE_THRESHOLD, DEFAULT_MISSING_VALUE_THRESHOLD,
    DEFAULT_ORDER_VIOLATION_THRESHOLD, DEFAULT_PARSE_FAILURE_THRESHOLD,
};
