//! Quality gate findings: the analytic report and the remediation backlog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::thresholds::Thresholds;

/// Severity of a quality gate finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Structural problem that prevents meaningful analysis.
    Blocking,
    /// Rate above its threshold; advisory only.
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Blocking => "blocking",
            Severity::Warning => "warning",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A remediation suggestion derived from one detected condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogItem {
    pub severity: Severity,
    pub issue: String,
    pub suggested_fix: String,
}

impl BacklogItem {
    pub fn new(severity: Severity, issue: impl Into<String>, suggested_fix: impl Into<String>) -> Self {
        Self {
            severity,
            issue: issue.into(),
            suggested_fix: suggested_fix.into(),
        }
    }
}

/// Defect rates and classification for one evaluated event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub row_count: u64,
    /// Share of rows with an empty value, per required column.
    pub missing_rates: BTreeMap<String, f64>,
    pub duplicate_rate: f64,
    pub order_violation_rate: f64,
    /// Parsed timestamps over all non-empty timestamps.
    pub timestamp_parse_rate: f64,
    pub warnings: Vec<String>,
    pub blocking_issues: Vec<String>,
    /// Thresholds the rates were classified against.
    pub thresholds: Thresholds,
}

impl QualityReport {
    pub(crate) fn empty(thresholds: Thresholds) -> Self {
        Self {
            row_count: 0,
            missing_rates: BTreeMap::new(),
            duplicate_rate: 0.0,
            order_violation_rate: 0.0,
            timestamp_parse_rate: 0.0,
            warnings: Vec::new(),
            blocking_issues: Vec::new(),
            thresholds,
        }
    }

    /// Whether the pipeline should halt without an explicit override.
    pub fn is_blocked(&self) -> bool {
        !self.blocking_issues.is_empty()
    }
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub report: QualityReport,
    /// Blocking items first, then warnings.
    pub backlog: Vec<BacklogItem>,
}

impl GateOutcome {
    pub fn is_blocked(&self) -> bool {
        self.report.is_blocked()
    }
}
