use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default ceiling for the per-column missing value rate.
pub const DEFAULT_MISSING_VALUE_THRESHOLD: f64 = 0.05;

/// Default ceiling for the duplicate event rate.
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.02;

/// Default ceiling for the per-case order violation rate.
pub const DEFAULT_ORDER_VIOLATION_THRESHOLD: f64 = 0.02;

/// Default ceiling for the timestamp parse failure rate.
pub const DEFAULT_PARSE_FAILURE_THRESHOLD: f64 = 0.02;

/// Rate ceilings above which the gate emits a warning.
///
/// All values are fractions in `[0, 1]`. `parse_failure` bounds the share
/// of non-empty timestamps that failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub missing_value: f64,
    pub duplicate: f64,
    pub order_violation: f64,
    pub parse_failure: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            missing_value: DEFAULT_MISSING_VALUE_THRESHOLD,
            duplicate: DEFAULT_DUPLICATE_THRESHOLD,
            order_violation: DEFAULT_ORDER_VIOLATION_THRESHOLD,
            parse_failure: DEFAULT_PARSE_FAILURE_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Same ceiling for every dimension.
    pub fn uniform(value: f64) -> Self {
        Self {
            missing_value: value,
            duplicate: value,
            order_violation: value,
            parse_failure: value,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("missing_value", self.missing_value),
            ("duplicate", self.duplicate),
            ("order_violation", self.order_violation),
            ("parse_failure", self.parse_failure),
        ];
        for (key, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: format!("quality.thresholds.{}", key),
                    message: format!("{} is outside [0, 1]", value),
                });
            }
        }
        Ok(())
    }
}
