//! runguard: durable run-state tracking and data-quality gating for
//! multi-step process-mining pipelines.
//!
//! Each pipeline step runs as a separate process. This library records the
//! steps of a run in a JSON document, fingerprints the files they consume
//! and produce, evaluates event-log quality before a run is finalized and
//! recommends where an interrupted run should resume.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod manifest;
pub mod quality;
pub mod resume;

// Re-export commonly used types
pub use config::{Config, SnapshotWriter};
pub use driver::{init_run, run_review, ReviewOutcome, StepScope};
pub use error::{ConfigError, FingerprintError, ManifestError, QualityError, RunError};
pub use fingerprint::{fingerprint, FileEntry};
pub use manifest::{RunManifest, RunStatus, RunStore, StepRecord, StepStatus};
pub use quality::{GateOutcome, QualityGate, QualityReport, Thresholds};
pub use resume::{latest_run, next_step, PIPELINE_STEPS};
