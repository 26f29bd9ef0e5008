//! Durable run state for multi-step pipelines.
//!
//! Each run owns one JSON document (`run_manifest.json`) recording step
//! lifecycle, overall status and the fingerprints of every file the run
//! consumed or produced. Steps execute as separate processes; each one
//! re-opens the document, applies its transitions and exits.

mod run_id;
mod store;
mod types;

pub use run_id::{default_run_id, run_id_at, validate_run_id};
pub use store::{read_manifest, RunStore};
pub use types::{
    merge_entries, FileEntry, RunManifest, RunStatus, StepRecord, StepStatus, MANIFEST_FILE_NAME,
    SCHEMA_VERSION,
};
