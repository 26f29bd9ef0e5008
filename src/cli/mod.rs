//! Command-line interface for runguard.
//!
//! Provides commands that pipeline step processes call to record progress,
//! register files, run the quality review and ask where to resume.

mod commands;

pub use commands::{parse_cli, run_log_target, run_with_cli, Cli, Commands};
