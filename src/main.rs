//! runguard CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get log_level and the target run
    let cli = runguard::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let run_log = runguard::cli::run_log_target(&cli);
    runguard::logging::init(&cli.log_level, run_log.as_deref())
        .context("Failed to open run log")?;

    runguard::cli::run_with_cli(cli)
}
