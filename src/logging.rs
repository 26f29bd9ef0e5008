//! Tracing subscriber setup for the `runguard` binary.
//!
//! The library only emits `tracing` events. The binary installs a console
//! layer and, when a command targets a specific run, a second plain-text
//! layer appending to `<run_dir>/run.log`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Per-run log file name.
pub const RUN_LOG_FILE_NAME: &str = "run.log";

/// Path of the log file for a run directory.
pub fn run_log_path(run_dir: &Path) -> PathBuf {
    run_dir.join(RUN_LOG_FILE_NAME)
}

/// Builds the filter. Priority: `RUST_LOG` > `level` > `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    let level = if level.trim().is_empty() { "info" } else { level };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Opens `path` for appending, creating parent directories as needed.
pub fn open_run_log(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber.
///
/// Must be called at most once per process.
pub fn init(level: &str, run_log: Option<&Path>) -> std::io::Result<()> {
    let file_layer = match run_log {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(open_run_log(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(env_filter(level))
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_log_path() {
        assert_eq!(
            run_log_path(Path::new("outputs/r1")),
            PathBuf::from("outputs/r1/run.log")
        );
    }

    #[test]
    fn test_open_run_log_appends() {
        let dir = TempDir::new().unwrap();
        let path = run_log_path(&dir.path().join("outputs").join("r1"));

        {
            use std::io::Write;
            let mut file = open_run_log(&path).unwrap();
            writeln!(file, "first").unwrap();
            let mut file = open_run_log(&path).unwrap();
            writeln!(file, "second").unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
