//! Content fingerprinting for run inputs and outputs.
//!
//! A fingerprint records the identity of a file at the moment it was
//! registered with a run: its normalized path, byte size, SHA-256 digest
//! and modification time. Directories are expanded depth-first into the
//! regular files beneath them. Symlinks and special files are skipped.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::FingerprintError;

/// Read buffer size used while hashing file contents.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Identity record for a single file touched by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the run directory when possible, otherwise the cleaned path.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 digest of the file contents.
    pub sha256: String,
    /// Last modification time reported by the filesystem.
    pub modified_at: DateTime<Utc>,
}

/// Fingerprints every regular file reachable from `paths`.
///
/// Paths that cannot be stat'd are skipped, as are blank paths. Once a file
/// has been found, any failure reading it aborts the whole batch. Entries are
/// deduplicated by normalized path (first occurrence wins) and returned
/// sorted by path.
pub fn fingerprint<P: AsRef<Path>>(
    paths: &[P],
    base_dir: Option<&Path>,
) -> Result<Vec<FileEntry>, FingerprintError> {
    fingerprint_with(paths, base_dir, &hash_file)
}

/// Content hasher used for each discovered file.
type HashFn<'a> = &'a dyn Fn(&Path) -> io::Result<String>;

fn fingerprint_with<P: AsRef<Path>>(
    paths: &[P],
    base_dir: Option<&Path>,
    hash: HashFn<'_>,
) -> Result<Vec<FileEntry>, FingerprintError> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for raw in paths {
        let raw = raw.as_ref();
        if raw.as_os_str().is_empty() || raw.to_string_lossy().trim().is_empty() {
            continue;
        }

        let metadata = match fs::symlink_metadata(raw) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(path = %raw.display(), error = %err, "Skipping unreadable path");
                continue;
            }
        };

        if metadata.is_dir() {
            for walked in WalkDir::new(raw).follow_links(false).sort_by_file_name() {
                let walked = walked.map_err(|source| FingerprintError::Walk {
                    path: raw.to_path_buf(),
                    source,
                })?;
                if !walked.file_type().is_file() {
                    continue;
                }
                push_unique(&mut entries, &mut seen, walked.path(), base_dir, hash)?;
            }
        } else if metadata.is_file() {
            push_unique(&mut entries, &mut seen, raw, base_dir, hash)?;
        } else {
            debug!(path = %raw.display(), "Skipping non-regular file");
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn push_unique(
    entries: &mut Vec<FileEntry>,
    seen: &mut HashSet<String>,
    path: &Path,
    base_dir: Option<&Path>,
    hash: HashFn<'_>,
) -> Result<(), FingerprintError> {
    let normalized = normalize_path(path, base_dir);
    if seen.contains(&normalized) {
        return Ok(());
    }
    let entry = file_entry(path, normalized.clone(), hash)?;
    seen.insert(normalized);
    entries.push(entry);
    Ok(())
}

fn file_entry(
    path: &Path,
    normalized: String,
    hash: HashFn<'_>,
) -> Result<FileEntry, FingerprintError> {
    let read_err = |source| FingerprintError::Read {
        path: path.to_path_buf(),
        source,
    };

    let metadata = fs::metadata(path).map_err(read_err)?;
    let modified = metadata.modified().map_err(read_err)?;
    let sha256 = hash(path).map_err(read_err)?;

    Ok(FileEntry {
        path: normalized,
        size_bytes: metadata.len(),
        sha256,
        modified_at: DateTime::<Utc>::from(modified),
    })
}

/// Streams the file through SHA-256 and returns the hex digest.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Expresses `path` relative to `base_dir` with forward slashes when it lies
/// beneath it; otherwise returns the lexically cleaned path.
pub fn normalize_path(path: &Path, base_dir: Option<&Path>) -> String {
    let cleaned = clean(path);
    if let Some(base) = base_dir {
        let base = clean(base);
        if let Some(rel) = relative_to(&cleaned, &base) {
            return rel;
        }
    }
    cleaned.to_string_lossy().into_owned()
}

fn relative_to(path: &Path, base: &Path) -> Option<String> {
    let stripped = match path.strip_prefix(base) {
        Ok(stripped) => stripped.to_path_buf(),
        Err(_) if path.is_absolute() != base.is_absolute() => {
            let cwd = std::env::current_dir().ok()?;
            let path = clean(&cwd.join(path));
            let base = clean(&cwd.join(base));
            path.strip_prefix(&base).ok()?.to_path_buf()
        }
        Err(_) => return None,
    };
    let parts: Vec<String> = stripped
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Lexical cleanup: drops `.` components and resolves `..` where possible.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
