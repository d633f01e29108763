//! Input discovery: walk the input root and read candidate files.
//!
//! Relative paths are returned `/`-separated regardless of platform so the
//! same key is written to the progress log everywhere. The walk is sorted by
//! file name, which keeps runs and their logs reproducible.

use crate::error::{AttemptError, BatchError};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// List every file under `root` whose extension matches one of
/// `extensions` (case-insensitive), as paths relative to `root`.
///
/// Fails with [`BatchError::InputDirNotFound`] if `root` is missing or not a
/// directory. Unreadable entries below the root are skipped with a warning.
pub fn list_inputs(root: &Path, extensions: &[String]) -> Result<Vec<String>, BatchError> {
    if !root.is_dir() {
        return Err(BatchError::InputDirNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !is_regular_file(&entry) {
            continue;
        }
        if !has_extension(entry.path(), extensions) {
            continue;
        }
        match entry.path().strip_prefix(root) {
            Ok(rel) => files.push(to_key(rel)),
            Err(_) => warn!("Entry outside input root: {}", entry.path().display()),
        }
    }

    debug!("Found {} inputs under {}", files.len(), root.display());
    Ok(files)
}

/// Regular files and symlinks to regular files. Symlinked directories are
/// listed but never descended into, since the walk does not follow links.
fn is_regular_file(entry: &walkdir::DirEntry) -> bool {
    if entry.path_is_symlink() {
        // Follows the link; dangling links are not files.
        entry.path().is_file()
    } else {
        entry.file_type().is_file()
    }
}

/// Read a whole input file into memory.
pub async fn read_input(root: &Path, filename: &str) -> Result<Vec<u8>, AttemptError> {
    let path = resolve(root, filename);
    tokio::fs::read(&path)
        .await
        .map_err(|e| AttemptError::ReadFailed {
            path,
            detail: e.to_string(),
        })
}

/// Lower-cased extension of `filename`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

/// Join normal path components with `/`.
fn to_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a progress-log key back to a platform path under `root`.
pub fn resolve(root: &Path, filename: &str) -> PathBuf {
    filename.split('/').fold(root.to_path_buf(), |p, part| p.join(part))
}
