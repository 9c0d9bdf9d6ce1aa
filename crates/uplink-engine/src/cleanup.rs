//! Local file removal after uploads and scratch directory cleanup.
//!
//! # Design
//! - Removal is idempotent: a path that is already gone counts as removed.
//! - Whether an uploaded file may be deleted depends only on the seed mode and
//!   where the file lives, so the decision is a pure function.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uplink_config::{SPLIT_DIR_NAME, SeedMode};
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};

/// Scratch directory receiving copies of files that must stay intact for seeding.
pub const COPIED_DIR_NAME: &str = "copied";
/// Directory of sidecar thumbnails produced by the download stage.
pub const SIDECAR_THUMB_DIR_NAME: &str = "yt-dlp-thumb";

/// Remove a file if it exists.
///
/// Returns `true` when a file was removed and `false` when it was already gone.
///
/// # Errors
///
/// Returns [`EngineError::Io`] for failures other than a missing file.
pub async fn remove_if_exists(path: &Path) -> EngineResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed local file");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(EngineError::io("remove_if_exists", path, err)),
    }
}

/// Whether `path` lives under a scratch copy directory.
#[must_use]
pub fn is_scratch_copy(path: &Path) -> bool {
    path.parent()
        .is_some_and(|parent| parent.components().any(|c| c.as_os_str() == COPIED_DIR_NAME))
}

/// Whether an uploaded file may be deleted once its send has finished.
#[must_use]
pub fn should_remove_after_upload(path: &Path, dir: &Path, seed: SeedMode) -> bool {
    !seed.preserves(dir) || is_scratch_copy(path)
}

/// Remove scratch directories and empty directories below `root`.
///
/// # Errors
///
/// Returns an error when the walk fails or a directory cannot be removed.
pub async fn clean_unwanted(root: &Path) -> EngineResult<()> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || clean_unwanted_blocking(&root))
        .await
        .map_err(|source| EngineError::join("clean_unwanted", source))?
}

fn is_scratch_dir(path: &Path) -> bool {
    path.file_name().is_some_and(|name| {
        name == COPIED_DIR_NAME || name == SPLIT_DIR_NAME || name == SIDECAR_THUMB_DIR_NAME
    })
}

fn clean_unwanted_blocking(root: &Path) -> EngineResult<()> {
    let mut scratch: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|source| EngineError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_dir() && is_scratch_dir(entry.path()) {
            scratch.push(entry.into_path());
        }
    }

    for dir in scratch {
        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!(path = %dir.display(), "removed scratch directory"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(EngineError::io("clean_unwanted.remove_dir", &dir, err)),
        }
    }

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = fs::read_dir(entry.path())
            .map(|mut children| children.next().is_none())
            .unwrap_or(false);
        if is_empty && let Err(err) = fs::remove_dir(entry.path()) {
            warn!(path = %entry.path().display(), error = %err, "failed to remove empty directory");
        }
    }
    Ok(())
}
