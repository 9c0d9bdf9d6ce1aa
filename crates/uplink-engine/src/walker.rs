//! Deterministic enumeration of a job's files and the admission filter.
//!
//! # Design
//! - The directory listing is captured once when the walker is built; files
//!   renamed or copied during the upload never re-enter the sequence.
//! - Directories are visited in sorted path order and file names within a
//!   directory in natural order (`b2` before `b10`).
//! - Admission mutates [`JobStats`] explicitly instead of closing over counters.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use uplink_config::{JobOptions, UploadSettings};
use walkdir::WalkDir;

use crate::cleanup::{COPIED_DIR_NAME, SIDECAR_THUMB_DIR_NAME, remove_if_exists};
use crate::error::{EngineError, EngineResult};
use crate::stats::JobStats;

/// One file produced by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Directory containing the file.
    pub dir: PathBuf,
    /// File name as found on disk.
    pub name: String,
}

impl WalkEntry {
    /// Full path of the file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Finite, non-restartable sequence of files below a job root.
#[derive(Debug)]
pub struct JobWalker {
    entries: std::vec::IntoIter<WalkEntry>,
}

impl JobWalker {
    /// Snapshot the tree below `root` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Same as [`JobWalker::new`], plus [`EngineError::Join`] when the
    /// blocking task does not finish.
    pub async fn snapshot(root: &Path) -> EngineResult<Self> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || Self::new(&root))
            .await
            .map_err(|source| EngineError::join("walk.snapshot", source))?
    }

    /// Snapshot the directory tree below `root`.
    ///
    /// Unreadable entries below the root are logged and skipped. Symbolic
    /// links are listed when they point at a file or point nowhere; a
    /// dangling link then fails admission like any unreadable file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Walk`] or [`EngineError::Io`] when the root
    /// itself cannot be read.
    pub fn new(root: &Path) -> EngineResult<Self> {
        let mut dirs: Vec<(PathBuf, Vec<String>)> = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(EngineError::Walk {
                        path: root.to_path_buf(),
                        source,
                    });
                }
                Err(err) => {
                    warn!(path = %err.path().unwrap_or(root).display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() || is_skipped_dir(root, entry.path()) {
                continue;
            }
            let mut names = match list_files(entry.path()) {
                Ok(names) => names,
                Err(source) if entry.depth() == 0 => {
                    return Err(EngineError::io("walk.read_dir", root, source));
                }
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "skipping unreadable directory");
                    continue;
                }
            };
            names.sort_by(|a, b| natural_cmp(a, b));
            dirs.push((entry.into_path(), names));
        }
        dirs.sort_by(|(a, _), (b, _)| a.cmp(b));

        let entries: Vec<WalkEntry> = dirs
            .into_iter()
            .flat_map(|(dir, names)| {
                names.into_iter().map(move |name| WalkEntry {
                    dir: dir.clone(),
                    name,
                })
            })
            .collect();
        debug!(root = %root.display(), files = entries.len(), "job tree captured");
        Ok(Self {
            entries: entries.into_iter(),
        })
    }
}

fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for child in fs::read_dir(dir)? {
        let child = match child {
            Ok(child) => child,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if is_listed_file(&child) {
            names.push(child.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn is_listed_file(child: &fs::DirEntry) -> bool {
    match child.file_type() {
        Ok(kind) if kind.is_symlink() => {
            fs::metadata(child.path()).map_or(true, |target| target.is_file())
        }
        Ok(kind) => kind.is_file(),
        Err(err) => {
            warn!(path = %child.path().display(), error = %err, "skipping entry of unknown type");
            false
        }
    }
}

impl Iterator for JobWalker {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

fn is_skipped_dir(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| {
        let name = component.as_os_str();
        name == SIDECAR_THUMB_DIR_NAME || name == COPIED_DIR_NAME
    })
}

/// Compare two file names the way a person would: digit runs numerically.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x, y) {
                    (Chunk::Digits(x), Chunk::Digits(y)) => compare_digits(x, y),
                    (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
                    (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
                    (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn compare_digits(x: &str, y: &str) -> Ordering {
    let x_trimmed = x.trim_start_matches('0');
    let y_trimmed = y.trim_start_matches('0');
    x_trimmed
        .len()
        .cmp(&y_trimmed.len())
        .then_with(|| x_trimmed.cmp(y_trimmed))
        .then_with(|| x.len().cmp(&y.len()))
}

enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    const fn new(value: &'a str) -> Self {
        Self { rest: value }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map_or(self.rest.len(), |(index, _)| index);
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}

/// Outcome of running a walked file through the admission filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Extension is filtered; the file was deleted and is not counted.
    Filtered,
    /// Already uploaded by an earlier run of the same seed.
    AlreadySynced,
    /// Zero-byte file; counted as corrupted.
    Empty,
    /// File proceeds to preparation.
    Admitted {
        /// Size in bytes.
        size: u64,
    },
}

/// Decide whether a walked file is uploaded, updating `stats` accordingly.
///
/// # Errors
///
/// Returns an error when the file cannot be inspected or a filtered file
/// cannot be deleted.
pub async fn admit(
    entry: &WalkEntry,
    settings: &UploadSettings,
    options: &JobOptions,
    stats: &mut JobStats,
) -> EngineResult<Admission> {
    let path = entry.path();
    if settings.is_filtered(&entry.name) {
        remove_if_exists(&path).await?;
        debug!(file = %entry.name, "filtered extension removed");
        return Ok(Admission::Filtered);
    }

    let size = tokio::fs::metadata(&path)
        .await
        .map_err(|source| EngineError::io("admit.metadata", &path, source))?
        .len();
    if options.seed.is_seeding()
        && options
            .synced_files
            .iter()
            .any(|synced| synced.name == entry.name && synced.size == size)
    {
        info!(file = %entry.name, size, "already uploaded for this seed");
        return Ok(Admission::AlreadySynced);
    }

    stats.record_file();
    if size == 0 {
        error!(path = %path.display(), "zero-size file cannot be uploaded");
        stats.record_corrupted();
        return Ok(Admission::Empty);
    }
    Ok(Admission::Admitted { size })
}
