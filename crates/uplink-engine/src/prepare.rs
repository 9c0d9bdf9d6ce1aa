//! File name normalization, length limits, and copy-or-rename materialization.
//!
//! # Design
//! - Names longer than [`MAX_NAME_CHARS`] lose characters from the base name
//!   only; what counts as the extension is decided by archive, multi-volume,
//!   and plain suffix rules, in that order.
//! - Originals that must survive for seeding are copied into a scratch
//!   `copied/` directory instead of being renamed in place.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use uplink_config::JobOptions;
use uplink_core::FileNormalizer;

use crate::cleanup::{COPIED_DIR_NAME, is_scratch_copy};
use crate::error::{EngineError, EngineResult};
use crate::walker::WalkEntry;

/// Longest file name the platform accepts, in characters.
pub const MAX_NAME_CHARS: usize = 64;

// Patterns are constants covered by the tests below; `None` is unreachable in practice.
static SPLIT_ARCHIVE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)(\.part\d+\.rar|\.(?:7z|zip|rar|tar)\.\d+|\.z\d{2}|\.r\d{2})$").ok()
});
static NUMBERED_VOLUME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(.+)(\..+\.0*\d+)$").ok());
static PART_VOLUME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(.+)(\.part\d+\..+)$").ok());

const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".tar.bz2", ".tar.gz", ".tar.xz", ".tar.zst", ".tbz2", ".tgz", ".tar", ".zip", ".7z", ".rar",
    ".bz2", ".gz", ".xz", ".lzma", ".zst", ".iso", ".wim", ".cab", ".cbz", ".cbr", ".arj", ".lzh",
    ".cpio", ".rpm", ".deb", ".dmg", ".xar", ".img",
];

/// Suffix of `name` that names an archive, including split-volume markers.
#[must_use]
pub fn archive_extension(name: &str) -> Option<&str> {
    if let Some(found) = SPLIT_ARCHIVE.as_ref().and_then(|pattern| pattern.find(name)) {
        return Some(&name[found.start()..]);
    }
    let lowered = name.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS
        .iter()
        .find(|extension| lowered.len() > extension.len() && lowered.ends_with(*extension))
        .map(|extension| &name[name.len() - extension.len()..])
}

/// Split `name` into the base name and the extension kept intact on truncation.
#[must_use]
pub fn split_extension(name: &str) -> (&str, &str) {
    if let Some(extension) = archive_extension(name) {
        return (&name[..name.len() - extension.len()], extension);
    }
    for pattern in [NUMBERED_VOLUME.as_ref(), PART_VOLUME.as_ref()]
        .into_iter()
        .flatten()
    {
        if let Some(captures) = pattern.captures(name)
            && let (Some(base), Some(extension)) = (captures.get(1), captures.get(2))
        {
            return (base.as_str(), extension.as_str());
        }
    }
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// Shorten `name` to [`MAX_NAME_CHARS`] by trimming its base name.
#[must_use]
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() <= MAX_NAME_CHARS {
        return name.to_string();
    }
    let (base, extension) = split_extension(name);
    let remain = MAX_NAME_CHARS.saturating_sub(extension.chars().count());
    let mut truncated: String = base.chars().take(remain).collect();
    truncated.push_str(extension);
    truncated
}

/// Whether `name` is a Matroska container.
#[must_use]
pub fn is_mkv(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".mkv")
}

/// File ready for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFile {
    /// Directory the walker found the file in.
    pub dir: PathBuf,
    /// Current location of the file to upload.
    pub path: PathBuf,
    /// Final file name.
    pub file_name: String,
    /// Caption to publish with the file.
    pub caption: String,
}

/// Give `src` the name `new_name`, copying it into the scratch directory when
/// the original in `base_dir` must be preserved.
///
/// # Errors
///
/// Returns [`EngineError::Io`] when the copy or rename fails.
pub async fn materialize(
    src: &Path,
    base_dir: &Path,
    new_name: &str,
    preserve: bool,
) -> EngineResult<PathBuf> {
    let already_copied = is_scratch_copy(src);
    let target_dir = if already_copied {
        src.parent().unwrap_or(base_dir).to_path_buf()
    } else if preserve {
        base_dir.join(COPIED_DIR_NAME)
    } else {
        base_dir.to_path_buf()
    };
    let target = target_dir.join(new_name);

    if preserve && !already_copied {
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|source| EngineError::io("materialize.create_dir", &target_dir, source))?;
        tokio::fs::copy(src, &target)
            .await
            .map_err(|source| EngineError::io("materialize.copy", &target, source))?;
        debug!(from = %src.display(), to = %target.display(), "copied original for seeding");
    } else {
        tokio::fs::rename(src, &target)
            .await
            .map_err(|source| EngineError::io("materialize.rename", &target, source))?;
        debug!(from = %src.display(), to = %target.display(), "renamed file");
    }
    Ok(target)
}

/// Normalize, optionally merge the attachment into, and length-limit one walked file.
///
/// # Errors
///
/// Returns an error when a collaborator fails or the file cannot be moved.
pub async fn prepare_file(
    normalizer: &dyn FileNormalizer,
    entry: &WalkEntry,
    options: &JobOptions,
) -> EngineResult<PreparedFile> {
    let normalized = normalizer
        .normalize(&entry.name, options.owner_id, &entry.dir)
        .await
        .map_err(|source| EngineError::collaborator("normalize", source))?;
    let mut file_name = normalized.file_name;
    if let Some(attachment) = options.attachment.as_deref()
        && is_mkv(&entry.name)
    {
        file_name = normalizer
            .add_attachment(&entry.name, &entry.dir, attachment)
            .await
            .map_err(|source| EngineError::collaborator("add_attachment", source))?;
    }

    let preserve = options.seed.preserves(&entry.dir);
    let mut path = entry.path();
    if file_name != entry.name {
        path = materialize(&path, &entry.dir, &file_name, preserve).await?;
    }

    let truncated = truncate_name(&file_name);
    if truncated != file_name {
        debug!(original = %file_name, truncated = %truncated, "file name shortened");
        path = materialize(&path, &entry.dir, &truncated, preserve).await?;
        file_name = truncated;
    }

    Ok(PreparedFile {
        dir: entry.dir.clone(),
        path,
        file_name,
        caption: normalized.caption,
    })
}

/// Move a video into a streamable container name (`.mkv`) unless it already is `.mkv`/`.mp4`.
///
/// # Errors
///
/// Returns [`EngineError::Io`] when the file cannot be moved.
pub async fn ensure_video_container(
    path: &Path,
    base_dir: &Path,
    preserve: bool,
) -> EngineResult<PathBuf> {
    let streamable = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            extension.eq_ignore_ascii_case("mkv") || extension.eq_ignore_ascii_case("mp4")
        });
    if streamable {
        return Ok(path.to_path_buf());
    }
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    materialize(path, base_dir, &format!("{stem}.mkv"), preserve).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn split_extension_follows_precedence() {
        assert_eq!(split_extension("show.tar.gz"), ("show", ".tar.gz"));
        assert_eq!(
            split_extension("backup.part003.rar"),
            ("backup", ".part003.rar")
        );
        assert_eq!(split_extension("movie.mkv.001"), ("movie", ".mkv.001"));
        assert_eq!(split_extension("clip.part2.mkv"), ("clip", ".part2.mkv"));
        assert_eq!(split_extension("episode.mkv"), ("episode", ".mkv"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
    }

    #[test]
    fn truncation_keeps_part_archive_extension() {
        let name = format!("{}.part003.rar", "X".repeat(70));
        let truncated = truncate_name(&name);
        assert!(truncated.chars().count() <= MAX_NAME_CHARS);
        assert!(truncated.ends_with(".part003.rar"));
        assert_eq!(truncated, format!("{}.part003.rar", "X".repeat(52)));
    }

    #[test]
    fn truncation_handles_plain_and_extensionless_names() {
        let plain = format!("{}.mkv", "a".repeat(80));
        assert_eq!(truncate_name(&plain), format!("{}.mkv", "a".repeat(60)));
        let bare = "b".repeat(90);
        assert_eq!(truncate_name(&bare), "b".repeat(64));
        assert_eq!(truncate_name("short.mkv"), "short.mkv");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let name = format!("{}.mp4", "é".repeat(70));
        let truncated = truncate_name(&name);
        assert_eq!(truncated.chars().count(), MAX_NAME_CHARS);
        assert!(truncated.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn materialize_copies_preserved_originals() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path();
        let original = root.join("raw name.avi");
        fs::write(&original, b"video")?;

        let copied = materialize(&original, root, "clean.avi", true).await?;
        assert_eq!(copied, root.join(COPIED_DIR_NAME).join("clean.avi"));
        assert!(original.exists());

        let renamed = materialize(&copied, root, "clean.mkv", true).await?;
        assert_eq!(renamed, root.join(COPIED_DIR_NAME).join("clean.mkv"));
        assert!(!copied.exists());

        let moved = materialize(&original, root, "moved.avi", false).await?;
        assert_eq!(moved, root.join("moved.avi"));
        assert!(!original.exists());
        Ok(())
    }

    #[tokio::test]
    async fn video_container_rewrite_targets_mkv() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path();
        let avi = root.join("clip.part1.avi");
        fs::write(&avi, b"video")?;
        let mp4 = root.join("clip.MP4");
        fs::write(&mp4, b"video")?;

        assert_eq!(ensure_video_container(&mp4, root, false).await?, mp4);
        let rewritten = ensure_video_container(&avi, root, false).await?;
        assert_eq!(rewritten, root.join("clip.part1.mkv"));
        assert!(rewritten.exists());
        Ok(())
    }
}
