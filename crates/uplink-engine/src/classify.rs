//! Thumbnail sourcing, resolution order, and image helpers.
//!
//! # Design
//! - The first source that yields an image wins: custom, persistent owner
//!   thumbnail, sidecar file, embedded audio cover, generated screenshot.
//! - Every resolved thumbnail records its origin so the sender knows which
//!   ones it created for a single send and must delete afterwards.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::{debug, error, warn};
use uplink_core::{MediaTraits, ThumbnailSource, Thumbnailer};
use uuid::Uuid;

use crate::cleanup::{SIDECAR_THUMB_DIR_NAME, remove_if_exists};
use crate::error::{EngineError, EngineResult};

/// Dimensions reported for videos sent without a thumbnail.
pub const DEFAULT_DIMENSIONS: (u32, u32) = (480, 320);

/// Where a thumbnail came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailOrigin {
    /// Owner-supplied link or URL, fetched once per job.
    Custom,
    /// `<thumbnail_dir>/<owner_id>.jpg`, never deleted.
    Persistent,
    /// Colocated sidecar produced by the download stage.
    Sidecar,
    /// Cover art extracted from an audio file.
    AudioCover,
    /// Frame captured from a video.
    Screenshot,
}

impl ThumbnailOrigin {
    /// Whether the thumbnail exists only for the current send.
    #[must_use]
    pub const fn is_disposable(self) -> bool {
        matches!(self, Self::Sidecar | Self::AudioCover | Self::Screenshot)
    }
}

/// Thumbnail chosen for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedThumbnail {
    /// Image path.
    pub path: PathBuf,
    /// Source of the image.
    pub origin: ThumbnailOrigin,
}

impl ResolvedThumbnail {
    const fn new(path: PathBuf, origin: ThumbnailOrigin) -> Self {
        Self { path, origin }
    }
}

/// Classify a custom thumbnail string.
#[must_use]
pub fn parse_thumbnail_source(raw: &str) -> Option<ThumbnailSource> {
    let raw = raw.trim();
    let lowered = raw.to_ascii_lowercase();
    let is_message_link = lowered.starts_with("tg://openmessage")
        || ["https://t.me/", "http://t.me/", "https://telegram.me/", "https://telegram.dog/"]
            .iter()
            .any(|prefix| lowered.starts_with(prefix));
    if is_message_link {
        return Some(ThumbnailSource::MessageLink {
            link: raw.to_string(),
        });
    }
    if lowered.starts_with("https://") || lowered.starts_with("http://") {
        return Some(ThumbnailSource::Url {
            url: raw.to_string(),
        });
    }
    None
}

/// Re-encode any supported image as an RGB JPEG at `dest`.
///
/// # Errors
///
/// Returns [`EngineError::Thumbnail`] when the image cannot be decoded or written.
pub fn reencode_jpeg(src: &Path, dest: &Path) -> EngineResult<()> {
    let decoded = image::open(src).map_err(|source| EngineError::Thumbnail {
        path: src.to_path_buf(),
        source,
    })?;
    decoded
        .to_rgb8()
        .save_with_format(dest, ImageFormat::Jpeg)
        .map_err(|source| EngineError::Thumbnail {
            path: dest.to_path_buf(),
            source,
        })
}

/// Fetch the owner's custom thumbnail once and store it as a JPEG under `dir`.
///
/// Invalid or unreachable sources are logged and yield `None`.
pub async fn fetch_custom_thumbnail(
    thumbnailer: &dyn Thumbnailer,
    raw: &str,
    dir: &Path,
) -> Option<PathBuf> {
    let Some(source) = parse_thumbnail_source(raw) else {
        error!(thumbnail = %raw, "custom thumbnail is neither a message link nor a URL");
        return None;
    };
    let downloaded = match thumbnailer.fetch_image(&source).await {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "custom thumbnail could not be fetched");
            return None;
        }
    };
    if let Err(err) = tokio::fs::create_dir_all(dir).await {
        error!(path = %dir.display(), error = %err, "thumbnail directory unavailable");
        return None;
    }
    let dest = dir.join(format!("custom-{}.jpg", Uuid::new_v4()));
    let (src, target) = (downloaded.clone(), dest.clone());
    let encoded = tokio::task::spawn_blocking(move || reencode_jpeg(&src, &target))
        .await
        .map_err(|source| EngineError::join("reencode_jpeg", source))
        .and_then(|result| result);
    if let Err(err) = remove_if_exists(&downloaded).await {
        warn!(error = %err, "downloaded thumbnail could not be removed");
    }
    match encoded {
        Ok(()) => {
            debug!(path = %dest.display(), "custom thumbnail ready");
            Some(dest)
        }
        Err(err) => {
            error!(error = %err, "custom thumbnail is not a usable image");
            None
        }
    }
}

/// Width and height of `thumbnail`, or [`DEFAULT_DIMENSIONS`] when absent or unreadable.
#[must_use]
pub fn thumbnail_dimensions(thumbnail: Option<&Path>) -> (u32, u32) {
    let Some(path) = thumbnail else {
        return DEFAULT_DIMENSIONS;
    };
    match image::image_dimensions(path) {
        Ok(dimensions) => dimensions,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "thumbnail dimensions unreadable");
            DEFAULT_DIMENSIONS
        }
    }
}

/// Sidecar thumbnail location for `file_name` below the job root.
#[must_use]
pub fn sidecar_thumbnail(root: &Path, file_name: &str) -> PathBuf {
    let stem = Path::new(file_name)
        .file_stem()
        .map_or_else(|| file_name.to_string(), |stem| stem.to_string_lossy().into_owned());
    root.join(SIDECAR_THUMB_DIR_NAME).join(format!("{stem}.jpg"))
}

/// Job-wide thumbnail sources.
#[derive(Debug, Clone, Default)]
pub struct ThumbnailSources {
    /// Custom thumbnail fetched at job start.
    pub custom: Option<PathBuf>,
    /// Persistent owner thumbnail.
    pub persistent: Option<PathBuf>,
    /// Job root, where sidecars live.
    pub root: PathBuf,
}

impl ThumbnailSources {
    /// Resolve the thumbnail that does not require a screenshot.
    ///
    /// # Errors
    ///
    /// Returns an error when cover extraction fails unexpectedly.
    pub async fn resolve(
        &self,
        thumbnailer: &dyn Thumbnailer,
        path: &Path,
        file_name: &str,
        traits: MediaTraits,
    ) -> EngineResult<Option<ResolvedThumbnail>> {
        if let Some(custom) = existing(self.custom.as_deref()).await {
            return Ok(Some(ResolvedThumbnail::new(custom, ThumbnailOrigin::Custom)));
        }
        if let Some(persistent) = existing(self.persistent.as_deref()).await {
            return Ok(Some(ResolvedThumbnail::new(
                persistent,
                ThumbnailOrigin::Persistent,
            )));
        }
        if traits.image {
            return Ok(None);
        }
        let sidecar = sidecar_thumbnail(&self.root, file_name);
        if let Some(sidecar) = existing(Some(&sidecar)).await {
            return Ok(Some(ResolvedThumbnail::new(sidecar, ThumbnailOrigin::Sidecar)));
        }
        if traits.is_audio_only() {
            let cover = thumbnailer
                .audio_cover(path)
                .await
                .map_err(|source| EngineError::collaborator("audio_cover", source))?;
            return Ok(cover.map(|cover| ResolvedThumbnail::new(cover, ThumbnailOrigin::AudioCover)));
        }
        Ok(None)
    }
}

/// Capture a screenshot for a video that has no thumbnail yet.
///
/// # Errors
///
/// Returns an error when the thumbnailer fails.
pub async fn screenshot(
    thumbnailer: &dyn Thumbnailer,
    path: &Path,
    duration: Option<u64>,
) -> EngineResult<Option<ResolvedThumbnail>> {
    let shot = thumbnailer
        .screenshot(path, duration)
        .await
        .map_err(|source| EngineError::collaborator("screenshot", source))?;
    Ok(shot.map(|shot| ResolvedThumbnail::new(shot, ThumbnailOrigin::Screenshot)))
}

async fn existing(path: Option<&Path>) -> Option<PathBuf> {
    let path = path?;
    tokio::fs::try_exists(path)
        .await
        .ok()
        .filter(|exists| *exists)
        .map(|_| path.to_path_buf())
}
