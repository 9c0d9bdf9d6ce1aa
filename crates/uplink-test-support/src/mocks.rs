//! Fake collaborators other than the transport.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uplink_core::{
    ChatKind, ChatRef, DestinationDirectory, FileNormalizer, JobResult, MarkupBuilder,
    MarkupRequest, MediaInfo, MediaProbe, MediaTraits, NormalizedName, ReplyMarkup,
    ThumbnailSource, Thumbnailer, TransportError, TransportResult, UploadListener, UrlButton,
};

/// Directory of known destinations; unknown identifiers are invalid peers.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    known: HashMap<String, ChatRef>,
}

impl FakeDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as a channel with numeric id `chat`.
    #[must_use]
    pub fn with_channel(mut self, id: &str, chat: i64) -> Self {
        self.known
            .insert(id.to_string(), ChatRef::new(chat, ChatKind::Channel));
        self
    }
}

#[async_trait]
impl DestinationDirectory for FakeDirectory {
    async fn resolve(&self, id: &str) -> TransportResult<ChatRef> {
        self.known
            .get(id)
            .copied()
            .ok_or_else(|| TransportError::PeerInvalid {
                peer: id.to_string(),
            })
    }
}

/// Classifies files by extension.
#[derive(Debug, Default)]
pub struct FakeProbe {
    duration: u64,
}

impl FakeProbe {
    /// Probe reporting a 60 second duration.
    #[must_use]
    pub const fn new() -> Self {
        Self { duration: 60 }
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn classify(&self, path: &Path) -> Result<MediaTraits> {
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        Ok(match extension.as_str() {
            "mkv" | "mp4" | "avi" | "webm" | "mov" => MediaTraits {
                video: true,
                audio: true,
                image: false,
            },
            "mp3" | "flac" | "m4a" | "ogg" => MediaTraits {
                audio: true,
                ..MediaTraits::default()
            },
            "jpg" | "jpeg" | "png" | "webp" => MediaTraits {
                image: true,
                ..MediaTraits::default()
            },
            _ => MediaTraits::default(),
        })
    }

    async fn media_info(&self, _path: &Path) -> Result<MediaInfo> {
        Ok(MediaInfo {
            duration: self.duration,
            artist: Some("Fake Artist".into()),
            title: Some("Fake Title".into()),
        })
    }
}

/// Thumbnailer that writes placeholder screenshots and serves a fixed image.
#[derive(Debug, Default)]
pub struct FakeThumbnailer {
    screenshot_dir: Option<PathBuf>,
    image: Option<PathBuf>,
    screenshots: Mutex<Vec<(PathBuf, Option<u64>)>>,
    fetched: AtomicUsize,
}

impl FakeThumbnailer {
    /// Thumbnailer that never produces an image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write screenshots into `dir`.
    #[must_use]
    pub fn with_screenshots(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    /// Serve a copy of `image` for every custom thumbnail request.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<PathBuf>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Screenshots taken, with the duration hint each one received.
    #[must_use]
    pub fn screenshots(&self) -> Vec<(PathBuf, Option<u64>)> {
        self.screenshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of custom thumbnail downloads.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Thumbnailer for FakeThumbnailer {
    async fn screenshot(&self, path: &Path, duration: Option<u64>) -> Result<Option<PathBuf>> {
        self.screenshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((path.to_path_buf(), duration));
        let Some(dir) = &self.screenshot_dir else {
            return Ok(None);
        };
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let shot = dir.join(format!("{stem}-shot.jpg"));
        tokio::fs::write(&shot, b"not a real jpeg").await?;
        Ok(Some(shot))
    }

    async fn audio_cover(&self, _path: &Path) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn fetch_image(&self, source: &ThumbnailSource) -> Result<PathBuf> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("no image available for {source:?}"))?;
        let count = self.fetched.fetch_add(1, Ordering::SeqCst);
        let extension = image
            .extension()
            .map(|extension| extension.to_string_lossy().into_owned())
            .unwrap_or_default();
        let download = image.with_file_name(format!("download-{count}.{extension}"));
        tokio::fs::copy(image, &download).await?;
        Ok(download)
    }
}

/// Normalizer that keeps names unless a rename is registered.
#[derive(Debug, Default)]
pub struct FakeNormalizer {
    renames: HashMap<String, String>,
    attachments: Mutex<Vec<String>>,
}

impl FakeNormalizer {
    /// Normalizer that keeps every name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename `raw` to `normalized`; the file itself is not touched.
    #[must_use]
    pub fn with_rename(mut self, raw: &str, normalized: &str) -> Self {
        self.renames.insert(raw.to_string(), normalized.to_string());
        self
    }

    /// Files that received an attachment.
    #[must_use]
    pub fn attachments(&self) -> Vec<String> {
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FileNormalizer for FakeNormalizer {
    async fn normalize(&self, raw: &str, _owner_id: i64, _dir: &Path) -> Result<NormalizedName> {
        let file_name = self
            .renames
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string());
        Ok(NormalizedName {
            caption: file_name.clone(),
            file_name,
        })
    }

    async fn add_attachment(&self, file_name: &str, _dir: &Path, _attachment: &str) -> Result<String> {
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(file_name.to_string());
        Ok(file_name.to_string())
    }
}

/// Markup builder returning one button per requested feature.
#[derive(Debug, Default)]
pub struct FakeMarkup {
    fail: bool,
    requests: Mutex<Vec<MarkupRequest>>,
}

impl FakeMarkup {
    /// Builder that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<MarkupRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MarkupBuilder for FakeMarkup {
    async fn build(&self, _path: &Path, request: MarkupRequest) -> Result<Option<ReplyMarkup>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        if self.fail {
            return Err(anyhow!("markup service unavailable"));
        }
        let mut buttons = Vec::new();
        if request.screenshots > 0 {
            buttons.push(UrlButton {
                label: "SCREENSHOTS".into(),
                url: "https://example.test/screenshots".into(),
            });
        }
        if request.media_info {
            buttons.push(UrlButton {
                label: "MediaInfo".into(),
                url: "https://example.test/mediainfo".into(),
            });
        }
        Ok((!buttons.is_empty()).then(|| ReplyMarkup::column(buttons)))
    }
}

/// Listener event captured by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// Successful completion.
    Complete(JobResult),
    /// Failure or cancellation.
    Error(String),
}

/// Listener that records every callback.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: RwLock<Vec<ListenerEvent>>,
}

impl RecordingListener {
    /// Empty listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks received, in order.
    pub async fn events(&self) -> Vec<ListenerEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl UploadListener for RecordingListener {
    async fn on_upload_complete(&self, result: JobResult) {
        self.events
            .write()
            .await
            .push(ListenerEvent::Complete(result));
    }

    async fn on_upload_error(&self, message: String) {
        self.events.write().await.push(ListenerEvent::Error(message));
    }
}
