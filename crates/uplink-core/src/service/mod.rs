//! Collaborator traits implemented by platform adapters and consumed by the engine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::model::{
    AudioUpload, ChatRef, CopyRequest, DocumentUpload, InputMedia, JobResult, MediaInfo,
    MediaTraits, MessageRef, NormalizedName, PhotoUpload, ReplyMarkup, SentMessage,
    ThumbnailSource, VideoUpload,
};

/// Capability surface of one network identity.
///
/// Implemented once per identity (standard and elevated); both instances are
/// process-wide and shared by every running job.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, chat: ChatRef, text: &str) -> TransportResult<SentMessage>;

    /// Upload a file as a generic document.
    async fn send_document(&self, upload: DocumentUpload) -> TransportResult<SentMessage>;

    /// Upload a streamable video.
    async fn send_video(&self, upload: VideoUpload) -> TransportResult<SentMessage>;

    /// Upload an audio track.
    async fn send_audio(&self, upload: AudioUpload) -> TransportResult<SentMessage>;

    /// Upload a photo.
    async fn send_photo(&self, upload: PhotoUpload) -> TransportResult<SentMessage>;

    /// Post previously uploaded media as one grouped post replying to `reply_to`.
    async fn send_media_group(
        &self,
        reply_to: MessageRef,
        media: Vec<InputMedia>,
    ) -> TransportResult<Vec<SentMessage>>;

    /// Copy a single message into another chat.
    async fn copy_message(&self, request: CopyRequest) -> TransportResult<SentMessage>;

    /// Copy the grouped post containing `from` into another chat.
    async fn copy_media_group(
        &self,
        to: ChatRef,
        from: MessageRef,
        reply_to: Option<i64>,
    ) -> TransportResult<Vec<SentMessage>>;

    /// Replace the interactive markup of a delivered message.
    async fn edit_reply_markup(
        &self,
        message: MessageRef,
        markup: ReplyMarkup,
    ) -> TransportResult<SentMessage>;

    /// Delete a delivered message.
    async fn delete_message(&self, message: MessageRef) -> TransportResult<()>;

    /// Abort any transfer currently in flight on this identity.
    fn stop_transmission(&self);
}

/// Resolves free-form destination identifiers into chat handles.
#[async_trait]
pub trait DestinationDirectory: Send + Sync {
    /// Resolve an identifier (numeric id or username).
    ///
    /// Unreachable destinations surface as
    /// [`TransportError::PeerInvalid`](crate::TransportError::PeerInvalid) or
    /// [`TransportError::ChannelInvalid`](crate::TransportError::ChannelInvalid).
    async fn resolve(&self, id: &str) -> TransportResult<ChatRef>;
}

/// Media introspection (kind detection and metadata extraction).
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Inspect the file content and report which streams it carries.
    async fn classify(&self, path: &Path) -> anyhow::Result<MediaTraits>;

    /// Extract duration and tag metadata.
    async fn media_info(&self, path: &Path) -> anyhow::Result<MediaInfo>;
}

/// Thumbnail and screenshot extraction.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Grab a still frame from a video; `duration` helps pick the timestamp.
    async fn screenshot(&self, path: &Path, duration: Option<u64>)
    -> anyhow::Result<Option<PathBuf>>;

    /// Extract embedded cover art from an audio file.
    async fn audio_cover(&self, path: &Path) -> anyhow::Result<Option<PathBuf>>;

    /// Download a user-supplied thumbnail image to a local path.
    async fn fetch_image(&self, source: &ThumbnailSource) -> anyhow::Result<PathBuf>;
}

/// Filename normalisation and attachment logic.
#[async_trait]
pub trait FileNormalizer: Send + Sync {
    /// Produce a collision-safe file name and caption for `raw` inside `dir`.
    async fn normalize(&self, raw: &str, owner_id: i64, dir: &Path)
    -> anyhow::Result<NormalizedName>;

    /// Merge an attachment into a container file, returning the new file name.
    async fn add_attachment(
        &self,
        file_name: &str,
        dir: &Path,
        attachment: &str,
    ) -> anyhow::Result<String>;
}

/// Inputs for building the interactive markup of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkupRequest {
    /// Number of screenshots to publish (0 disables, videos only).
    pub screenshots: u32,
    /// Whether to publish a media-info page.
    pub media_info: bool,
    /// Whether the file is a video.
    pub is_video: bool,
}

/// Builds interactive markup (screenshot and media-info buttons).
#[async_trait]
pub trait MarkupBuilder: Send + Sync {
    /// Build the markup for `path`; `None` when there is nothing to attach.
    async fn build(&self, path: &Path, request: MarkupRequest)
    -> anyhow::Result<Option<ReplyMarkup>>;
}

/// Job owner callbacks.
#[async_trait]
pub trait UploadListener: Send + Sync {
    /// Called exactly once when the job finishes successfully.
    async fn on_upload_complete(&self, result: JobResult);

    /// Called exactly once when the job fails or is cancelled.
    async fn on_upload_error(&self, message: String);
}
