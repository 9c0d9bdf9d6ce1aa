//! Sending one prepared file with retries, rate-limit cooperation, and the
//! malformed-media fallback.
//!
//! # Design
//! - Two explicit send modes: `Detected` sends as the classified kind and may
//!   move once to `ForcedDocument` when the server rejects the media.
//!   Each mode gets its own retry budget.
//! - Flood waits sleep for the server-given duration and resend the same file
//!   without consuming an attempt.
//! - Thumbnails created for a single attempt are removed whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uplink_config::{EffectiveToggles, SeedMode};
use uplink_core::{
    AudioUpload, CopyRequest, DocumentUpload, Identity, MarkupBuilder, MarkupRequest, MediaKind,
    MediaProbe, MediaTraits, MessageRef, PhotoUpload, ReplyMarkup, SentMessage, Thumbnailer,
    UploadCommon, UploadProgress, VideoUpload,
};
use uplink_telemetry::Metrics;

use crate::classify::{ResolvedThumbnail, ThumbnailSources, screenshot, thumbnail_dimensions};
use crate::cleanup::remove_if_exists;
use crate::error::{EngineError, EngineResult};
use crate::identity::Identities;
use crate::prepare::ensure_video_container;
use crate::retry::RetryPolicy;

/// File being delivered, as it moves through the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    /// Current location of the file.
    pub path: PathBuf,
    /// Directory the walker found the file in.
    pub dir: PathBuf,
    /// Current file name.
    pub file_name: String,
    /// Caption to publish.
    pub caption: String,
    /// Size in bytes.
    pub size: u64,
    /// Identity transferring the file.
    pub identity: Identity,
}

/// Successfully delivered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Message the job continues from.
    pub message: SentMessage,
    /// Kind the file was sent as.
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendMode {
    Detected,
    ForcedDocument,
}

/// Per-job file sender.
pub struct FileSender {
    identities: Identities,
    probe: Arc<dyn MediaProbe>,
    thumbnailer: Arc<dyn Thumbnailer>,
    markup: Arc<dyn MarkupBuilder>,
    thumbnails: ThumbnailSources,
    toggles: EffectiveToggles,
    mirror_elevated: bool,
    seed: SeedMode,
    policy: RetryPolicy,
    progress: UploadProgress,
    metrics: Metrics,
}

/// Collaborators and job state a [`FileSender`] works with.
pub struct SenderParts {
    /// Transports of both identities.
    pub identities: Identities,
    /// Media introspection.
    pub probe: Arc<dyn MediaProbe>,
    /// Thumbnail extraction.
    pub thumbnailer: Arc<dyn Thumbnailer>,
    /// Markup construction.
    pub markup: Arc<dyn MarkupBuilder>,
    /// Job-wide thumbnail sources.
    pub thumbnails: ThumbnailSources,
    /// Toggles in force for the job.
    pub toggles: EffectiveToggles,
    /// Whether elevated sends are mirrored through the standard identity.
    pub mirror_elevated: bool,
    /// Seeding relationship of the source files.
    pub seed: SeedMode,
    /// Retry schedule.
    pub policy: RetryPolicy,
    /// Shared byte counter.
    pub progress: UploadProgress,
    /// Metrics registry.
    pub metrics: Metrics,
}

impl FileSender {
    /// Assemble a sender for one job.
    #[must_use]
    pub fn new(parts: SenderParts) -> Self {
        Self {
            identities: parts.identities,
            probe: parts.probe,
            thumbnailer: parts.thumbnailer,
            markup: parts.markup,
            thumbnails: parts.thumbnails,
            toggles: parts.toggles,
            mirror_elevated: parts.mirror_elevated,
            seed: parts.seed,
            policy: parts.policy,
            progress: parts.progress,
            metrics: parts.metrics,
        }
    }

    /// Deliver `artifact` as a reply to `reply_to`.
    ///
    /// `artifact.path` is updated when the file is moved during the send.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] when the job is cancelled and
    /// [`EngineError::RetriesExhausted`] once every attempt failed.
    pub async fn send(
        &self,
        artifact: &mut FileArtifact,
        reply_to: MessageRef,
    ) -> EngineResult<Delivery> {
        let mut mode = SendMode::Detected;
        loop {
            let mut last_kind = None;
            match self
                .send_with_retries(artifact, reply_to, mode, &mut last_kind)
                .await
            {
                Ok(delivery) => {
                    self.metrics
                        .inc_uploaded(delivery.kind.as_str(), artifact.size);
                    return Ok(delivery);
                }
                Err(err)
                    if mode == SendMode::Detected
                        && err.is_malformed_media()
                        && last_kind.is_some_and(|kind| kind != MediaKind::Document) =>
                {
                    error!(path = %artifact.path.display(), error = %err, "media rejected; retrying as document");
                    self.metrics.inc_document_fallback();
                    mode = SendMode::ForcedDocument;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_with_retries(
        &self,
        artifact: &mut FileArtifact,
        reply_to: MessageRef,
        mode: SendMode,
        last_kind: &mut Option<MediaKind>,
    ) -> EngineResult<Delivery> {
        let mut attempts = 0;
        loop {
            self.check_cancel()?;
            attempts += 1;
            let err = match self.attempt(artifact, reply_to, mode, last_kind).await {
                Ok(delivery) => return Ok(delivery),
                Err(err) => err,
            };
            if err.is_cancelled() {
                return Err(err);
            }
            if let Some(wait) = err
                .transport_error()
                .and_then(uplink_core::TransportError::flood_wait)
            {
                warn!(path = %artifact.path.display(), wait_secs = wait.as_secs(), "rate limited; waiting");
                self.metrics.inc_flood_wait();
                tokio::time::sleep(wait).await;
                attempts -= 1;
                continue;
            }
            error!(path = %artifact.path.display(), attempt = attempts, error = %err, "send attempt failed");
            let rejected = mode == SendMode::Detected
                && err.is_malformed_media()
                && last_kind.is_some_and(|kind| kind != MediaKind::Document);
            if rejected || !self.policy.allows_another(attempts) {
                return Err(EngineError::RetriesExhausted {
                    attempts,
                    source: Box::new(err),
                });
            }
            self.metrics.inc_retry();
            tokio::time::sleep(self.policy.delay_after(attempts)).await;
        }
    }

    async fn attempt(
        &self,
        artifact: &mut FileArtifact,
        reply_to: MessageRef,
        mode: SendMode,
        last_kind: &mut Option<MediaKind>,
    ) -> EngineResult<Delivery> {
        let traits = self
            .probe
            .classify(&artifact.path)
            .await
            .map_err(|source| EngineError::collaborator("classify", source))?;
        let kind = traits.kind(mode == SendMode::ForcedDocument || self.toggles.as_document);
        *last_kind = Some(kind);

        let mut thumbnail = self
            .thumbnails
            .resolve(
                self.thumbnailer.as_ref(),
                &artifact.path,
                &artifact.file_name,
                traits,
            )
            .await?;
        let result = self
            .dispatch(artifact, reply_to, kind, traits, &mut thumbnail)
            .await;
        if let Some(resolved) = thumbnail.filter(|resolved| resolved.origin.is_disposable())
            && let Err(err) = remove_if_exists(&resolved.path).await
        {
            warn!(path = %resolved.path.display(), error = %err, "thumbnail not removed");
        }
        result.map(|message| Delivery { message, kind })
    }

    async fn dispatch(
        &self,
        artifact: &mut FileArtifact,
        reply_to: MessageRef,
        kind: MediaKind,
        traits: MediaTraits,
        thumbnail: &mut Option<ResolvedThumbnail>,
    ) -> EngineResult<SentMessage> {
        let transport = self.identities.get(artifact.identity);
        let (sent, markup) = match kind {
            MediaKind::Document => {
                if traits.video && thumbnail.is_none() {
                    *thumbnail = screenshot(self.thumbnailer.as_ref(), &artifact.path, None).await?;
                }
                self.check_cancel()?;
                let markup = self.build_markup(&artifact.path, traits.video).await;
                let common = self.common(artifact, reply_to, thumbnail.as_ref(), markup.clone());
                let sent = transport
                    .send_document(DocumentUpload { common })
                    .await
                    .map_err(|source| EngineError::transport("send_document", source))?;
                (sent, markup)
            }
            MediaKind::Video => {
                let info = self
                    .probe
                    .media_info(&artifact.path)
                    .await
                    .map_err(|source| EngineError::collaborator("media_info", source))?;
                if thumbnail.is_none() {
                    *thumbnail =
                        screenshot(self.thumbnailer.as_ref(), &artifact.path, Some(info.duration))
                            .await?;
                }
                let (width, height) =
                    thumbnail_dimensions(thumbnail.as_ref().map(|resolved| resolved.path.as_path()));
                self.rewrite_container(artifact).await?;
                self.check_cancel()?;
                let markup = self.build_markup(&artifact.path, true).await;
                let common = self.common(artifact, reply_to, thumbnail.as_ref(), markup.clone());
                let sent = transport
                    .send_video(VideoUpload {
                        common,
                        duration: info.duration,
                        width,
                        height,
                    })
                    .await
                    .map_err(|source| EngineError::transport("send_video", source))?;
                (sent, markup)
            }
            MediaKind::Audio => {
                let info = self
                    .probe
                    .media_info(&artifact.path)
                    .await
                    .map_err(|source| EngineError::collaborator("media_info", source))?;
                self.check_cancel()?;
                let markup = self.build_markup(&artifact.path, false).await;
                let common = self.common(artifact, reply_to, thumbnail.as_ref(), markup.clone());
                let sent = transport
                    .send_audio(AudioUpload {
                        common,
                        duration: info.duration,
                        performer: info.artist,
                        title: info.title,
                    })
                    .await
                    .map_err(|source| EngineError::transport("send_audio", source))?;
                (sent, markup)
            }
            MediaKind::Image => {
                self.check_cancel()?;
                let markup = self.build_markup(&artifact.path, false).await;
                let common = self.common(artifact, reply_to, None, markup.clone());
                let sent = transport
                    .send_photo(PhotoUpload { common })
                    .await
                    .map_err(|source| EngineError::transport("send_photo", source))?;
                (sent, markup)
            }
        };
        debug!(file = %artifact.file_name, kind = kind.as_str(), message = sent.id, "file delivered");
        Ok(self.mirror(artifact.identity, sent, reply_to, markup).await)
    }

    /// Re-post an elevated send through the standard identity so the visible
    /// message comes from the standard identity.
    async fn mirror(
        &self,
        identity: Identity,
        sent: SentMessage,
        reply_to: MessageRef,
        markup: Option<ReplyMarkup>,
    ) -> SentMessage {
        if identity != Identity::Elevated || !self.mirror_elevated {
            return sent;
        }
        let request = CopyRequest {
            to: sent.chat,
            from: sent.message_ref(),
            reply_to: Some(reply_to.id),
            markup,
        };
        match self.identities.standard().copy_message(request).await {
            Ok(copy) => {
                if let Err(err) = self
                    .identities
                    .get(Identity::Elevated)
                    .delete_message(sent.message_ref())
                    .await
                {
                    warn!(message = sent.id, error = %err, "elevated original not deleted");
                }
                info!(message = copy.id, "elevated upload mirrored through standard identity");
                copy
            }
            Err(err) => {
                warn!(message = sent.id, error = %err, "mirror copy failed; keeping elevated message");
                sent
            }
        }
    }

    async fn rewrite_container(&self, artifact: &mut FileArtifact) -> EngineResult<()> {
        let preserve = self.seed.preserves(&artifact.dir);
        let rewritten = ensure_video_container(&artifact.path, &artifact.dir, preserve).await?;
        if rewritten != artifact.path {
            if let Some(name) = rewritten.file_name() {
                artifact.file_name = name.to_string_lossy().into_owned();
            }
            artifact.path = rewritten;
        }
        Ok(())
    }

    async fn build_markup(&self, path: &Path, is_video: bool) -> Option<ReplyMarkup> {
        if !self.toggles.has_buttons {
            return None;
        }
        let request = MarkupRequest {
            screenshots: if is_video { self.toggles.screenshots } else { 0 },
            media_info: self.toggles.media_info,
            is_video,
        };
        match self.markup.build(path, request).await {
            Ok(markup) => markup.filter(|markup| !markup.is_empty()),
            Err(err) => {
                error!(path = %path.display(), error = %err, "markup could not be built");
                None
            }
        }
    }

    fn common(
        &self,
        artifact: &FileArtifact,
        reply_to: MessageRef,
        thumbnail: Option<&ResolvedThumbnail>,
        markup: Option<ReplyMarkup>,
    ) -> UploadCommon {
        self.progress.begin_file();
        UploadCommon {
            path: artifact.path.clone(),
            reply_to,
            caption: artifact.caption.clone(),
            thumbnail: thumbnail.map(|resolved| resolved.path.clone()),
            markup,
            progress: self.progress.clone(),
        }
    }

    fn check_cancel(&self) -> EngineResult<()> {
        if self.progress.cancel_flag().is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}
