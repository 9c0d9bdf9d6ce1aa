//! Upload service and the per-job orchestration loop.
//!
//! # Design
//! - A job is one sequential flow: files are handled one at a time, so the
//!   group buffer, link map, and reply anchor live in a plain `JobRun` value.
//! - Per-file failures are logged, counted as corrupted, and never stop the
//!   loop; only cancellation ends it early.
//! - The listener hears about the job exactly once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{Instrument, Span, error, info, warn};
use uplink_config::{EffectiveToggles, JobOptions, SeedMode, UploadSettings};
use uplink_core::{
    CancelFlag, ChatRef, DestinationDirectory, FileNormalizer, JobResult, MarkupBuilder,
    MediaProbe, MessageRef, MessageTransport, SentMessage, Thumbnailer, UploadListener,
    UploadProgress,
};
use uplink_telemetry::{Metrics, job_span, record_identity};
use uuid::Uuid;

use crate::classify::{ThumbnailSources, fetch_custom_thumbnail};
use crate::cleanup::{clean_unwanted, remove_if_exists, should_remove_after_upload};
use crate::error::EngineError;
use crate::fanout::{BotPmTarget, DestinationSet, LogDestination, Replicator};
use crate::group::{BufferedMessage, Drained, GroupBuffer, GroupKind, group_key_in};
use crate::identity::Identities;
use crate::prepare::prepare_file;
use crate::retry::RetryPolicy;
use crate::sender::{FileArtifact, FileSender, SenderParts};
use crate::stats::{CANCELLED_MESSAGE, JobStats, LinkMap, Throughput};
use crate::walker::{Admission, JobWalker, WalkEntry, admit};

/// Reported when the elevated identity would have to upload into a chat without public links.
pub const SUPERGROUP_REQUIRED_MESSAGE: &str = "Use a supergroup to upload with the elevated identity, or configure log destinations to upload in private.";

/// Collaborators shared by every job of a service.
#[derive(Clone)]
pub struct Collaborators {
    /// Standard identity transport.
    pub standard: Arc<dyn MessageTransport>,
    /// Elevated identity transport, when one is logged in.
    pub elevated: Option<Arc<dyn MessageTransport>>,
    /// Destination resolution.
    pub directory: Arc<dyn DestinationDirectory>,
    /// Media introspection.
    pub probe: Arc<dyn MediaProbe>,
    /// Thumbnail extraction.
    pub thumbnailer: Arc<dyn Thumbnailer>,
    /// File name normalization.
    pub normalizer: Arc<dyn FileNormalizer>,
    /// Markup construction.
    pub markup: Arc<dyn MarkupBuilder>,
}

/// Everything needed to upload one finished download.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Display name reported with the result.
    pub name: String,
    /// Directory holding the files to upload.
    pub root: PathBuf,
    /// Payload size reported with the result.
    pub size: u64,
    /// Message that started the job.
    pub origin: MessageRef,
    /// Owner preferences for this job.
    pub options: JobOptions,
    /// Placeholder in the owner's private chat that copies reply to.
    pub pm_anchor: Option<MessageRef>,
    /// How the owner is named in job-start placeholders.
    pub owner_label: Option<String>,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// At least one file was delivered.
    Completed(JobResult),
    /// The job failed; the message was reported to the listener.
    Failed(String),
    /// The owner cancelled the job.
    Cancelled,
}

/// Entry point creating upload jobs over shared identities and settings.
#[derive(Clone)]
pub struct UploadService {
    settings: Arc<UploadSettings>,
    collaborators: Collaborators,
    identities: Identities,
    metrics: Metrics,
}

impl UploadService {
    /// Build a service from validated settings.
    #[must_use]
    pub fn new(settings: UploadSettings, collaborators: Collaborators, metrics: Metrics) -> Self {
        let mut identities = Identities::new(Arc::clone(&collaborators.standard));
        if let Some(elevated) = &collaborators.elevated {
            identities = identities.with_elevated(Arc::clone(elevated));
        }
        Self {
            settings: Arc::new(settings),
            collaborators,
            identities,
            metrics,
        }
    }

    /// Create a job; nothing happens until [`UploadJob::run`] is awaited.
    #[must_use]
    pub fn create_job(
        &self,
        request: UploadRequest,
        listener: Arc<dyn UploadListener>,
    ) -> UploadJob {
        let cancel = CancelFlag::new();
        let progress = UploadProgress::new(cancel.clone());
        UploadJob {
            id: Uuid::new_v4(),
            throughput: Throughput::start(progress.clone()),
            progress,
            cancel,
            request,
            listener,
            settings: Arc::clone(&self.settings),
            collaborators: self.collaborators.clone(),
            identities: self.identities.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Cancels a running job from another task.
#[derive(Clone)]
pub struct CancelHandle {
    cancel: CancelFlag,
    identities: Identities,
    name: String,
}

impl CancelHandle {
    /// Request cancellation and abort transfers in flight on both identities.
    ///
    /// Returns `false` when the job was already cancelled.
    pub fn cancel(&self) -> bool {
        if !self.cancel.cancel() {
            return false;
        }
        info!(job = %self.name, "cancelling upload");
        self.identities.stop_all();
        true
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One upload job.
pub struct UploadJob {
    id: Uuid,
    request: UploadRequest,
    listener: Arc<dyn UploadListener>,
    settings: Arc<UploadSettings>,
    collaborators: Collaborators,
    identities: Identities,
    metrics: Metrics,
    cancel: CancelFlag,
    progress: UploadProgress,
    throughput: Throughput,
}

struct JobRun {
    stats: JobStats,
    links: LinkMap,
    buffer: GroupBuffer,
    current: MessageRef,
    pending_placeholder: Option<MessageRef>,
    links_visible: bool,
}

impl UploadJob {
    /// Job identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Handle that cancels this job.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: self.cancel.clone(),
            identities: self.identities.clone(),
            name: self.request.name.clone(),
        }
    }

    /// Bytes transferred so far.
    #[must_use]
    pub fn processed_bytes(&self) -> u64 {
        self.throughput.processed_bytes()
    }

    /// Average upload speed in bytes per second.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.throughput.speed()
    }

    /// Upload every file and report the outcome to the listener.
    pub async fn run(&self) -> JobOutcome {
        let span = job_span(&self.id.to_string(), &self.request.name);
        async {
            self.metrics.job_started();
            let outcome = self.execute().await;
            self.metrics.job_finished();
            match &outcome {
                JobOutcome::Completed(result) => {
                    info!(
                        total_files = result.total_files,
                        corrupted = result.corrupted,
                        links = result.links.len(),
                        "upload completed"
                    );
                    self.listener.on_upload_complete(result.clone()).await;
                }
                JobOutcome::Failed(message) => {
                    error!(reason = %message, "upload failed");
                    self.listener.on_upload_error(message.clone()).await;
                }
                JobOutcome::Cancelled => {
                    info!("upload cancelled");
                    self.listener
                        .on_upload_error(CANCELLED_MESSAGE.to_string())
                        .await;
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(&self) -> JobOutcome {
        let options = &self.request.options;
        let toggles = self.settings.effective(options);
        let destinations = match self.resolve_destinations(&toggles).await {
            Ok(destinations) => destinations,
            Err(message) => return JobOutcome::Failed(message),
        };
        let walker = match JobWalker::snapshot(&self.request.root).await {
            Ok(walker) => walker,
            Err(err) => {
                error!(root = %self.request.root.display(), error = %err, "job directory unreadable");
                return JobOutcome::Failed(err.to_string());
            }
        };

        let custom = match options.custom_thumbnail.as_deref() {
            Some(raw) => {
                fetch_custom_thumbnail(
                    self.collaborators.thumbnailer.as_ref(),
                    raw,
                    &self.settings.thumbnail_dir,
                )
                .await
            }
            None => None,
        };
        let sender = FileSender::new(SenderParts {
            identities: self.identities.clone(),
            probe: Arc::clone(&self.collaborators.probe),
            thumbnailer: Arc::clone(&self.collaborators.thumbnailer),
            markup: Arc::clone(&self.collaborators.markup),
            thumbnails: ThumbnailSources {
                custom: custom.clone(),
                persistent: Some(self.settings.persistent_thumbnail(options.owner_id)),
                root: self.request.root.clone(),
            },
            toggles,
            mirror_elevated: toggles.has_buttons || self.settings.log_destinations.is_empty(),
            seed: options.seed,
            policy: RetryPolicy::from(&self.settings.retry),
            progress: self.progress.clone(),
            metrics: self.metrics.clone(),
        });
        let mut replicator = Replicator::new(
            Arc::clone(&self.collaborators.standard),
            Arc::clone(&self.collaborators.directory),
            &destinations,
            toggles.has_buttons,
            self.metrics.clone(),
            self.cancel.clone(),
        );
        let mut run = JobRun {
            stats: JobStats::default(),
            links: LinkMap::default(),
            buffer: GroupBuffer::new(),
            current: destinations.primary,
            pending_placeholder: (!self.settings.log_destinations.is_empty())
                .then_some(destinations.primary),
            links_visible: self.request.origin.chat.kind.is_broadcast_or_supergroup()
                || !self.settings.log_destinations.is_empty(),
        };

        for entry in walker {
            if self.is_cancelled() {
                break;
            }
            self.process_entry(&entry, &toggles, &sender, &mut replicator, &mut run)
                .await;
        }
        if !self.is_cancelled() {
            self.flush_pending(&mut replicator, &mut run).await;
        }

        if let Some(custom) = custom
            && let Err(err) = remove_if_exists(&custom).await
        {
            warn!(path = %custom.display(), error = %err, "custom thumbnail not removed");
        }
        if self.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        if options.seed == SeedMode::PreserveOriginals
            && let Err(err) = clean_unwanted(&self.request.root).await
        {
            warn!(root = %self.request.root.display(), error = %err, "scratch cleanup failed");
        }

        if let Some(message) = run.stats.completion().error_message() {
            return JobOutcome::Failed(message.to_string());
        }
        JobOutcome::Completed(JobResult {
            name: self.request.name.clone(),
            size: self.request.size,
            links: run.links.into_links(),
            total_files: run.stats.total_files,
            corrupted: run.stats.corrupted,
        })
    }

    async fn process_entry(
        &self,
        entry: &WalkEntry,
        toggles: &EffectiveToggles,
        sender: &FileSender,
        replicator: &mut Replicator,
        run: &mut JobRun,
    ) {
        let options = &self.request.options;
        let size = match admit(entry, &self.settings, options, &mut run.stats).await {
            Ok(Admission::Admitted { size }) => size,
            Ok(Admission::Empty) => {
                self.metrics.inc_corrupted();
                self.discard(&entry.path(), &entry.dir).await;
                return;
            }
            Ok(Admission::Filtered | Admission::AlreadySynced) => return,
            Err(err) => {
                error!(path = %entry.path().display(), error = %err, "file could not be inspected");
                run.stats.record_file();
                self.record_failure(run);
                return;
            }
        };

        let prepared = match prepare_file(self.collaborators.normalizer.as_ref(), entry, options)
            .await
        {
            Ok(prepared) => prepared,
            Err(err) => {
                error!(path = %entry.path().display(), error = %err, "file could not be prepared");
                self.record_failure(run);
                self.discard(&entry.path(), &entry.dir).await;
                return;
            }
        };

        if toggles.media_group {
            let key = group_key_in(&prepared.dir, &prepared.file_name);
            if run.buffer.breaks_on(key.as_deref()) {
                self.flush_pending(replicator, run).await;
            }
        }
        if self.is_cancelled() {
            return;
        }

        let identity = self.identities.select(
            &prepared.file_name,
            size,
            self.settings.elevated_identity,
        );
        record_identity(&Span::current(), identity.as_str());
        let mut artifact = FileArtifact {
            path: prepared.path,
            dir: prepared.dir,
            file_name: prepared.file_name,
            caption: prepared.caption,
            size,
            identity,
        };
        let reply_to = run.current;
        match sender.send(&mut artifact, reply_to).await {
            Ok(delivery) => {
                self.delete_pending_placeholder(run).await;
                self.accept(delivery.message, reply_to, &artifact, toggles, replicator, run)
                    .await;
                let pacing = self.settings.pacing();
                if !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                match &err {
                    EngineError::RetriesExhausted { attempts, .. } => {
                        error!(path = %artifact.path.display(), attempts, error = %err, "giving up on file");
                    }
                    _ => error!(path = %artifact.path.display(), error = %err, "file not delivered"),
                }
                self.record_failure(run);
            }
        }
        self.discard(&artifact.path, &artifact.dir).await;
    }

    async fn accept(
        &self,
        message: SentMessage,
        reply_to: MessageRef,
        artifact: &FileArtifact,
        toggles: &EffectiveToggles,
        replicator: &mut Replicator,
        run: &mut JobRun,
    ) {
        run.current = message.message_ref();
        if run.links_visible {
            run.links.insert(message.link.clone(), artifact.file_name.clone());
        }
        let groupable = message.media_kind().and_then(GroupKind::from_media);
        let key = group_key_in(&artifact.dir, &artifact.file_name);
        if toggles.media_group
            && !self.is_cancelled()
            && let (Some(kind), Some(key)) = (groupable, key)
        {
            let item = BufferedMessage {
                message,
                reply_to,
                label: artifact.file_name.clone(),
            };
            if let Some(full) = run.buffer.push(kind, &key, item) {
                self.publish(full, replicator, run).await;
            }
            return;
        }
        replicator.replicate(&message).await;
    }

    async fn flush_pending(&self, replicator: &mut Replicator, run: &mut JobRun) {
        for drained in run.buffer.drain() {
            self.publish(drained, replicator, run).await;
        }
    }

    async fn publish(&self, drained: Drained, replicator: &mut Replicator, run: &mut JobRun) {
        match drained {
            Drained::Single(item) => {
                replicator.replicate(&item.message).await;
            }
            Drained::Group { kind, key, items } => {
                self.flush_group(kind, &key, items, replicator, run).await;
            }
        }
    }

    async fn flush_group(
        &self,
        kind: GroupKind,
        key: &str,
        items: Vec<BufferedMessage>,
        replicator: &mut Replicator,
        run: &mut JobRun,
    ) {
        let Some(first) = items.first() else {
            return;
        };
        let media = items
            .iter()
            .filter_map(|item| item.input_media(kind))
            .collect::<Vec<_>>();
        let posted = match self
            .collaborators
            .standard
            .send_media_group(first.reply_to, media)
            .await
        {
            Ok(posted) if !posted.is_empty() => posted,
            Ok(_) => {
                warn!(group = %key, "grouped post came back empty; keeping single messages");
                for item in &items {
                    replicator.replicate(&item.message).await;
                }
                return;
            }
            Err(err) => {
                error!(group = %key, items = items.len(), error = %err, "grouped post failed; keeping single messages");
                for item in &items {
                    replicator.replicate(&item.message).await;
                }
                return;
            }
        };

        for item in &items {
            run.links.remove(&item.message.link);
            if let Err(err) = self
                .collaborators
                .standard
                .delete_message(item.message.message_ref())
                .await
            {
                warn!(message = item.message.id, error = %err, "grouped original not deleted");
            }
        }
        if run.links_visible {
            for (message, item) in posted.iter().zip(&items) {
                run.links.insert(message.link.clone(), item.label.clone());
            }
        }
        self.metrics.inc_group_flushed();
        info!(group = %key, items = posted.len(), "grouped post published");
        if let Some(last) = posted.last() {
            run.current = last.message_ref();
            replicator.replicate_group(last).await;
        }
    }

    async fn resolve_destinations(&self, toggles: &EffectiveToggles) -> Result<DestinationSet, String> {
        let origin = self.request.origin;
        let logs = &self.settings.log_destinations;
        let mut placeholders = Vec::with_capacity(logs.len());
        if logs.is_empty() {
            if self.settings.elevated_identity
                && self.identities.has_elevated()
                && !origin.chat.kind.is_broadcast_or_supergroup()
            {
                return Err(SUPERGROUP_REQUIRED_MESSAGE.to_string());
            }
        } else {
            let text = self.start_text();
            for id in logs {
                let placeholder = self
                    .post_placeholder(id, &text)
                    .await
                    .map_err(|err| {
                        error!(destination = %id, error = %err, "job-start placeholder failed");
                        format!("Could not start the upload in {id}: {err}")
                    })?;
                placeholders.push(placeholder);
            }
        }

        let mut placeholders = placeholders.into_iter();
        let primary = placeholders.next().unwrap_or(origin);
        let secondary = placeholders
            .map(|placeholder| LogDestination {
                chat: placeholder.chat,
                placeholder,
            })
            .collect();
        let bot_pm = (toggles.bot_pm
            && (!logs.is_empty() || origin.chat.kind.is_broadcast_or_supergroup()))
        .then(|| BotPmTarget {
            chat: ChatRef::private(self.request.options.owner_id),
            anchor: self.request.pm_anchor.map(|anchor| anchor.id),
        });
        Ok(DestinationSet {
            primary,
            secondary,
            bot_pm,
            dumps: self.request.options.dump_destinations.clone(),
        })
    }

    async fn post_placeholder(
        &self,
        id: &str,
        text: &str,
    ) -> Result<MessageRef, uplink_core::TransportError> {
        let chat = self.collaborators.directory.resolve(id).await?;
        let sent = self.collaborators.standard.send_text(chat, text).await?;
        Ok(sent.message_ref())
    }

    fn start_text(&self) -> String {
        let owner_id = self.request.options.owner_id;
        let label = self
            .request
            .owner_label
            .clone()
            .unwrap_or_else(|| owner_id.to_string());
        format!("Task started\n\nUser: {label}\nID: {owner_id}")
    }

    async fn delete_pending_placeholder(&self, run: &mut JobRun) {
        let Some(placeholder) = run.pending_placeholder.take() else {
            return;
        };
        if let Err(err) = self
            .collaborators
            .standard
            .delete_message(placeholder)
            .await
        {
            warn!(chat = placeholder.chat.id, error = %err, "job-start placeholder not deleted");
        }
    }

    async fn discard(&self, path: &Path, dir: &Path) {
        if self.is_cancelled()
            || !should_remove_after_upload(path, dir, self.request.options.seed)
        {
            return;
        }
        if let Err(err) = remove_if_exists(path).await {
            warn!(path = %path.display(), error = %err, "uploaded file not removed");
        }
    }

    fn record_failure(&self, run: &mut JobRun) {
        run.stats.record_corrupted();
        self.metrics.inc_corrupted();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for UploadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadJob")
            .field("id", &self.id)
            .field("name", &self.request.name)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
