//! Recording message transport with scripted failures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uplink_core::{
    AudioUpload, ChatRef, CopyRequest, DeliveredMedia, DocumentUpload, InputMedia, MediaKind,
    MessageRef, MessageTransport, PhotoUpload, ReplyMarkup, SentMessage, TransportError,
    TransportResult, UploadCommon, VideoUpload,
};

/// Transport operation a failure can be scripted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `send_text`.
    Text,
    /// `send_document`.
    Document,
    /// `send_video`.
    Video,
    /// `send_audio`.
    Audio,
    /// `send_photo`.
    Photo,
    /// `send_media_group`.
    MediaGroup,
    /// `copy_message`.
    Copy,
    /// `copy_media_group`.
    CopyGroup,
}

/// Failure returned by a scripted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Rate limit with the given wait.
    FloodWait(Duration),
    /// Malformed media rejection.
    Malformed,
    /// Unknown peer.
    PeerInvalid,
    /// Generic failure.
    Failed,
}

impl Failure {
    fn into_error(self, op: Op) -> TransportError {
        match self {
            Self::FloodWait(wait) => TransportError::FloodWait { wait },
            Self::Malformed => TransportError::MalformedMedia {
                detail: format!("{op:?} rejected"),
            },
            Self::PeerInvalid => TransportError::PeerInvalid {
                peer: format!("{op:?}"),
            },
            Self::Failed => TransportError::failed("fake", std::io::Error::other("scripted failure")),
        }
    }
}

/// One file upload as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    /// Method used.
    pub kind: MediaKind,
    /// Uploaded file name.
    pub file_name: String,
    /// Chat uploaded into.
    pub chat: i64,
    /// Message replied to.
    pub reply_to: i64,
    /// Caption sent.
    pub caption: String,
    /// Thumbnail passed along.
    pub thumbnail: Option<PathBuf>,
    /// Whether markup was attached.
    pub has_markup: bool,
    /// Video dimensions.
    pub dimensions: Option<(u32, u32)>,
}

/// Successful call recorded by [`FakeTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Text message.
    Text {
        /// Target chat.
        chat: i64,
        /// Body.
        text: String,
    },
    /// File upload.
    Upload(UploadCall),
    /// Grouped post.
    MediaGroup {
        /// Target chat.
        chat: i64,
        /// Message replied to.
        reply_to: i64,
        /// Number of items.
        items: usize,
    },
    /// Single copy.
    Copy {
        /// Destination chat.
        to: i64,
        /// Source message id.
        from: i64,
        /// Reply anchor in the destination.
        reply_to: Option<i64>,
        /// Whether markup was attached to the copy.
        has_markup: bool,
    },
    /// Grouped copy.
    CopyGroup {
        /// Destination chat.
        to: i64,
        /// Source message id.
        from: i64,
    },
    /// Markup edit.
    EditMarkup {
        /// Chat of the edited message.
        chat: i64,
        /// Edited message.
        id: i64,
    },
    /// Deletion.
    Delete {
        /// Chat of the deleted message.
        chat: i64,
        /// Deleted message.
        id: i64,
    },
}

type UploadHook = Arc<dyn Fn(&UploadCall) + Send + Sync>;

#[derive(Default)]
struct State {
    calls: Vec<(usize, Call)>,
    failed: Vec<(usize, Op)>,
    scripted: HashMap<(usize, Op), VecDeque<Failure>>,
    failing_chats: HashSet<i64>,
    messages: HashMap<(i64, i64), SentMessage>,
    groups: Vec<Vec<(i64, i64)>>,
}

struct Shared {
    state: Mutex<State>,
    next_id: AtomicI64,
    transports: AtomicUsize,
    hook: Mutex<Option<UploadHook>>,
}

/// In-memory [`MessageTransport`] that records every call.
///
/// Siblings created with [`FakeTransport::sibling`] share messages, ids, and
/// scripted copy failures, the way two identities share one platform.
pub struct FakeTransport {
    shared: Arc<Shared>,
    index: usize,
    stops: AtomicUsize,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    /// Transport whose message ids start at 100.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(100)
    }

    /// Transport whose message ids start at `first_id`.
    #[must_use]
    pub fn starting_at(first_id: i64) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                next_id: AtomicI64::new(first_id),
                transports: AtomicUsize::new(1),
                hook: Mutex::new(None),
            }),
            index: 0,
            stops: AtomicUsize::new(0),
        }
    }

    /// Second identity on the same fake platform.
    #[must_use]
    pub fn sibling(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            index: self.shared.transports.fetch_add(1, Ordering::SeqCst),
            stops: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) {
        self.state().calls.push((self.index, call));
    }

    /// Fail the next call of `op` on this transport with `failure`; calls queue in order.
    pub fn fail_next(&self, op: Op, failure: Failure) {
        self.state()
            .scripted
            .entry((self.index, op))
            .or_default()
            .push_back(failure);
    }

    /// Fail every copy into `chat`.
    pub fn fail_copies_to(&self, chat: i64) {
        self.state().failing_chats.insert(chat);
    }

    /// Run `hook` whenever an upload starts on any sibling, before progress is reported.
    pub fn on_upload(&self, hook: impl Fn(&UploadCall) + Send + Sync + 'static) {
        *self
            .shared
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Every successful call made through this transport, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|(index, _)| *index == self.index)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Every scripted failure that fired on this transport, in order.
    #[must_use]
    pub fn failures(&self) -> Vec<Op> {
        self.state()
            .failed
            .iter()
            .filter(|(index, _)| *index == self.index)
            .map(|(_, op)| *op)
            .collect()
    }

    /// Successful uploads, in order.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadCall> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Upload(upload) => Some(upload),
                _ => None,
            })
            .collect()
    }

    /// Successful copies (single and grouped) into `chat`.
    #[must_use]
    pub fn copies_to(&self, chat: i64) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(call, Call::Copy { to, .. } | Call::CopyGroup { to, .. } if *to == chat)
            })
            .count()
    }

    /// Successful grouped posts, as item counts.
    #[must_use]
    pub fn media_groups(&self) -> Vec<usize> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                Call::MediaGroup { items, .. } => Some(*items),
                _ => None,
            })
            .collect()
    }

    /// Deleted messages as `(chat, id)` pairs.
    #[must_use]
    pub fn deleted(&self) -> Vec<(i64, i64)> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                Call::Delete { chat, id } => Some((*chat, *id)),
                _ => None,
            })
            .collect()
    }

    /// Whether the message still exists on the fake platform.
    #[must_use]
    pub fn exists(&self, chat: i64, id: i64) -> bool {
        self.state().messages.contains_key(&(chat, id))
    }

    /// How often `stop_transmission` was called on this transport.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn scripted(&self, op: Op) -> TransportResult<()> {
        let mut state = self.state();
        let Some(failure) = state
            .scripted
            .get_mut(&(self.index, op))
            .and_then(VecDeque::pop_front)
        else {
            return Ok(());
        };
        state.failed.push((self.index, op));
        Err(failure.into_error(op))
    }

    fn allocate(&self) -> i64 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn store(&self, message: SentMessage) -> SentMessage {
        self.state()
            .messages
            .insert((message.chat.id, message.id), message.clone());
        message
    }

    fn message(
        &self,
        chat: ChatRef,
        caption: Option<String>,
        markup: Option<ReplyMarkup>,
        media: Option<DeliveredMedia>,
        reply_to: Option<MessageRef>,
    ) -> SentMessage {
        let id = self.allocate();
        self.store(SentMessage {
            chat,
            id,
            link: link(chat.id, id),
            caption,
            markup,
            media,
            reply_to,
        })
    }

    async fn upload(
        &self,
        op: Op,
        kind: MediaKind,
        common: UploadCommon,
        dimensions: Option<(u32, u32)>,
    ) -> TransportResult<SentMessage> {
        let call = UploadCall {
            kind,
            file_name: file_name(&common.path),
            chat: common.reply_to.chat.id,
            reply_to: common.reply_to.id,
            caption: common.caption.clone(),
            thumbnail: common.thumbnail.clone(),
            has_markup: common.markup.is_some(),
            dimensions,
        };
        let hook = self
            .shared
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(&call);
        }
        self.scripted(op)?;
        let bytes = tokio::fs::metadata(&common.path)
            .await
            .map_err(|err| TransportError::failed("fake.metadata", err))?
            .len();
        if !common.progress.report(bytes) {
            return Err(TransportError::Cancelled);
        }
        let message = self.message(
            common.reply_to.chat,
            Some(common.caption),
            common.markup,
            None,
            Some(common.reply_to),
        );
        let message = self.store(SentMessage {
            media: Some(DeliveredMedia {
                kind,
                file_id: format!("file-{}", message.id),
            }),
            ..message
        });
        self.record(Call::Upload(call));
        Ok(message)
    }

    fn source(&self, from: MessageRef) -> TransportResult<SentMessage> {
        self.state()
            .messages
            .get(&(from.chat.id, from.id))
            .cloned()
            .ok_or_else(|| {
                TransportError::failed("fake.copy", std::io::Error::other("unknown message"))
            })
    }

    fn check_chat(&self, chat: i64) -> TransportResult<()> {
        if self.state().failing_chats.contains(&chat) {
            return Err(TransportError::ChannelInvalid {
                channel: chat.to_string(),
            });
        }
        Ok(())
    }
}

fn link(chat: i64, id: i64) -> String {
    format!("https://t.me/c/{}/{id}", chat.unsigned_abs())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl MessageTransport for FakeTransport {
    async fn send_text(&self, chat: ChatRef, text: &str) -> TransportResult<SentMessage> {
        self.scripted(Op::Text)?;
        let message = self.message(chat, Some(text.to_string()), None, None, None);
        self.record(Call::Text {
            chat: chat.id,
            text: text.to_string(),
        });
        Ok(message)
    }

    async fn send_document(&self, upload: DocumentUpload) -> TransportResult<SentMessage> {
        self.upload(Op::Document, MediaKind::Document, upload.common, None)
            .await
    }

    async fn send_video(&self, upload: VideoUpload) -> TransportResult<SentMessage> {
        let dimensions = Some((upload.width, upload.height));
        self.upload(Op::Video, MediaKind::Video, upload.common, dimensions)
            .await
    }

    async fn send_audio(&self, upload: AudioUpload) -> TransportResult<SentMessage> {
        self.upload(Op::Audio, MediaKind::Audio, upload.common, None)
            .await
    }

    async fn send_photo(&self, upload: PhotoUpload) -> TransportResult<SentMessage> {
        self.upload(Op::Photo, MediaKind::Image, upload.common, None)
            .await
    }

    async fn send_media_group(
        &self,
        reply_to: MessageRef,
        media: Vec<InputMedia>,
    ) -> TransportResult<Vec<SentMessage>> {
        self.scripted(Op::MediaGroup)?;
        let items = media.len();
        let posted: Vec<SentMessage> = media
            .into_iter()
            .map(|item| {
                let (kind, file_id, caption) = match item {
                    InputMedia::Video { file_id, caption } => (MediaKind::Video, file_id, caption),
                    InputMedia::Document { file_id, caption } => {
                        (MediaKind::Document, file_id, caption)
                    }
                };
                self.message(
                    reply_to.chat,
                    caption,
                    None,
                    Some(DeliveredMedia { kind, file_id }),
                    Some(reply_to),
                )
            })
            .collect();
        let mut state = self.state();
        state
            .groups
            .push(posted.iter().map(|message| (message.chat.id, message.id)).collect());
        state.calls.push((
            self.index,
            Call::MediaGroup {
                chat: reply_to.chat.id,
                reply_to: reply_to.id,
                items,
            },
        ));
        Ok(posted)
    }

    async fn copy_message(&self, request: CopyRequest) -> TransportResult<SentMessage> {
        self.scripted(Op::Copy)?;
        self.check_chat(request.to.id)?;
        let source = self.source(request.from)?;
        let reply_to = request.reply_to.map(|id| MessageRef {
            chat: request.to,
            id,
        });
        let has_markup = request.markup.is_some();
        let copy = self.message(
            request.to,
            source.caption,
            request.markup,
            source.media,
            reply_to,
        );
        self.record(Call::Copy {
            to: request.to.id,
            from: request.from.id,
            reply_to: request.reply_to,
            has_markup,
        });
        Ok(copy)
    }

    async fn copy_media_group(
        &self,
        to: ChatRef,
        from: MessageRef,
        reply_to: Option<i64>,
    ) -> TransportResult<Vec<SentMessage>> {
        self.scripted(Op::CopyGroup)?;
        self.check_chat(to.id)?;
        let members = self
            .state()
            .groups
            .iter()
            .find(|group| group.contains(&(from.chat.id, from.id)))
            .cloned()
            .unwrap_or_else(|| vec![(from.chat.id, from.id)]);
        let mut copies = Vec::with_capacity(members.len());
        for (chat, id) in members {
            let source = self.source(MessageRef {
                chat: ChatRef { id: chat, ..from.chat },
                id,
            })?;
            copies.push(self.message(
                to,
                source.caption,
                None,
                source.media,
                reply_to.map(|id| MessageRef { chat: to, id }),
            ));
        }
        self.record(Call::CopyGroup {
            to: to.id,
            from: from.id,
        });
        Ok(copies)
    }

    async fn edit_reply_markup(
        &self,
        message: MessageRef,
        markup: ReplyMarkup,
    ) -> TransportResult<SentMessage> {
        let mut state = self.state();
        let stored = state
            .messages
            .get_mut(&(message.chat.id, message.id))
            .ok_or_else(|| TransportError::failed("fake.edit", std::io::Error::other("unknown message")))?;
        if stored.markup.as_ref() == Some(&markup) {
            return Err(TransportError::MessageNotModified);
        }
        stored.markup = Some(markup);
        let updated = stored.clone();
        state.calls.push((
            self.index,
            Call::EditMarkup {
                chat: message.chat.id,
                id: message.id,
            },
        ));
        Ok(updated)
    }

    async fn delete_message(&self, message: MessageRef) -> TransportResult<()> {
        let mut state = self.state();
        state.messages.remove(&(message.chat.id, message.id));
        state.calls.push((
            self.index,
            Call::Delete {
                chat: message.chat.id,
                id: message.id,
            },
        ));
        Ok(())
    }

    fn stop_transmission(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplink_core::{CancelFlag, ChatKind, UploadProgress};

    fn common(path: PathBuf, progress: UploadProgress) -> UploadCommon {
        UploadCommon {
            path,
            reply_to: MessageRef {
                chat: ChatRef::new(-1001, ChatKind::Supergroup),
                id: 1,
            },
            caption: "clip".into(),
            thumbnail: None,
            markup: None,
            progress,
        }
    }

    #[tokio::test]
    async fn scripted_failures_fire_once_in_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.mkv");
        std::fs::write(&path, b"video")?;
        let transport = FakeTransport::new();
        transport.fail_next(Op::Video, Failure::Malformed);
        let progress = UploadProgress::new(CancelFlag::new());

        let first = transport
            .send_video(VideoUpload {
                common: common(path.clone(), progress.clone()),
                duration: 1,
                width: 1,
                height: 1,
            })
            .await;
        assert!(first.is_err_and(|err| err.is_malformed_media()));

        let second = transport
            .send_video(VideoUpload {
                common: common(path, progress.clone()),
                duration: 1,
                width: 1,
                height: 1,
            })
            .await?;
        assert_eq!(second.media_kind(), Some(MediaKind::Video));
        assert_eq!(transport.failures(), vec![Op::Video]);
        assert_eq!(transport.uploads().len(), 1);
        assert_eq!(progress.processed_bytes(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn copies_into_failing_chats_are_rejected() -> anyhow::Result<()> {
        let transport = FakeTransport::new();
        let chat = ChatRef::new(-1002, ChatKind::Channel);
        let sent = transport.send_text(chat, "hello").await?;
        transport.fail_copies_to(-300);

        let rejected = transport
            .copy_message(CopyRequest {
                to: ChatRef::new(-300, ChatKind::Channel),
                from: sent.message_ref(),
                reply_to: None,
                markup: None,
            })
            .await;
        assert!(rejected.is_err_and(|err| err.is_unreachable_destination()));
        assert_eq!(transport.copies_to(-300), 0);
        Ok(())
    }
}
