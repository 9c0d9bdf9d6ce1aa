//! Core upload domain types and DTOs shared across the workspace.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::progress::UploadProgress;

/// Media representation a file is delivered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Streamable video with duration and dimensions.
    Video,
    /// Audio track with performer/title metadata.
    Audio,
    /// Still image.
    Image,
    /// Generic document attachment.
    Document,
}

impl MediaKind {
    #[must_use]
    /// Render the kind as its lowercase string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

/// Content traits reported by media introspection.
///
/// A file may be both video and audio (a video with a soundtrack); the
/// delivered kind is derived by [`MediaTraits::kind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTraits {
    /// Content carries a video stream.
    pub video: bool,
    /// Content carries an audio stream.
    pub audio: bool,
    /// Content is a still image.
    pub image: bool,
}

impl MediaTraits {
    #[must_use]
    /// Whether the content is audio without a video stream.
    pub const fn is_audio_only(self) -> bool {
        self.audio && !self.video
    }

    #[must_use]
    /// Derive the delivered kind, honouring forced document mode.
    pub const fn kind(self, force_document: bool) -> MediaKind {
        if force_document {
            MediaKind::Document
        } else if self.video {
            MediaKind::Video
        } else if self.audio {
            MediaKind::Audio
        } else if self.image {
            MediaKind::Image
        } else {
            MediaKind::Document
        }
    }
}

/// Duration and tag metadata extracted from a media file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in whole seconds (0 when unknown).
    pub duration: u64,
    /// Performer tag for audio content.
    pub artist: Option<String>,
    /// Title tag for audio content.
    pub title: Option<String>,
}

/// Kind of chat a message lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// One-to-one conversation with a user or bot.
    Private,
    /// Basic group.
    Group,
    /// Supergroup with public message links.
    Supergroup,
    /// Broadcast channel.
    Channel,
}

impl ChatKind {
    #[must_use]
    /// Whether messages in this chat have shareable links.
    pub const fn is_broadcast_or_supergroup(self) -> bool {
        matches!(self, Self::Supergroup | Self::Channel)
    }
}

/// Concrete chat handle resolved from a destination identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatRef {
    /// Platform chat identifier.
    pub id: i64,
    /// Chat classification.
    pub kind: ChatKind,
}

impl ChatRef {
    #[must_use]
    /// Convenience constructor.
    pub const fn new(id: i64, kind: ChatKind) -> Self {
        Self { id, kind }
    }

    #[must_use]
    /// Private chat with the given user.
    pub const fn private(user_id: i64) -> Self {
        Self {
            id: user_id,
            kind: ChatKind::Private,
        }
    }
}

/// Reference to a message within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat holding the message.
    pub chat: ChatRef,
    /// Message identifier within the chat.
    pub id: i64,
}

/// Single URL button attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlButton {
    /// Visible button label.
    pub label: String,
    /// Target URL.
    pub url: String,
}

/// Interactive markup attached to delivered messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMarkup {
    /// Rows of buttons, rendered top to bottom.
    pub rows: Vec<Vec<UrlButton>>,
}

impl ReplyMarkup {
    #[must_use]
    /// Lay the buttons out one per row.
    pub fn column(buttons: Vec<UrlButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|button| vec![button]).collect(),
        }
    }

    #[must_use]
    /// Whether the markup carries no buttons.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

/// Media payload of a delivered message, reusable for grouped posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMedia {
    /// Kind the platform stored the message as.
    pub kind: MediaKind,
    /// Platform file reference that can be re-sent without re-uploading.
    pub file_id: String,
}

/// Opaque handle to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Chat the message was delivered to.
    pub chat: ChatRef,
    /// Message identifier.
    pub id: i64,
    /// Shareable link to the message.
    pub link: String,
    /// Caption or text body.
    pub caption: Option<String>,
    /// Interactive markup attached to the message.
    pub markup: Option<ReplyMarkup>,
    /// Media payload; `None` for plain text messages.
    pub media: Option<DeliveredMedia>,
    /// Message this one replies to, when any.
    pub reply_to: Option<MessageRef>,
}

impl SentMessage {
    #[must_use]
    /// Reference used to address this message in follow-up calls.
    pub const fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat: self.chat,
            id: self.id,
        }
    }

    #[must_use]
    /// Declared media kind, when the message carries media.
    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media.as_ref().map(|media| media.kind)
    }
}

/// Item of a grouped (multi-item) post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMedia {
    /// Previously uploaded video.
    Video {
        /// Platform file reference.
        file_id: String,
        /// Item caption.
        caption: Option<String>,
    },
    /// Previously uploaded document.
    Document {
        /// Platform file reference.
        file_id: String,
        /// Item caption.
        caption: Option<String>,
    },
}

/// Fields shared by every file upload request.
#[derive(Debug, Clone)]
pub struct UploadCommon {
    /// Local file to transmit.
    pub path: PathBuf,
    /// Message the upload replies to.
    pub reply_to: MessageRef,
    /// Caption shown under the media.
    pub caption: String,
    /// Optional thumbnail image.
    pub thumbnail: Option<PathBuf>,
    /// Optional interactive markup.
    pub markup: Option<ReplyMarkup>,
    /// Shared byte counter the transport reports into.
    pub progress: UploadProgress,
}

/// Document upload request.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Shared upload fields.
    pub common: UploadCommon,
}

/// Video upload request.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    /// Shared upload fields.
    pub common: UploadCommon,
    /// Duration in seconds.
    pub duration: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

/// Audio upload request.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    /// Shared upload fields.
    pub common: UploadCommon,
    /// Duration in seconds.
    pub duration: u64,
    /// Performer tag.
    pub performer: Option<String>,
    /// Title tag.
    pub title: Option<String>,
}

/// Photo upload request.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    /// Shared upload fields.
    pub common: UploadCommon,
}

/// Request to copy an existing message into another chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Destination chat.
    pub to: ChatRef,
    /// Message being copied.
    pub from: MessageRef,
    /// Message id in the destination chat the copy replies to.
    pub reply_to: Option<i64>,
    /// Markup to attach to the copy.
    pub markup: Option<ReplyMarkup>,
}

/// Which of the two network identities performs a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// Default identity, limited to standard-size uploads.
    Standard,
    /// Identity allowed to upload oversized files.
    Elevated,
}

impl Identity {
    #[must_use]
    /// Render the identity as its lowercase string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Elevated => "elevated",
        }
    }
}

/// Source of a user-supplied custom thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThumbnailSource {
    /// Link to a platform message carrying a photo.
    MessageLink {
        /// The message link.
        link: String,
    },
    /// Plain http(s) URL pointing at an image.
    Url {
        /// The image URL.
        url: String,
    },
}

/// Normalised file name and caption produced before sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    /// Collision-safe file name.
    pub file_name: String,
    /// Caption to attach to the delivered message.
    pub caption: String,
}

/// Delivered message link and its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredLink {
    /// Shareable message link.
    pub link: String,
    /// Label shown for the link (file name or caption).
    pub label: String,
}

/// Final outcome reported to the job owner on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Display name of the job.
    pub name: String,
    /// Total payload size in bytes.
    pub size: u64,
    /// Delivered links in delivery order.
    pub links: Vec<DeliveredLink>,
    /// Files that reached classification.
    pub total_files: u64,
    /// Files that could not be delivered.
    pub corrupted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_traits_derive_kind_by_priority() {
        let video = MediaTraits {
            video: true,
            audio: true,
            image: false,
        };
        assert_eq!(video.kind(false), MediaKind::Video);
        assert_eq!(video.kind(true), MediaKind::Document);
        assert!(!video.is_audio_only());

        let audio = MediaTraits {
            audio: true,
            ..MediaTraits::default()
        };
        assert_eq!(audio.kind(false), MediaKind::Audio);
        assert!(audio.is_audio_only());

        assert_eq!(MediaTraits::default().kind(false), MediaKind::Document);
    }

    #[test]
    fn chat_kind_link_visibility() {
        assert!(ChatKind::Channel.is_broadcast_or_supergroup());
        assert!(ChatKind::Supergroup.is_broadcast_or_supergroup());
        assert!(!ChatKind::Private.is_broadcast_or_supergroup());
        assert!(!ChatKind::Group.is_broadcast_or_supergroup());
    }

    #[test]
    fn markup_column_places_each_button_on_its_row() {
        let markup = ReplyMarkup::column(vec![
            UrlButton {
                label: "SCREENSHOTS".into(),
                url: "https://example.test/ss".into(),
            },
            UrlButton {
                label: "MediaInfo".into(),
                url: "https://example.test/mi".into(),
            },
        ]);
        assert_eq!(markup.rows.len(), 2);
        assert!(!markup.is_empty());
        assert!(ReplyMarkup::default().is_empty());
    }

    #[test]
    fn input_media_serialises_with_type_tag() -> Result<(), serde_json::Error> {
        let media = InputMedia::Video {
            file_id: "abc".into(),
            caption: Some("part 1".into()),
        };
        let value = serde_json::to_value(&media)?;
        assert_eq!(value["type"], "video");
        assert_eq!(value["file_id"], "abc");
        Ok(())
    }
}
