//! Buffering of consecutive multi-part sends into grouped posts.
//!
//! # Design
//! - The buffer belongs to exactly one job and is never shared, so it is a
//!   plain value with no interior mutability.
//! - Buckets keep insertion order so flushes publish groups in the order
//!   their first part was delivered.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use uplink_core::{InputMedia, MediaKind, MessageRef, SentMessage};

/// Largest grouped post the platform accepts.
pub const MAX_GROUP_SIZE: usize = 10;

// Constant patterns; `None` is unreachable in practice.
static NUMBERED_KEY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(.+)\.0*\d+$").ok());
static PART_KEY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(.+)\.part\d+\..+$").ok());

/// Media kinds that may be grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Video posts.
    Video,
    /// Document posts.
    Document,
}

impl GroupKind {
    /// Group kind for a delivered media kind, if groupable.
    #[must_use]
    pub const fn from_media(kind: MediaKind) -> Option<Self> {
        match kind {
            MediaKind::Video => Some(Self::Video),
            MediaKind::Document => Some(Self::Document),
            MediaKind::Audio | MediaKind::Image => None,
        }
    }
}

/// Group key of a multi-volume file: the path without its volume marker.
#[must_use]
pub fn group_key(path: &str) -> Option<String> {
    [NUMBERED_KEY.as_ref(), PART_KEY.as_ref()]
        .into_iter()
        .flatten()
        .find_map(|pattern| {
            pattern
                .captures(path)
                .and_then(|captures| captures.get(1))
                .map(|base| base.as_str().to_string())
        })
}

/// Group key of `file_name` as if it still sat in the walked directory `dir`,
/// wherever the upload copy actually lives.
#[must_use]
pub fn group_key_in(dir: &Path, file_name: &str) -> Option<String> {
    group_key(&dir.join(file_name).to_string_lossy())
}

/// Delivered message waiting to be grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    /// Message as delivered.
    pub message: SentMessage,
    /// Message the delivered one replied to.
    pub reply_to: MessageRef,
    /// Link-map label of the message.
    pub label: String,
}

impl BufferedMessage {
    /// Reusable media item for a grouped post.
    #[must_use]
    pub fn input_media(&self, kind: GroupKind) -> Option<InputMedia> {
        let media = self.message.media.as_ref()?;
        let file_id = media.file_id.clone();
        let caption = self.message.caption.clone();
        Some(match kind {
            GroupKind::Video => InputMedia::Video { file_id, caption },
            GroupKind::Document => InputMedia::Document { file_id, caption },
        })
    }
}

/// Group ready to be published or a lone message to release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drained {
    /// Two or more messages sharing a key.
    Group {
        /// Kind of every item.
        kind: GroupKind,
        /// Shared key.
        key: String,
        /// Items in delivery order.
        items: Vec<BufferedMessage>,
    },
    /// A bucket that never grew past one message; it stays standalone.
    Single(BufferedMessage),
}

#[derive(Debug)]
struct Bucket {
    kind: GroupKind,
    key: String,
    items: Vec<BufferedMessage>,
}

/// Per-job buffer of messages awaiting grouping.
#[derive(Debug, Default)]
pub struct GroupBuffer {
    buckets: Vec<Bucket>,
}

impl GroupBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether any bucket, of either kind, uses `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.buckets.iter().any(|bucket| bucket.key == key)
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.items.len()).sum()
    }

    /// Append a delivered message; returns a full group once the bucket
    /// reaches [`MAX_GROUP_SIZE`].
    pub fn push(&mut self, kind: GroupKind, key: &str, item: BufferedMessage) -> Option<Drained> {
        let index = match self
            .buckets
            .iter()
            .position(|bucket| bucket.kind == kind && bucket.key == key)
        {
            Some(index) => index,
            None => {
                self.buckets.push(Bucket {
                    kind,
                    key: key.to_string(),
                    items: Vec::new(),
                });
                self.buckets.len() - 1
            }
        };
        self.buckets[index].items.push(item);
        if self.buckets[index].items.len() < MAX_GROUP_SIZE {
            return None;
        }
        let bucket = self.buckets.remove(index);
        Some(Drained::Group {
            kind: bucket.kind,
            key: bucket.key,
            items: bucket.items,
        })
    }

    /// Whether the next file breaks the open sequence and the buffer must drain.
    #[must_use]
    pub fn breaks_on(&self, next_key: Option<&str>) -> bool {
        !self.is_empty() && next_key.is_none_or(|key| !self.contains_key(key))
    }

    /// Empty the buffer, in insertion order.
    pub fn drain(&mut self) -> Vec<Drained> {
        self.buckets
            .drain(..)
            .filter_map(|mut bucket| match bucket.items.len() {
                0 => None,
                1 => bucket.items.pop().map(Drained::Single),
                _ => Some(Drained::Group {
                    kind: bucket.kind,
                    key: bucket.key,
                    items: bucket.items,
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplink_core::{ChatKind, ChatRef, DeliveredMedia};

    fn buffered(id: i64, kind: MediaKind) -> BufferedMessage {
        let chat = ChatRef::new(-100, ChatKind::Supergroup);
        BufferedMessage {
            message: SentMessage {
                chat,
                id,
                link: format!("https://t.me/c/100/{id}"),
                caption: Some(format!("part {id}")),
                markup: None,
                media: Some(DeliveredMedia {
                    kind,
                    file_id: format!("file-{id}"),
                }),
                reply_to: None,
            },
            reply_to: MessageRef { chat, id: 1 },
            label: format!("part {id}"),
        }
    }

    #[test]
    fn group_keys_strip_volume_markers() {
        assert_eq!(group_key("/dl/a.part1.mkv").as_deref(), Some("/dl/a"));
        assert_eq!(group_key("/dl/movie.mkv.001").as_deref(), Some("/dl/movie.mkv"));
        assert_eq!(group_key("/dl/archive.7z.012").as_deref(), Some("/dl/archive.7z"));
        assert_eq!(group_key("/dl/b.mkv"), None);
    }

    #[test]
    fn scratch_copies_share_the_walked_key() {
        let dir = Path::new("/dl");
        assert_eq!(group_key_in(dir, "a.part1.mkv"), group_key_in(dir, "a.part2.avi"));
        assert_eq!(group_key_in(dir, "a.part1.mkv").as_deref(), Some("/dl/a"));
        assert_eq!(group_key_in(dir, "b.mkv"), None);
    }

    #[test]
    fn only_videos_and_documents_group() {
        assert_eq!(GroupKind::from_media(MediaKind::Video), Some(GroupKind::Video));
        assert_eq!(
            GroupKind::from_media(MediaKind::Document),
            Some(GroupKind::Document)
        );
        assert_eq!(GroupKind::from_media(MediaKind::Audio), None);
        assert_eq!(GroupKind::from_media(MediaKind::Image), None);
    }

    #[test]
    fn tenth_item_flushes_the_bucket() {
        let mut buffer = GroupBuffer::new();
        for id in 1..10 {
            assert!(
                buffer
                    .push(GroupKind::Video, "/dl/show", buffered(id, MediaKind::Video))
                    .is_none()
            );
        }
        let full = buffer.push(GroupKind::Video, "/dl/show", buffered(10, MediaKind::Video));
        let Some(Drained::Group { items, .. }) = full else {
            panic!("expected a full group");
        };
        assert_eq!(items.len(), MAX_GROUP_SIZE);
        assert!(buffer.is_empty());
    }

    #[test]
    fn drain_keeps_singles_standalone() {
        let mut buffer = GroupBuffer::new();
        let _ = buffer.push(GroupKind::Video, "/dl/a", buffered(1, MediaKind::Video));
        let _ = buffer.push(GroupKind::Video, "/dl/a", buffered(2, MediaKind::Video));
        let _ = buffer.push(GroupKind::Document, "/dl/c", buffered(3, MediaKind::Document));

        assert!(!buffer.breaks_on(Some("/dl/a")));
        assert!(buffer.breaks_on(Some("/dl/b")));
        assert!(buffer.breaks_on(None));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(&drained[0], Drained::Group { items, .. } if items.len() == 2));
        assert!(matches!(&drained[1], Drained::Single(item) if item.message.id == 3));
        assert!(!buffer.breaks_on(None));
    }

    #[test]
    fn input_media_reuses_file_reference_and_caption() {
        let item = buffered(7, MediaKind::Document);
        assert_eq!(
            item.input_media(GroupKind::Document),
            Some(InputMedia::Document {
                file_id: "file-7".into(),
                caption: Some("part 7".into()),
            })
        );
    }
}
