//! Filesystem and settings fixtures.

use std::path::{Path, PathBuf};

use anyhow::Result;
use uplink_config::{RetrySettings, UploadSettings};
use uplink_core::{ChatKind, ChatRef, MessageRef};

/// Write `len` bytes into `dir/name`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_file(dir: &Path, name: &str, len: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, vec![b'x'; len])?;
    Ok(path)
}

/// Supergroup chat with the given id.
#[must_use]
pub const fn supergroup(id: i64) -> ChatRef {
    ChatRef::new(id, ChatKind::Supergroup)
}

/// Broadcast channel with the given id.
#[must_use]
pub const fn channel(id: i64) -> ChatRef {
    ChatRef::new(id, ChatKind::Channel)
}

/// Command message a job replies to.
#[must_use]
pub const fn origin_in(chat: ChatRef, id: i64) -> MessageRef {
    MessageRef { chat, id }
}

/// Settings with no pacing, immediate retries and thumbnails under `scratch`.
#[must_use]
pub fn fast_settings(scratch: &Path) -> UploadSettings {
    UploadSettings {
        thumbnail_dir: scratch.join("thumbnails"),
        pacing_ms: 0,
        retry: RetrySettings::immediate(3),
        ..UploadSettings::default()
    }
}
