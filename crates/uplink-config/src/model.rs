//! Typed upload settings and per-job options.
//!
//! # Design
//! - Pure data carriers; parsing lives in `loader.rs`, checks in `validate.rs`.
//! - Process-wide settings and per-job options are separate so a running job
//!   holds an immutable snapshot of both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Retry policy knobs for file sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per file, including the first one.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "defaults::initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the delay between attempts in milliseconds.
    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor applied after each failed attempt.
    #[serde(default = "defaults::backoff_multiplier")]
    pub multiplier: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            initial_backoff_ms: defaults::INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
        }
    }
}

impl RetrySettings {
    #[must_use]
    /// Delay before the first retry.
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    /// Upper bound for the delay between attempts.
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    /// Policy without any waiting, for tests and dry runs.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1,
        }
    }
}

/// Process-wide upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Send every file as a generic document.
    #[serde(default)]
    pub as_document: bool,
    /// Batch consecutive multi-part files into grouped posts.
    #[serde(default)]
    pub media_group: bool,
    /// Attach a media-info button to delivered files.
    #[serde(default)]
    pub media_info: bool,
    /// Copy delivered files into the owner's private chat.
    #[serde(default = "defaults::enabled")]
    pub bot_pm: bool,
    /// Ordered log destinations; the first one anchors the job.
    #[serde(default)]
    pub log_destinations: Vec<String>,
    /// Extensions (dot-prefixed, lowercase) deleted instead of uploaded.
    #[serde(default)]
    pub extension_filter: Vec<String>,
    /// Directory holding persistent `<owner_id>.jpg` thumbnails.
    #[serde(default = "defaults::thumbnail_dir")]
    pub thumbnail_dir: PathBuf,
    /// Whether an elevated identity is configured for oversized files.
    #[serde(default)]
    pub elevated_identity: bool,
    /// Pause between two uploads in milliseconds.
    #[serde(default = "defaults::pacing_ms")]
    pub pacing_ms: u64,
    /// Retry policy for file sends.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            as_document: false,
            media_group: false,
            media_info: false,
            bot_pm: true,
            log_destinations: Vec::new(),
            extension_filter: Vec::new(),
            thumbnail_dir: defaults::thumbnail_dir(),
            elevated_identity: false,
            pacing_ms: defaults::PACING_MS,
            retry: RetrySettings::default(),
        }
    }
}

impl UploadSettings {
    #[must_use]
    /// Pause between two uploads.
    pub const fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    #[must_use]
    /// Location of the persistent thumbnail for `owner_id`.
    pub fn persistent_thumbnail(&self, owner_id: i64) -> PathBuf {
        self.thumbnail_dir.join(format!("{owner_id}.jpg"))
    }

    #[must_use]
    /// Whether `file_name` carries a filtered extension.
    pub fn is_filtered(&self, file_name: &str) -> bool {
        let lowered = file_name.to_lowercase();
        self.extension_filter
            .iter()
            .any(|extension| lowered.ends_with(extension.as_str()))
    }

    #[must_use]
    /// Combine process-wide toggles with the owner's per-job preferences.
    pub fn effective(&self, job: &JobOptions) -> EffectiveToggles {
        let media_info = self.media_info || job.media_info;
        EffectiveToggles {
            as_document: self.as_document || job.as_document,
            media_group: self.media_group || job.media_group,
            media_info,
            screenshots: job.screenshots,
            has_buttons: media_info || job.screenshots > 0,
            bot_pm: self.bot_pm,
        }
    }
}

/// Toggles in force for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveToggles {
    /// Send every file as a document.
    pub as_document: bool,
    /// Group consecutive multi-part files.
    pub media_group: bool,
    /// Publish a media-info page per file.
    pub media_info: bool,
    /// Screenshots to publish per video.
    pub screenshots: u32,
    /// Whether delivered files carry interactive markup.
    pub has_buttons: bool,
    /// Copy delivered files into the owner's private chat.
    pub bot_pm: bool,
}

/// How the job's source files relate to an ongoing seed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    /// Not seeding; files may be renamed and deleted freely.
    #[default]
    Off,
    /// Seeding from the job root; originals must survive the upload.
    PreserveOriginals,
    /// Seeding from a separate directory; the job root is a disposable copy.
    NewDirectory,
}

impl SeedMode {
    #[must_use]
    /// Whether the payload is being seeded.
    pub const fn is_seeding(self) -> bool {
        !matches!(self, Self::Off)
    }

    #[must_use]
    /// Whether files inside `dir` must be copied instead of renamed.
    pub fn preserves(self, dir: &Path) -> bool {
        matches!(self, Self::PreserveOriginals) && !dir.ends_with(SPLIT_DIR_NAME)
    }
}

/// Directory holding split volumes produced for the upload; never seeded from.
pub const SPLIT_DIR_NAME: &str = "splited_files";

/// File already uploaded by an earlier run of the same seed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncedFile {
    /// File name as found on disk.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Per-job options supplied by the job owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Platform user id owning the job.
    pub owner_id: i64,
    /// Owner preference: send every file as a document.
    #[serde(default)]
    pub as_document: bool,
    /// Owner preference: group multi-part files.
    #[serde(default)]
    pub media_group: bool,
    /// Owner preference: publish media-info pages.
    #[serde(default)]
    pub media_info: bool,
    /// Screenshots to publish per video (0 disables).
    #[serde(default)]
    pub screenshots: u32,
    /// Extra destinations receiving a copy of every delivered file.
    #[serde(default)]
    pub dump_destinations: Vec<String>,
    /// Custom thumbnail link or URL.
    #[serde(default)]
    pub custom_thumbnail: Option<String>,
    /// Attachment merged into `.mkv` containers.
    #[serde(default)]
    pub attachment: Option<String>,
    /// Seeding relationship of the source files.
    #[serde(default)]
    pub seed: SeedMode,
    /// Files already uploaded by an earlier run; skipped when seeding.
    #[serde(default)]
    pub synced_files: Vec<SyncedFile>,
}

impl JobOptions {
    #[must_use]
    /// Parse a space-separated dump destination list.
    pub fn parse_dump_list(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[must_use]
    /// Builder-style setter for the dump destination list.
    pub fn with_dump_list(mut self, raw: &str) -> Self {
        self.dump_destinations = Self::parse_dump_list(raw);
        self
    }
}
