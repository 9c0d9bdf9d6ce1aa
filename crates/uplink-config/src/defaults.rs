//! Default values for upload settings.
//!
//! # Design
//! - Centralize defaults so serde fallbacks and `Default` impls agree.
//! - Keep time-based defaults explicit (milliseconds) for auditability.

/// Total send attempts per file, including the first one.
pub(crate) const MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry.
pub(crate) const INITIAL_BACKOFF_MS: u64 = 4_000;
/// Upper bound for the delay between two attempts.
pub(crate) const MAX_BACKOFF_MS: u64 = 8_000;
/// Growth factor applied to the delay after each failed attempt.
pub(crate) const BACKOFF_MULTIPLIER: u32 = 2;
/// Pause between two consecutive file uploads.
pub(crate) const PACING_MS: u64 = 1_000;
/// Directory holding persistent per-owner thumbnails.
pub(crate) const THUMBNAIL_DIR: &str = "Thumbnails";

pub(crate) const fn max_attempts() -> u32 {
    MAX_ATTEMPTS
}

pub(crate) const fn initial_backoff_ms() -> u64 {
    INITIAL_BACKOFF_MS
}

pub(crate) const fn max_backoff_ms() -> u64 {
    MAX_BACKOFF_MS
}

pub(crate) const fn backoff_multiplier() -> u32 {
    BACKOFF_MULTIPLIER
}

pub(crate) const fn pacing_ms() -> u64 {
    PACING_MS
}

pub(crate) const fn enabled() -> bool {
    true
}

pub(crate) fn thumbnail_dir() -> std::path::PathBuf {
    std::path::PathBuf::from(THUMBNAIL_DIR)
}
