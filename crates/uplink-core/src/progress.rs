//! Shared transfer counters and the per-job cancellation flag.
//!
//! # Design
//! - Both types are cheap clones over an `Arc` so transports on either
//!   identity can report into the same job without locking.
//! - The cancellation flag is write-once: it can only move from unset to set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Write-once cancellation flag shared by every stage of a job.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    #[must_use]
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag; returns `true` when this call performed the transition.
    pub fn cancel(&self) -> bool {
        !self.inner.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ProgressInner {
    processed: AtomicU64,
    last_reported: AtomicU64,
}

/// Byte counter transports report into while a file is in flight.
#[derive(Debug, Clone)]
pub struct UploadProgress {
    inner: Arc<ProgressInner>,
    cancel: CancelFlag,
}

impl UploadProgress {
    #[must_use]
    /// Create a counter bound to the job's cancellation flag.
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            inner: Arc::new(ProgressInner::default()),
            cancel,
        }
    }

    /// Reset the per-file position before a new transfer starts.
    pub fn begin_file(&self) {
        self.inner.last_reported.store(0, Ordering::SeqCst);
    }

    /// Record that `current` bytes of the in-flight file have been sent.
    ///
    /// Returns `false` once the job is cancelled; transports must then abort
    /// the transfer.
    pub fn report(&self, current: u64) -> bool {
        let previous = self.inner.last_reported.swap(current, Ordering::SeqCst);
        self.inner
            .processed
            .fetch_add(current.saturating_sub(previous), Ordering::SeqCst);
        !self.cancel.is_cancelled()
    }

    #[must_use]
    /// Total bytes sent across every file of the job.
    pub fn processed_bytes(&self) -> u64 {
        self.inner.processed.load(Ordering::SeqCst)
    }

    #[must_use]
    /// Cancellation flag the counter observes.
    pub const fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_write_once() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.cancel());
        assert!(!flag.cancel());
        assert!(flag.clone().is_cancelled());
    }

    #[test]
    fn progress_accumulates_deltas_across_files() {
        let progress = UploadProgress::new(CancelFlag::new());
        progress.begin_file();
        assert!(progress.report(100));
        assert!(progress.report(250));
        progress.begin_file();
        assert!(progress.report(50));
        assert_eq!(progress.processed_bytes(), 300);
    }

    #[test]
    fn progress_signals_abort_after_cancel() {
        let cancel = CancelFlag::new();
        let progress = UploadProgress::new(cancel.clone());
        cancel.cancel();
        assert!(!progress.report(10));
        assert_eq!(progress.processed_bytes(), 10);
    }
}
