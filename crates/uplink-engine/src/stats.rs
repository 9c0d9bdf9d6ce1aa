//! Per-job counters, throughput, delivered links, and completion gating.

use std::time::Instant;

use uplink_core::{DeliveredLink, UploadProgress};

/// Reported when nothing under the job root was eligible for upload.
pub const NO_FILES_MESSAGE: &str = "No files to upload. If an extension filter is configured, check whether every file matches it.";
/// Reported when every eligible file failed.
pub const ALL_CORRUPTED_MESSAGE: &str = "Files corrupted or unable to upload. Check logs!";
/// Reported once when the owner cancels the job.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user!";

/// File counters threaded through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Files that reached classification, including empty ones.
    pub total_files: u64,
    /// Files that were empty or could not be delivered.
    pub corrupted: u64,
}

/// Final verdict for a job that ran to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// No eligible files were found.
    NoFiles,
    /// Every eligible file was corrupted.
    AllCorrupted,
    /// At least one file was delivered.
    Success,
}

impl Completion {
    /// Error message reported to the owner, if the verdict is a failure.
    #[must_use]
    pub const fn error_message(self) -> Option<&'static str> {
        match self {
            Self::NoFiles => Some(NO_FILES_MESSAGE),
            Self::AllCorrupted => Some(ALL_CORRUPTED_MESSAGE),
            Self::Success => None,
        }
    }
}

impl JobStats {
    /// Count a file that reached classification.
    pub const fn record_file(&mut self) {
        self.total_files += 1;
    }

    /// Count a file that could not be delivered.
    pub const fn record_corrupted(&mut self) {
        self.corrupted += 1;
    }

    /// Gate the job outcome on the counters.
    #[must_use]
    pub const fn completion(&self) -> Completion {
        if self.total_files == 0 {
            Completion::NoFiles
        } else if self.total_files <= self.corrupted {
            Completion::AllCorrupted
        } else {
            Completion::Success
        }
    }
}

/// Bytes-per-second view over the job's shared progress counters.
#[derive(Debug, Clone)]
pub struct Throughput {
    started: Instant,
    progress: UploadProgress,
}

impl Throughput {
    /// Start measuring from now.
    #[must_use]
    pub fn start(progress: UploadProgress) -> Self {
        Self {
            started: Instant::now(),
            progress,
        }
    }

    /// Bytes handed to the transports so far.
    #[must_use]
    pub fn processed_bytes(&self) -> u64 {
        self.progress.processed_bytes()
    }

    /// Average bytes per second since the job started; 0 when no time elapsed.
    #[must_use]
    pub fn speed(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= f64::EPSILON {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let processed = self.processed_bytes() as f64;
        processed / elapsed
    }
}

/// Ordered link to label map reported on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMap {
    entries: Vec<DeliveredLink>,
}

impl LinkMap {
    /// Insert or relabel a link.
    pub fn insert(&mut self, link: impl Into<String>, label: impl Into<String>) {
        let link = link.into();
        let label = label.into();
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.link == link) {
            existing.label = label;
        } else {
            self.entries.push(DeliveredLink { link, label });
        }
    }

    /// Drop a link, returning its label.
    pub fn remove(&mut self, link: &str) -> Option<String> {
        let index = self.entries.iter().position(|entry| entry.link == link)?;
        Some(self.entries.remove(index).label)
    }

    /// Number of links recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no links were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the map into its ordered entries.
    #[must_use]
    pub fn into_links(self) -> Vec<DeliveredLink> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplink_core::CancelFlag;

    #[test]
    fn completion_gates_on_corrupted_count() {
        let all_bad = JobStats {
            total_files: 3,
            corrupted: 3,
        };
        assert_eq!(all_bad.completion(), Completion::AllCorrupted);
        assert_eq!(
            all_bad.completion().error_message(),
            Some(ALL_CORRUPTED_MESSAGE)
        );

        let mostly_bad = JobStats {
            total_files: 3,
            corrupted: 2,
        };
        assert_eq!(mostly_bad.completion(), Completion::Success);
        assert_eq!(mostly_bad.completion().error_message(), None);

        assert_eq!(JobStats::default().completion(), Completion::NoFiles);
    }

    #[test]
    fn link_map_relabels_and_removes() {
        let mut links = LinkMap::default();
        links.insert("https://t.me/c/1/10", "a.part1.mkv");
        links.insert("https://t.me/c/1/11", "a.part2.mkv");
        links.insert("https://t.me/c/1/10", "renamed");
        assert_eq!(links.len(), 2);
        assert_eq!(links.remove("https://t.me/c/1/11").as_deref(), Some("a.part2.mkv"));
        assert_eq!(links.remove("missing"), None);
        let entries = links.into_links();
        assert_eq!(entries[0].label, "renamed");
    }

    #[test]
    fn throughput_reports_processed_bytes() {
        let progress = UploadProgress::new(CancelFlag::new());
        let throughput = Throughput::start(progress.clone());
        progress.begin_file();
        progress.report(4_096);
        assert_eq!(throughput.processed_bytes(), 4_096);
        assert!(throughput.speed() >= 0.0);
    }
}
