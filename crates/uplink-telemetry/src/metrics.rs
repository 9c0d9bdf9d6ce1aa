//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters an upload job moves: delivered files, retries,
//!   server throttling, fallbacks, groups, and fan-out failures.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{CollectorStage, Result, TelemetryError};

/// Fan-out destination class used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutTarget {
    /// The owner's private chat.
    BotPm,
    /// A secondary log destination.
    Log,
    /// A per-job dump destination.
    Dump,
}

impl FanoutTarget {
    /// Label value recorded on the fan-out counter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BotPm => "bot_pm",
            Self::Log => "log",
            Self::Dump => "dump",
        }
    }
}

/// Prometheus-backed metrics registry shared by upload jobs.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    files_uploaded_total: IntCounterVec,
    files_corrupted_total: IntCounter,
    send_retries_total: IntCounter,
    flood_waits_total: IntCounter,
    document_fallbacks_total: IntCounter,
    groups_flushed_total: IntCounter,
    fanout_failures_total: IntCounterVec,
    bytes_uploaded_total: IntCounter,
    active_jobs: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Jobs currently running.
    pub active_jobs: i64,
    /// Files that could not be delivered.
    pub files_corrupted_total: u64,
    /// Send attempts retried after a failure.
    pub send_retries_total: u64,
    /// Server-imposed waits honoured.
    pub flood_waits_total: u64,
    /// Sends re-routed as documents after malformed-media rejections.
    pub document_fallbacks_total: u64,
    /// Grouped posts flushed.
    pub groups_flushed_total: u64,
    /// Bytes delivered to the platform.
    pub bytes_uploaded_total: u64,
}

fn collector<T>(metric: &'static str, built: prometheus::Result<T>) -> Result<T> {
    built.map_err(|source| TelemetryError::Collector {
        metric,
        stage: CollectorStage::Build,
        source,
    })
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let files_uploaded_total = collector(
            "files_uploaded_total",
            IntCounterVec::new(
                Opts::new("files_uploaded_total", "Files delivered by media kind"),
                &["kind"],
            ),
        )?;
        let files_corrupted_total = collector(
            "files_corrupted_total",
            IntCounter::with_opts(Opts::new(
                "files_corrupted_total",
                "Files skipped as empty or undeliverable",
            )),
        )?;
        let send_retries_total = collector(
            "send_retries_total",
            IntCounter::with_opts(Opts::new(
                "send_retries_total",
                "Send attempts retried after a failure",
            )),
        )?;
        let flood_waits_total = collector(
            "flood_waits_total",
            IntCounter::with_opts(Opts::new(
                "flood_waits_total",
                "Server-imposed waits honoured before resending",
            )),
        )?;
        let document_fallbacks_total = collector(
            "document_fallbacks_total",
            IntCounter::with_opts(Opts::new(
                "document_fallbacks_total",
                "Media sends re-routed as documents",
            )),
        )?;
        let groups_flushed_total = collector(
            "groups_flushed_total",
            IntCounter::with_opts(Opts::new(
                "groups_flushed_total",
                "Grouped posts flushed",
            )),
        )?;
        let fanout_failures_total = collector(
            "fanout_failures_total",
            IntCounterVec::new(
                Opts::new(
                    "fanout_failures_total",
                    "Copies that failed to reach a secondary destination",
                ),
                &["target"],
            ),
        )?;
        let bytes_uploaded_total = collector(
            "bytes_uploaded_total",
            IntCounter::with_opts(Opts::new(
                "bytes_uploaded_total",
                "Bytes delivered to the platform",
            )),
        )?;
        let active_jobs = collector(
            "active_jobs",
            IntGauge::with_opts(Opts::new("active_jobs", "Upload jobs currently running")),
        )?;

        let register = |metric: &'static str, boxed: Box<dyn prometheus::core::Collector>| {
            registry
                .register(boxed)
                .map_err(|source| TelemetryError::Collector {
                    metric,
                    stage: CollectorStage::Register,
                    source,
                })
        };
        register(
            "files_uploaded_total",
            Box::new(files_uploaded_total.clone()),
        )?;
        register(
            "files_corrupted_total",
            Box::new(files_corrupted_total.clone()),
        )?;
        register("send_retries_total", Box::new(send_retries_total.clone()))?;
        register("flood_waits_total", Box::new(flood_waits_total.clone()))?;
        register(
            "document_fallbacks_total",
            Box::new(document_fallbacks_total.clone()),
        )?;
        register(
            "groups_flushed_total",
            Box::new(groups_flushed_total.clone()),
        )?;
        register(
            "fanout_failures_total",
            Box::new(fanout_failures_total.clone()),
        )?;
        register(
            "bytes_uploaded_total",
            Box::new(bytes_uploaded_total.clone()),
        )?;
        register("active_jobs", Box::new(active_jobs.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                files_uploaded_total,
                files_corrupted_total,
                send_retries_total,
                flood_waits_total,
                document_fallbacks_total,
                groups_flushed_total,
                fanout_failures_total,
                bytes_uploaded_total,
                active_jobs,
            }),
        })
    }

    /// Record a delivered file of the given media kind.
    pub fn inc_uploaded(&self, kind: &str, bytes: u64) {
        self.inner
            .files_uploaded_total
            .with_label_values(&[kind])
            .inc();
        self.inner.bytes_uploaded_total.inc_by(bytes);
    }

    /// Record a file counted as corrupted.
    pub fn inc_corrupted(&self) {
        self.inner.files_corrupted_total.inc();
    }

    /// Record a retried send attempt.
    pub fn inc_retry(&self) {
        self.inner.send_retries_total.inc();
    }

    /// Record an honoured flood wait.
    pub fn inc_flood_wait(&self) {
        self.inner.flood_waits_total.inc();
    }

    /// Record a malformed-media fallback to document mode.
    pub fn inc_document_fallback(&self) {
        self.inner.document_fallbacks_total.inc();
    }

    /// Record a flushed group.
    pub fn inc_group_flushed(&self) {
        self.inner.groups_flushed_total.inc();
    }

    /// Record a failed copy to a secondary destination.
    pub fn inc_fanout_failure(&self, target: FanoutTarget) {
        self.inner
            .fanout_failures_total
            .with_label_values(&[target.as_str()])
            .inc();
    }

    /// Mark a job as started.
    pub fn job_started(&self) {
        self.inner.active_jobs.inc();
    }

    /// Mark a job as finished.
    pub fn job_finished(&self) {
        self.inner.active_jobs.dec();
    }

    /// Delivered files of `kind` so far.
    #[must_use]
    pub fn uploaded(&self, kind: &str) -> u64 {
        self.inner
            .files_uploaded_total
            .with_label_values(&[kind])
            .get()
    }

    /// Fan-out failures recorded for `target` so far.
    #[must_use]
    pub fn fanout_failures(&self, target: FanoutTarget) -> u64 {
        self.inner
            .fanout_failures_total
            .with_label_values(&[target.as_str()])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_jobs: self.inner.active_jobs.get(),
            files_corrupted_total: self.inner.files_corrupted_total.get(),
            send_retries_total: self.inner.send_retries_total.get(),
            flood_waits_total: self.inner.flood_waits_total.get(),
            document_fallbacks_total: self.inner.document_fallbacks_total.get(),
            groups_flushed_total: self.inner.groups_flushed_total.get(),
            bytes_uploaded_total: self.inner.bytes_uploaded_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.job_started();
        metrics.inc_uploaded("video", 2_048);
        metrics.inc_uploaded("document", 1_024);
        metrics.inc_corrupted();
        metrics.inc_retry();
        metrics.inc_retry();
        metrics.inc_flood_wait();
        metrics.inc_document_fallback();
        metrics.inc_group_flushed();
        metrics.inc_fanout_failure(FanoutTarget::Dump);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_jobs, 1);
        assert_eq!(snapshot.files_corrupted_total, 1);
        assert_eq!(snapshot.send_retries_total, 2);
        assert_eq!(snapshot.flood_waits_total, 1);
        assert_eq!(snapshot.document_fallbacks_total, 1);
        assert_eq!(snapshot.groups_flushed_total, 1);
        assert_eq!(snapshot.bytes_uploaded_total, 3_072);
        assert_eq!(metrics.uploaded("video"), 1);
        assert_eq!(metrics.fanout_failures(FanoutTarget::Dump), 1);
        assert_eq!(metrics.fanout_failures(FanoutTarget::Log), 0);

        metrics.job_finished();
        assert_eq!(metrics.snapshot().active_jobs, 0);
        Ok(())
    }

    #[test]
    fn render_exposes_registered_collectors() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_uploaded("audio", 10);
        let rendered = metrics.render()?;
        assert!(rendered.contains("files_uploaded_total"));
        assert!(rendered.contains("bytes_uploaded_total"));
        Ok(())
    }
}
