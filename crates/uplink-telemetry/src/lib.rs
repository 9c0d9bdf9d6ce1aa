#![forbid(unsafe_code)]
#![warn(missing_docs, unreachable_pub)]

//! Logging and metrics primitives for the upload engine.
//!
//! Layout: `init.rs` (subscriber installation), `metrics.rs` (Prometheus
//! registry), `context.rs` (job spans), `error.rs` (error types).

pub mod context;
pub mod error;
pub mod init;
pub mod metrics;

pub use context::{job_span, record_identity};
pub use error::{CollectorStage, Result, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, INSTANCE_ENV, LOG_FORMAT_ENV, LogFormat, LoggingConfig, init_logging,
    instance_name,
};
pub use metrics::{FanoutTarget, Metrics, MetricsSnapshot};
