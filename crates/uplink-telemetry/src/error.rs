//! Error types for telemetry operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::string::FromUtf8Error;

use prometheus::Error as PrometheusError;
use tracing_subscriber::util::TryInitError;

use crate::init::LogFormat;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Point in a collector's life where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorStage {
    /// Constructing the collector from its options.
    Build,
    /// Adding the collector to the registry.
    Register,
}

/// Errors raised by telemetry helpers.
#[derive(Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    SubscriberInstall {
        /// Format that was being installed.
        format: LogFormat,
        /// Underlying subscriber error.
        source: TryInitError,
    },
    /// An upload counter could not be set up.
    Collector {
        /// Metric name.
        metric: &'static str,
        /// Step that failed.
        stage: CollectorStage,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Text exposition of the registry failed.
    Render {
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Exposition output was not UTF-8.
    RenderUtf8 {
        /// Underlying conversion error.
        source: FromUtf8Error,
    },
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriberInstall { .. } => formatter.write_str("log subscriber already installed"),
            Self::Collector {
                stage: CollectorStage::Build,
                ..
            } => formatter.write_str("upload metric could not be built"),
            Self::Collector {
                stage: CollectorStage::Register,
                ..
            } => formatter.write_str("upload metric could not be registered"),
            Self::Render { .. } => formatter.write_str("metrics exposition failed"),
            Self::RenderUtf8 { .. } => formatter.write_str("metrics exposition was not utf-8"),
        }
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriberInstall { source, .. } => Some(source),
            Self::Collector { source, .. } | Self::Render { source } => Some(source),
            Self::RenderUtf8 { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_errors_name_the_failing_stage() {
        let build = TelemetryError::Collector {
            metric: "files_uploaded_total",
            stage: CollectorStage::Build,
            source: PrometheusError::Msg("bad label".into()),
        };
        let register = TelemetryError::Collector {
            metric: "files_uploaded_total",
            stage: CollectorStage::Register,
            source: PrometheusError::AlreadyReg,
        };
        assert_eq!(build.to_string(), "upload metric could not be built");
        assert_eq!(register.to_string(), "upload metric could not be registered");
        assert!(build.source().is_some());
    }

    #[test]
    fn render_errors_keep_their_source() {
        let invalid = String::from_utf8(vec![0xff]).err();
        let Some(source) = invalid else {
            return;
        };
        let err = TelemetryError::RenderUtf8 { source };
        assert_eq!(err.to_string(), "metrics exposition was not utf-8");
        assert!(err.source().is_some());
    }
}
