//! Error types for the upload engine.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uplink_core::TransportError;

/// Primary error type for upload engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// Walking the job directory failed.
    #[error("directory walk failed")]
    Walk {
        /// Root being walked.
        path: PathBuf,
        /// Source walkdir error.
        #[source]
        source: walkdir::Error,
    },
    /// Every send attempt for a file failed.
    #[error("send retries exhausted")]
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
        /// Failure of the last attempt.
        #[source]
        source: Box<EngineError>,
    },
    /// A transport call failed.
    #[error("transport operation failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Source transport error.
        #[source]
        source: TransportError,
    },
    /// An injected collaborator failed.
    #[error("collaborator operation failed")]
    Collaborator {
        /// Operation identifier.
        operation: &'static str,
        /// Source error reported by the collaborator.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// Decoding or encoding a thumbnail failed.
    #[error("thumbnail processing failed")]
    Thumbnail {
        /// Image involved in the failure.
        path: PathBuf,
        /// Source image error.
        #[source]
        source: image::ImageError,
    },
    /// A blocking task panicked or was aborted.
    #[error("background task failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        #[source]
        source: tokio::task::JoinError,
    },
    /// The job was cancelled by its owner.
    #[error("upload cancelled")]
    Cancelled,
}

impl EngineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(operation: &'static str, source: TransportError) -> Self {
        if matches!(source, TransportError::Cancelled) {
            return Self::Cancelled;
        }
        Self::Transport { operation, source }
    }

    pub(crate) fn collaborator(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Collaborator {
            operation,
            source: source.into(),
        }
    }

    pub(crate) const fn join(operation: &'static str, source: tokio::task::JoinError) -> Self {
        Self::Join { operation, source }
    }

    /// Transport error carried by this failure, if any.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            Self::RetriesExhausted { source, .. } => source.transport_error(),
            _ => None,
        }
    }

    /// Whether the server rejected the media as malformed.
    #[must_use]
    pub fn is_malformed_media(&self) -> bool {
        self.transport_error()
            .is_some_and(TransportError::is_malformed_media)
    }

    /// Whether this failure is the cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transport_cancellation_maps_to_cancelled() {
        let err = EngineError::transport("send_video", TransportError::Cancelled);
        assert!(err.is_cancelled());
    }

    #[test]
    fn malformed_media_is_visible_through_retry_exhaustion() {
        let inner = EngineError::transport(
            "send_video",
            TransportError::MalformedMedia {
                detail: "MEDIA_EMPTY".into(),
            },
        );
        assert!(inner.is_malformed_media());
        let exhausted = EngineError::RetriesExhausted {
            attempts: 3,
            source: Box::new(inner),
        };
        assert!(exhausted.is_malformed_media());
        assert!(exhausted.source().is_some());
    }

    #[test]
    fn flood_wait_is_reachable_from_engine_error() {
        let err = EngineError::transport(
            "send_document",
            TransportError::FloodWait {
                wait: Duration::from_secs(3),
            },
        );
        assert_eq!(
            err.transport_error().and_then(TransportError::flood_wait),
            Some(Duration::from_secs(3))
        );
        assert_eq!(err.to_string(), "transport operation failed");
    }

    #[test]
    fn collaborator_errors_keep_their_source() {
        let err = EngineError::collaborator("classify", anyhow::anyhow!("probe crashed"));
        assert!(err.source().is_some());
    }
}
