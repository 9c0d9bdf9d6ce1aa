//! Error types for transport collaborators.
//!
//! # Design
//! - Variants mirror the failure classes the engine reacts to differently:
//!   rate limiting, malformed media, unreachable destinations, cancellation.
//! - Messages stay constant; context lives in fields.

use std::error::Error;
use std::time::Duration;

use thiserror::Error;

/// Failures raised by a message transport or destination directory.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server asked the client to back off for the given duration.
    #[error("rate limited by server")]
    FloodWait {
        /// Server-specified wait before the next request.
        wait: Duration,
    },
    /// Server rejected the payload as malformed media (bad request class).
    #[error("malformed media rejected by server")]
    MalformedMedia {
        /// Server-provided detail.
        detail: String,
    },
    /// Destination peer identifier is unknown or inaccessible.
    #[error("destination peer invalid")]
    PeerInvalid {
        /// Offending peer identifier.
        peer: String,
    },
    /// Destination channel is invalid or the identity lacks access.
    #[error("destination channel invalid")]
    ChannelInvalid {
        /// Offending channel identifier.
        channel: String,
    },
    /// Edit was a no-op because the content did not change.
    #[error("message not modified")]
    MessageNotModified,
    /// Transfer was aborted because the job was cancelled.
    #[error("transfer cancelled")]
    Cancelled,
    /// Any other transport failure.
    #[error("transport operation failed")]
    Failed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl TransportError {
    /// Wrap an arbitrary failure for the given operation.
    pub fn failed(operation: &'static str, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Failed {
            operation,
            source: source.into(),
        }
    }

    #[must_use]
    /// Whether the error denotes an unreachable or invalid destination.
    pub const fn is_unreachable_destination(&self) -> bool {
        matches!(self, Self::PeerInvalid { .. } | Self::ChannelInvalid { .. })
    }

    #[must_use]
    /// Whether the error is the malformed-media rejection class.
    pub const fn is_malformed_media(&self) -> bool {
        matches!(self, Self::MalformedMedia { .. })
    }

    #[must_use]
    /// Server-requested wait when the error is a rate limit.
    pub const fn flood_wait(&self) -> Option<Duration> {
        match self {
            Self::FloodWait { wait } => Some(*wait),
            _ => None,
        }
    }
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn classification_helpers_match_variants() {
        assert!(
            TransportError::PeerInvalid {
                peer: "-100".into()
            }
            .is_unreachable_destination()
        );
        assert!(
            TransportError::ChannelInvalid {
                channel: "@gone".into()
            }
            .is_unreachable_destination()
        );
        assert!(
            TransportError::MalformedMedia {
                detail: "MEDIA_INVALID".into()
            }
            .is_malformed_media()
        );
        assert_eq!(
            TransportError::FloodWait {
                wait: Duration::from_secs(7)
            }
            .flood_wait(),
            Some(Duration::from_secs(7))
        );
        assert_eq!(TransportError::Cancelled.flood_wait(), None);
    }

    #[test]
    fn failed_preserves_source() {
        let err = TransportError::failed("send_video", io::Error::other("socket closed"));
        assert!(err.source().is_some());
        assert!(!err.is_unreachable_destination());
    }
}
