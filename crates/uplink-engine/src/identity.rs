//! Network identity selection and the pair of transports behind it.

use std::sync::Arc;

use tracing::info;
use uplink_core::{Identity, MessageTransport};

/// Files strictly larger than this are sent with the elevated identity when available.
pub const ELEVATED_THRESHOLD_BYTES: u64 = 2_097_152_000;

/// Pick the identity that transfers a file of `size` bytes.
#[must_use]
pub const fn select_identity(size: u64, elevated_available: bool) -> Identity {
    if elevated_available && size > ELEVATED_THRESHOLD_BYTES {
        Identity::Elevated
    } else {
        Identity::Standard
    }
}

/// Standard transport plus the optional elevated one.
#[derive(Clone)]
pub struct Identities {
    standard: Arc<dyn MessageTransport>,
    elevated: Option<Arc<dyn MessageTransport>>,
}

impl Identities {
    /// Identities with only the standard transport.
    #[must_use]
    pub fn new(standard: Arc<dyn MessageTransport>) -> Self {
        Self {
            standard,
            elevated: None,
        }
    }

    /// Attach the elevated transport.
    #[must_use]
    pub fn with_elevated(mut self, elevated: Arc<dyn MessageTransport>) -> Self {
        self.elevated = Some(elevated);
        self
    }

    /// Whether an elevated transport is attached.
    #[must_use]
    pub const fn has_elevated(&self) -> bool {
        self.elevated.is_some()
    }

    /// Standard transport.
    #[must_use]
    pub fn standard(&self) -> &Arc<dyn MessageTransport> {
        &self.standard
    }

    /// Transport for `identity`; the standard one when no elevated transport exists.
    #[must_use]
    pub fn get(&self, identity: Identity) -> &Arc<dyn MessageTransport> {
        match (identity, &self.elevated) {
            (Identity::Elevated, Some(elevated)) => elevated,
            _ => &self.standard,
        }
    }

    /// Choose and log the identity for one file.
    #[must_use]
    pub fn select(&self, file: &str, size: u64, elevated_configured: bool) -> Identity {
        let identity = select_identity(size, elevated_configured && self.has_elevated());
        info!(
            file = %file,
            size,
            identity = identity.as_str(),
            oversized = size > ELEVATED_THRESHOLD_BYTES,
            "selected upload identity"
        );
        identity
    }

    /// Abort in-flight transfers on every identity.
    pub fn stop_all(&self) {
        self.standard.stop_transmission();
        if let Some(elevated) = &self.elevated {
            elevated.stop_transmission();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(
            select_identity(ELEVATED_THRESHOLD_BYTES, true),
            Identity::Standard
        );
        assert_eq!(
            select_identity(ELEVATED_THRESHOLD_BYTES + 1, true),
            Identity::Elevated
        );
    }

    #[test]
    fn elevated_requires_availability() {
        assert_eq!(select_identity(u64::MAX, false), Identity::Standard);
        assert_eq!(select_identity(10, true), Identity::Standard);
    }
}
