//! Subscriber installation for processes embedding the upload engine.
//!
//! # Design
//! - One entry point installs either human-readable or JSON output.
//! - The instance name is fixed at install time and stamped on every job span,
//!   so logs from several uploader processes can be told apart.

use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Filter used when neither `RUST_LOG` nor an explicit filter is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Environment variable selecting `json` or `pretty` output.
pub const LOG_FORMAT_ENV: &str = "UPLINK_LOG_FORMAT";
/// Environment variable naming this uploader instance in logs.
pub const INSTANCE_ENV: &str = "UPLINK_INSTANCE";

const UNNAMED_INSTANCE: &str = "uplink";

static INSTANCE: OnceCell<String> = OnceCell::new();

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty output for debug builds, JSON otherwise.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a format name; unknown names yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// How the subscriber is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Name stamped on every job span.
    pub instance: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::infer(),
            instance: UNNAMED_INSTANCE.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Defaults overridden by [`LOG_FORMAT_ENV`] and [`INSTANCE_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(format) = lookup(LOG_FORMAT_ENV).as_deref().and_then(LogFormat::parse) {
            config.format = format;
        }
        if let Some(instance) = lookup(INSTANCE_ENV).filter(|name| !name.trim().is_empty()) {
            config.instance = instance;
        }
        config
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::SubscriberInstall`] when a global subscriber is
/// already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false).with_current_span(true))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init(),
    };
    installed.map_err(|source| TelemetryError::SubscriberInstall {
        format: config.format,
        source,
    })?;
    if INSTANCE.set(config.instance.clone()).is_err() {
        tracing::debug!("instance name already recorded");
    }
    Ok(())
}

/// Instance name recorded by [`init_logging`].
#[must_use]
pub fn instance_name() -> &'static str {
    INSTANCE.get().map_or(UNNAMED_INSTANCE, String::as_str)
}
