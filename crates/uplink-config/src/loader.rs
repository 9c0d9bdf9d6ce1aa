//! File and environment backed settings loader.
//!
//! # Design
//! - The JSON document is the base layer; `UPLINK_*` variables override it.
//! - Environment lookups go through a closure so callers (and tests) can
//!   supply their own source without touching process state.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::UploadSettings;
use crate::validate::{parse_bool, parse_list, validate_settings};

/// Environment variable forcing document mode.
pub const ENV_AS_DOCUMENT: &str = "UPLINK_AS_DOCUMENT";
/// Environment variable toggling media grouping.
pub const ENV_MEDIA_GROUP: &str = "UPLINK_MEDIA_GROUP";
/// Environment variable listing log destinations.
pub const ENV_LOG_DESTINATIONS: &str = "UPLINK_LOG_DESTINATIONS";
/// Environment variable listing filtered extensions.
pub const ENV_EXTENSION_FILTER: &str = "UPLINK_EXTENSION_FILTER";
/// Environment variable declaring the elevated identity.
pub const ENV_ELEVATED_IDENTITY: &str = "UPLINK_ELEVATED_IDENTITY";

/// Load settings from a JSON file, apply process environment overrides, and validate.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, an override is
/// malformed, or validation fails.
pub fn load_settings(path: impl AsRef<Path>) -> ConfigResult<UploadSettings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "load_settings.read",
        path: path.to_path_buf(),
        source,
    })?;
    let settings = settings_from_str(&raw)?;
    let mut settings = apply_overrides(settings, |key| std::env::var(key).ok())?;
    validate_settings(&mut settings)?;
    info!(
        path = %path.display(),
        log_destinations = settings.log_destinations.len(),
        media_group = settings.media_group,
        elevated_identity = settings.elevated_identity,
        "upload settings loaded"
    );
    Ok(settings)
}

/// Parse a settings document without applying overrides.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] when the document does not match the schema.
pub fn settings_from_str(raw: &str) -> ConfigResult<UploadSettings> {
    serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
        operation: "settings_from_str",
        source,
    })
}

/// Apply `UPLINK_*` overrides resolved through `lookup`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when a boolean override is malformed.
pub fn apply_overrides<F>(mut settings: UploadSettings, lookup: F) -> ConfigResult<UploadSettings>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_AS_DOCUMENT) {
        settings.as_document = parse_bool(&raw, "as_document")?;
    }
    if let Some(raw) = lookup(ENV_MEDIA_GROUP) {
        settings.media_group = parse_bool(&raw, "media_group")?;
    }
    if let Some(raw) = lookup(ENV_ELEVATED_IDENTITY) {
        settings.elevated_identity = parse_bool(&raw, "elevated_identity")?;
    }
    if let Some(raw) = lookup(ENV_LOG_DESTINATIONS) {
        settings.log_destinations = parse_list(&raw);
    }
    if let Some(raw) = lookup(ENV_EXTENSION_FILTER) {
        settings.extension_filter = parse_list(&raw);
    }
    debug!(?settings, "settings after environment overrides");
    Ok(settings)
}
