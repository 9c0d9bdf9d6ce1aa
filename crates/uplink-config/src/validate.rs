//! Validation helpers and parsing utilities for settings documents.

use crate::error::{ConfigError, ConfigResult};
use crate::model::{RetrySettings, UploadSettings};

/// Check a settings snapshot and normalise its extension filter in place.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first field that fails.
pub fn validate_settings(settings: &mut UploadSettings) -> ConfigResult<()> {
    validate_retry(&settings.retry)?;
    settings.extension_filter = normalize_extensions(&settings.extension_filter)?;
    for destination in &settings.log_destinations {
        if destination.trim().is_empty() {
            return Err(ConfigError::invalid(
                "upload",
                "log_destinations",
                Some(destination.clone()),
                "empty",
            ));
        }
    }
    Ok(())
}

pub(crate) fn validate_retry(retry: &RetrySettings) -> ConfigResult<()> {
    if retry.max_attempts == 0 {
        return Err(ConfigError::invalid(
            "retry",
            "max_attempts",
            Some(retry.max_attempts.to_string()),
            "must_be_positive",
        ));
    }
    if retry.multiplier == 0 {
        return Err(ConfigError::invalid(
            "retry",
            "multiplier",
            Some(retry.multiplier.to_string()),
            "must_be_positive",
        ));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(ConfigError::invalid(
            "retry",
            "initial_backoff_ms",
            Some(retry.initial_backoff_ms.to_string()),
            "exceeds_max_backoff",
        ));
    }
    Ok(())
}

/// Lowercase and dot-prefix extension filter entries.
pub(crate) fn normalize_extensions(entries: &[String]) -> ConfigResult<Vec<String>> {
    entries
        .iter()
        .map(|entry| {
            let trimmed = entry.trim().trim_start_matches('.');
            if trimmed.is_empty() {
                return Err(ConfigError::invalid(
                    "upload",
                    "extension_filter",
                    Some(entry.clone()),
                    "empty",
                ));
            }
            Ok(format!(".{}", trimmed.to_lowercase()))
        })
        .collect()
}

pub(crate) fn parse_bool(raw: &str, field: &'static str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            "env",
            field,
            Some(raw.to_string()),
            "not_a_boolean",
        )),
    }
}

pub(crate) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
