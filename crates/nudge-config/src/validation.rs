// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! parseable backend URLs, bounded intervals, known log levels.

use crate::diagnostic::ConfigError;
use crate::model::NudgeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Longest accepted `engine.tick_interval_secs`.
pub const MAX_TICK_INTERVAL_SECS: u64 = 60 * 60;
/// Longest accepted `engine.scroll_throttle_ms`.
pub const MAX_SCROLL_THROTTLE_MS: u64 = 60 * 1000;
/// Longest accepted `engine.visibility_secs`.
pub const MAX_VISIBILITY_SECS: u64 = 24 * 60 * 60;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of failing fast.
pub fn validate_config(config: &NudgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let engine = &config.engine;

    if let Some(org) = &engine.organization_id
        && org.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "engine.organization_id must not be empty when set",
        ));
    }

    if !LOG_LEVELS.contains(&engine.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(format!(
            "engine.log_level `{}` is not one of {}",
            engine.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let positive = [
        ("engine.tick_interval_secs", engine.tick_interval_secs),
        ("engine.scroll_throttle_ms", engine.scroll_throttle_ms),
        ("engine.visibility_secs", engine.visibility_secs),
        ("engine.handoff_capacity", engine.handoff_capacity as u64),
        ("engine.command_buffer", engine.command_buffer as u64),
        ("backend.timeout_secs", config.backend.timeout_secs),
    ];
    for (key, value) in positive {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{key} must be greater than zero"
            )));
        }
    }

    let bounded = [
        ("engine.tick_interval_secs", engine.tick_interval_secs, MAX_TICK_INTERVAL_SECS),
        ("engine.scroll_throttle_ms", engine.scroll_throttle_ms, MAX_SCROLL_THROTTLE_MS),
        ("engine.visibility_secs", engine.visibility_secs, MAX_VISIBILITY_SECS),
    ];
    for (key, value, max) in bounded {
        if value > max {
            errors.push(ConfigError::validation(format!(
                "{key} must be at most {max}, got {value}"
            )));
        }
    }

    match url::Url::parse(&config.backend.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ConfigError::validation(format!(
            "backend.base_url must use http or https, got `{}`",
            url.scheme()
        ))),
        Err(e) => errors.push(ConfigError::validation(format!(
            "backend.base_url `{}` is not a valid URL: {e}",
            config.backend.base_url
        ))),
    }

    if config.cart.storage_key.trim().is_empty() {
        errors.push(ConfigError::validation("cart.storage_key must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Organization id required to start the engine.
pub fn require_organization(config: &NudgeConfig) -> Result<&str, ConfigError> {
    config
        .engine
        .organization_id
        .as_deref()
        .map(str::trim)
        .filter(|org| !org.is_empty())
        .ok_or(ConfigError::MissingKey {
            key: "engine.organization_id".to_string(),
        })
}
