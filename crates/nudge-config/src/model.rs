// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Nudge engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Nudge configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NudgeConfig {
    /// Engine timing and identity settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Trigger and event storage API settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Cart snapshot source settings.
    #[serde(default)]
    pub cart: CartConfig,
}

/// Engine timing and identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Organization whose trigger catalog is loaded. Required to run the engine.
    #[serde(default)]
    pub organization_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Cadence of the evaluation tick driving time and cart conditions.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Minimum spacing between two scroll signals.
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u64,

    /// How long a prompt stays visible without visitor action.
    #[serde(default = "default_visibility_secs")]
    pub visibility_secs: u64,

    /// Buffered deliveries on the chat handoff bus.
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,

    /// Buffered host commands before senders wait.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            organization_id: None,
            log_level: default_log_level(),
            tick_interval_secs: default_tick_interval_secs(),
            scroll_throttle_ms: default_scroll_throttle_ms(),
            visibility_secs: default_visibility_secs(),
            handoff_capacity: default_handoff_capacity(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    pub fn visibility(&self) -> Duration {
        Duration::from_secs(self.visibility_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_scroll_throttle_ms() -> u64 {
    100
}

fn default_visibility_secs() -> u64 {
    30
}

fn default_handoff_capacity() -> usize {
    16
}

fn default_command_buffer() -> usize {
    256
}

/// Trigger and event storage API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the storage API; `triggers` and `events` are resolved against it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent on every request. `None` sends no authorization header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api/".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Cart snapshot source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CartConfig {
    /// Key of the cart record in the host's key-value store.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
        }
    }
}

fn default_storage_key() -> String {
    "cart".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_durations_match_engine_cadence() {
        let engine = EngineConfig::default();
        assert_eq!(engine.tick_interval(), Duration::from_secs(5));
        assert_eq!(engine.scroll_throttle(), Duration::from_millis(100));
        assert_eq!(engine.visibility(), Duration::from_secs(30));
    }

    #[test]
    fn partial_section_fills_remaining_defaults() {
        let config: NudgeConfig = toml::from_str(
            r#"
[engine]
organization_id = "org-1"
visibility_secs = 10
"#,
        )
        .unwrap();
        assert_eq!(config.engine.organization_id.as_deref(), Some("org-1"));
        assert_eq!(config.engine.visibility_secs, 10);
        assert_eq!(config.engine.tick_interval_secs, 5);
        assert_eq!(config.cart.storage_key, "cart");
    }

    #[test]
    fn unknown_cart_key_is_rejected() {
        let result = toml::from_str::<NudgeConfig>(
            r#"
[cart]
storage_kye = "basket"
"#,
        );
        assert!(result.is_err());
    }
}
