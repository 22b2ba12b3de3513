// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./nudge.toml` > `~/.config/nudge/nudge.toml` > `/etc/nudge/nudge.toml`
//! with environment variable overrides via `NUDGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::NudgeConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/nudge/nudge.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "nudge.toml";

/// Path of the per-user config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nudge").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/nudge/nudge.toml` (system-wide)
/// 3. `~/.config/nudge/nudge.toml` (user XDG config)
/// 4. `./nudge.toml` (local directory)
/// 5. `NUDGE_*` environment variables
pub fn load_config() -> Result<NudgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<NudgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NudgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<NudgeConfig, figment::Error> {
    tracing::debug!(path = %path.display(), "loading config from explicit path");
    Figment::new()
        .merge(Serialized::defaults(NudgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(NudgeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `NUDGE_ENGINE_ORGANIZATION_ID` must map to
/// `engine.organization_id`, not `engine.organization.id`.
fn env_provider() -> Env {
    Env::prefixed("NUDGE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("engine_", "engine.", 1)
            .replacen("backend_", "backend.", 1)
            .replacen("cart_", "cart.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_maps_underscored_keys_to_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("NUDGE_ENGINE_ORGANIZATION_ID", "org-env");
            jail.set_env("NUDGE_BACKEND_API_KEY", "secret");
            jail.set_env("NUDGE_CART_STORAGE_KEY", "basket");

            let config: NudgeConfig = Figment::new()
                .merge(Serialized::defaults(NudgeConfig::default()))
                .merge(env_provider())
                .extract()?;

            assert_eq!(config.engine.organization_id.as_deref(), Some("org-env"));
            assert_eq!(config.backend.api_key.as_deref(), Some("secret"));
            assert_eq!(config.cart.storage_key, "basket");
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
[engine]
organization_id = "org-local"
tick_interval_secs = 2
"#,
            )?;
            let config: NudgeConfig = Figment::new()
                .merge(Serialized::defaults(NudgeConfig::default()))
                .merge(Toml::file(LOCAL_CONFIG_FILE))
                .extract()?;
            assert_eq!(config.engine.organization_id.as_deref(), Some("org-local"));
            assert_eq!(config.engine.tick_interval_secs, 2);
            Ok(())
        });
    }
}
