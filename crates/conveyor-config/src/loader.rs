// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./conveyor.toml` > `~/.config/conveyor/conveyor.toml`
//! > `/etc/conveyor/conveyor.toml` with environment variable overrides via
//! the `CONVEYOR_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ConveyorConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/conveyor/conveyor.toml` (system-wide)
/// 3. `~/.config/conveyor/conveyor.toml` (user XDG config)
/// 4. `./conveyor.toml` (local directory)
/// 5. `CONVEYOR_*` environment variables
pub fn load_config() -> Result<ConveyorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConveyorConfig::default()))
        .merge(Toml::file("/etc/conveyor/conveyor.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("conveyor/conveyor.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("conveyor.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from inline TOML only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ConveyorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConveyorConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ConveyorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConveyorConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CONVEYOR_DRIVER_STATIC_WORKER_URL` must
/// map to `driver.static_worker_url`, not `driver.static.worker.url`.
fn env_provider() -> Env {
    Env::prefixed("CONVEYOR_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: CONVEYOR_DRIVER_WORKER_IMAGE -> "driver_worker_image"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("store_", "store.", 1)
            .replacen("driver_", "driver.", 1)
            .replacen("worker_", "worker.", 1)
            .replacen("titles_", "titles.", 1)
            .replacen("forge_", "forge.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DriverKind, WorkspaceStorage};

    #[test]
    fn defaults_load_without_any_config() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.driver.kind, DriverKind::Static);
        assert_eq!(config.store.database_path, "conveyor.db");
        assert!(config.titles.api_key.is_none());
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = r#"
            [server]
            port = 9090
            log_level = "debug"

            [driver]
            kind = "kube"
            namespace = "agents"
            workspace_storage = "persistent"
            idle_ttl_secs = 60
        "#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.driver.kind, DriverKind::Kube);
        assert_eq!(config.driver.namespace, "agents");
        assert_eq!(config.driver.workspace_storage, WorkspaceStorage::Persistent);
        assert_eq!(config.driver.idle_ttl_secs, 60);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r#"
            [server]
            prot = 9090
        "#;
        let result = load_config_from_str(toml);
        assert!(result.is_err(), "typo'd key should be rejected");
    }

    #[test]
    fn worker_env_map_round_trips() {
        let toml = r#"
            [worker.env]
            ANTHROPIC_API_KEY = "sk-test"
            MODEL = "claude-sonnet-4-20250514"
        "#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(
            config.worker.env.get("MODEL").map(String::as_str),
            Some("claude-sonnet-4-20250514")
        );
        assert_eq!(config.worker.skills_dir, "skills");
    }

    #[test]
    fn forge_defaults_declare_code_review() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.forge.default_skills, vec!["code-review"]);
        assert!(config.forge.webhook_secret.is_none());
    }
}
