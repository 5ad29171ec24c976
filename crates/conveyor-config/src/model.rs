// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Conveyor control plane.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Conveyor configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConveyorConfig {
    /// Gateway HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Store backend settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Worker driver settings.
    #[serde(default)]
    pub driver: DriverConfig,

    /// Worker container environment and skill library.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Session title generator settings.
    #[serde(default)]
    pub titles: TitlesConfig,

    /// Forge webhook channel settings.
    #[serde(default)]
    pub forge: ForgeConfig,
}

/// Gateway HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Store backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "conveyor.db".to_string()
}

/// Which driver shape backs worker endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// One pre-existing worker endpoint shared by all sessions.
    Static,
    /// One local container per session (Docker).
    Docker,
    /// One pod + service per session on a Kubernetes cluster.
    Kube,
}

/// Workspace backing for orchestrated workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStorage {
    /// Pod-local scratch, lost on pod deletion.
    Ephemeral,
    /// Per-session persistent volume claim.
    Persistent,
}

/// Worker driver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Driver shape.
    #[serde(default = "default_driver_kind")]
    pub kind: DriverKind,

    /// Worker URL for the static driver.
    #[serde(default = "default_static_worker_url")]
    pub static_worker_url: String,

    /// Container image for docker/kube workers.
    #[serde(default = "default_worker_image")]
    pub worker_image: String,

    /// Port the worker HTTP API listens on inside the container.
    #[serde(default = "default_worker_port")]
    pub worker_port: u16,

    /// Kubernetes namespace for pods/services/PVCs.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Workspace backing mode for kube workers.
    #[serde(default = "default_workspace_storage")]
    pub workspace_storage: WorkspaceStorage,

    /// Storage class for persistent workspaces. `None` uses the cluster default.
    #[serde(default)]
    pub storage_class: Option<String>,

    /// Pod resource requests/limits.
    #[serde(default = "default_cpu_request")]
    pub cpu_request: String,
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,
    #[serde(default = "default_memory_request")]
    pub memory_request: String,
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// Idle endpoint TTL in seconds; 0 disables the reaper.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    /// Cold-create readiness timeout in seconds.
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,

    /// Host directory holding per-session docker workspace bind mounts.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: default_driver_kind(),
            static_worker_url: default_static_worker_url(),
            worker_image: default_worker_image(),
            worker_port: default_worker_port(),
            namespace: default_namespace(),
            workspace_storage: default_workspace_storage(),
            storage_class: None,
            cpu_request: default_cpu_request(),
            cpu_limit: default_cpu_limit(),
            memory_request: default_memory_request(),
            memory_limit: default_memory_limit(),
            idle_ttl_secs: default_idle_ttl_secs(),
            readiness_timeout_secs: default_readiness_timeout_secs(),
            workspace_root: default_workspace_root(),
        }
    }
}

fn default_driver_kind() -> DriverKind {
    DriverKind::Static
}

fn default_static_worker_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_worker_image() -> String {
    "conveyor-worker:latest".to_string()
}

fn default_worker_port() -> u16 {
    8080
}

fn default_namespace() -> String {
    "conveyor".to_string()
}

fn default_workspace_storage() -> WorkspaceStorage {
    WorkspaceStorage::Ephemeral
}

fn default_cpu_request() -> String {
    "250m".to_string()
}

fn default_cpu_limit() -> String {
    "1".to_string()
}

fn default_memory_request() -> String {
    "256Mi".to_string()
}

fn default_memory_limit() -> String {
    "1Gi".to_string()
}

fn default_idle_ttl_secs() -> u64 {
    1800
}

fn default_readiness_timeout_secs() -> u64 {
    90
}

fn default_workspace_root() -> String {
    "workspaces".to_string()
}

/// Worker container environment and skill library configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Environment variables propagated into every worker container
    /// (credentials, model identifiers).
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Directory holding skill bundles (`<dir>/<name>/...`).
    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,
}

fn default_skills_dir() -> String {
    "skills".to_string()
}

/// Session title generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TitlesConfig {
    /// API key for the title model. `None` disables title generation.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the messages API.
    #[serde(default = "default_titles_base_url")]
    pub base_url: String,

    /// Model identifier used for title generation.
    #[serde(default = "default_titles_model")]
    pub model: String,
}

impl Default for TitlesConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_titles_base_url(),
            model: default_titles_model(),
        }
    }
}

fn default_titles_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_titles_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

/// Forge webhook channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    /// HMAC secret for webhook signature verification. `None` disables the channel.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Token used when posting result comments back to the forge.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Default skills merged into every forge task.
    #[serde(default = "default_forge_skills")]
    pub default_skills: Vec<String>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            api_token: None,
            default_skills: default_forge_skills(),
        }
    }
}

fn default_forge_skills() -> Vec<String> {
    vec!["code-review".to_string()]
}
