// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Maestro plugin orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Maestro configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MaestroConfig {
    /// Plugin manager runtime settings.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Plugin log persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Plugin definitions known to the catalog.
    #[serde(default)]
    pub definitions: Vec<DefinitionConfig>,

    /// Named plugin configurations instantiating the definitions.
    #[serde(default)]
    pub configurations: Vec<PluginConfigurationConfig>,
}

/// Plugin manager runtime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long the router liveness probe waits before assuming a router
    /// is still running.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound on waiting for plugins to report STOPPED during shutdown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Capacity of each lifecycle controller's command queue.
    #[serde(default = "default_lifecycle_mailbox")]
    pub lifecycle_mailbox: usize,

    /// Capacity of each router worker's message queue.
    #[serde(default = "default_router_mailbox")]
    pub router_mailbox: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            probe_timeout_ms: default_probe_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            lifecycle_mailbox: default_lifecycle_mailbox(),
            router_mailbox: default_router_mailbox(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

fn default_lifecycle_mailbox() -> usize {
    16
}

fn default_router_mailbox() -> usize {
    1024
}

/// Plugin log persistence settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database holding the plugin log.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Persist the plugin log. When disabled, entries are kept in memory.
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            audit_enabled: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("maestro").join("maestro.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("maestro.db"))
        .display()
        .to_string()
}

fn default_true() -> bool {
    true
}

/// A plugin definition entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionConfig {
    /// Identifier the runner implementation is registered under.
    pub identifier: String,

    /// Reference to the implementation, as reported by the extension loader.
    #[serde(default)]
    pub implementation: String,

    /// Whether the definition may be instantiated.
    #[serde(default = "default_true")]
    pub available: bool,
}

/// A named plugin configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfigurationConfig {
    /// Numeric handle used for every manager operation.
    pub id: u64,

    /// Display name of the configuration.
    pub name: String,

    /// Identifier of the definition this configuration instantiates.
    pub definition: String,

    /// Start the plugin as soon as the manager is up.
    #[serde(default)]
    pub autostart: bool,

    /// Whether the configuration may be registered.
    #[serde(default = "default_true")]
    pub available: bool,

    /// Free-form settings handed to the runner through its context.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}
