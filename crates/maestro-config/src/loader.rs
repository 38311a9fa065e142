// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./maestro.toml` > `~/.config/maestro/maestro.toml` > `/etc/maestro/maestro.toml`
//! with environment variable overrides via `MAESTRO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MaestroConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/maestro/maestro.toml";
pub(crate) const LOCAL_CONFIG: &str = "maestro.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/maestro/maestro.toml` (system-wide)
/// 3. `~/.config/maestro/maestro.toml` (user XDG config)
/// 4. `./maestro.toml` (local directory)
/// 5. `MAESTRO_*` environment variables
pub fn load_config() -> Result<MaestroConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<MaestroConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MaestroConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MaestroConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MaestroConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MaestroConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("maestro").join(LOCAL_CONFIG))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider mapping `MAESTRO_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `MAESTRO_MANAGER_PROBE_TIMEOUT_MS` must map to
/// `manager.probe_timeout_ms`.
fn env_provider() -> Env {
    Env::prefixed("MAESTRO_").map(|key| {
        key.as_str()
            .replacen("manager_", "manager.", 1)
            .replacen("storage_", "storage.", 1)
            .into()
    })
}
