// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `maestro plugins` command: lists definitions and their configurations.

use std::fmt::Write as _;
use std::sync::Arc;

use maestro_config::MaestroConfig;
use maestro_core::MaestroError;
use maestro_plugin::{ConfiguredCatalog, MemoryAuditLog, PluginDescriptor, PluginManager};

use crate::builtin::builtin_registry;

/// Prints every configured definition, whether a runner is loaded for it,
/// and the configurations attached to it.
pub async fn run_plugins(config: &MaestroConfig) -> Result<(), MaestroError> {
    let manager = PluginManager::new(
        Arc::new(builtin_registry(config)),
        Arc::new(ConfiguredCatalog::from_config(config)),
        Arc::new(MemoryAuditLog::new()),
    );
    let descriptors = manager.descriptors().await?;
    print!("{}", render(config, &descriptors));
    Ok(())
}

fn render(config: &MaestroConfig, descriptors: &[PluginDescriptor]) -> String {
    let mut out = String::new();
    if config.definitions.is_empty() {
        out.push_str("no plugin definitions configured\n");
        return out;
    }

    for definition in &config.definitions {
        let loaded = descriptors
            .iter()
            .find(|d| d.definition.identifier == definition.identifier);
        let state = match (loaded.is_some(), definition.available) {
            (true, true) => "loaded",
            (true, false) => "loaded, disabled",
            (false, _) => "not loaded",
        };
        let _ = writeln!(out, "{} [{}] ({state})", definition.identifier, definition.implementation);

        if let Some(d) = loaded {
            let mut data_types: Vec<&str> = d
                .descriptor
                .supported_data_types
                .iter()
                .map(|t| t.as_str())
                .collect();
            data_types.sort_unstable();
            let _ = writeln!(
                out,
                "  {} v{}, data types: {}",
                d.descriptor.name,
                d.descriptor.version,
                data_types.join(", ")
            );
        }

        for configuration in config
            .configurations
            .iter()
            .filter(|c| c.definition == definition.identifier)
        {
            let mut flags = Vec::new();
            if configuration.autostart {
                flags.push("autostart");
            }
            if !configuration.available {
                flags.push("disabled");
            }
            let _ = writeln!(
                out,
                "  #{} {}{}",
                configuration.id,
                configuration.name,
                if flags.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", flags.join(", "))
                }
            );
        }
    }
    out
}
