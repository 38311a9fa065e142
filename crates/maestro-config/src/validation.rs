// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive timeouts, unique identifiers, and definition references.

use std::collections::HashSet;

use crate::diagnostic::{ConfigError, suggest_key};
use crate::model::MaestroConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MaestroConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let manager = &config.manager;
    if !LOG_LEVELS.contains(&manager.log_level.as_str()) {
        fail(format!(
            "manager.log_level `{}` is not one of {}",
            manager.log_level,
            LOG_LEVELS.join(", ")
        ));
    }
    if manager.probe_timeout_ms == 0 {
        fail("manager.probe_timeout_ms must be greater than 0".to_string());
    }
    if manager.shutdown_timeout_ms == 0 {
        fail("manager.shutdown_timeout_ms must be greater than 0".to_string());
    }
    if manager.lifecycle_mailbox == 0 {
        fail("manager.lifecycle_mailbox must be greater than 0".to_string());
    }
    if manager.router_mailbox == 0 {
        fail("manager.router_mailbox must be greater than 0".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let mut identifiers = HashSet::new();
    for (i, definition) in config.definitions.iter().enumerate() {
        if definition.identifier.trim().is_empty() {
            fail(format!("definitions[{i}].identifier must not be empty"));
        } else if !identifiers.insert(definition.identifier.as_str()) {
            fail(format!(
                "duplicate definition identifier `{}` in [[definitions]] array",
                definition.identifier
            ));
        }
    }

    let declared: Vec<&str> = identifiers.iter().copied().collect();
    let mut dangling = Vec::new();
    let mut ids = HashSet::new();
    for (i, plugin) in config.configurations.iter().enumerate() {
        if !ids.insert(plugin.id) {
            fail(format!(
                "duplicate configuration id {} in [[configurations]] array",
                plugin.id
            ));
        }
        if plugin.name.trim().is_empty() {
            fail(format!("configurations[{i}].name must not be empty"));
        }
        if !identifiers.contains(plugin.definition.as_str()) {
            dangling.push(ConfigError::UnknownDefinition {
                id: plugin.id,
                definition: plugin.definition.clone(),
                suggestion: suggest_key(&plugin.definition, &declared),
            });
        }
    }
    errors.extend(dangling);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
