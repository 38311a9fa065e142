// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog backed by the `[[definitions]]` and `[[configurations]]` tables of
//! the loaded configuration.
//!
//! Availability flips made by the manager live in memory only; they are
//! rebuilt from the file on the next process start.

use std::collections::BTreeMap;

use async_trait::async_trait;
use maestro_config::MaestroConfig;
use maestro_config::model::PluginConfigurationConfig;
use maestro_core::{
    CatalogStore, ConfigurationId, MaestroError, PluginConfiguration, PluginDefinition,
};
use tokio::sync::RwLock;
use tracing::debug;

/// [`CatalogStore`] over configuration-file entries.
pub struct ConfiguredCatalog {
    definitions: RwLock<BTreeMap<String, PluginDefinition>>,
    configurations: Vec<PluginConfigurationConfig>,
}

impl ConfiguredCatalog {
    pub fn from_config(config: &MaestroConfig) -> Self {
        let definitions = config
            .definitions
            .iter()
            .map(|d| {
                (
                    d.identifier.clone(),
                    PluginDefinition {
                        identifier: d.identifier.clone(),
                        implementation: d.implementation.clone(),
                        is_available: d.available,
                    },
                )
            })
            .collect();

        Self {
            definitions: RwLock::new(definitions),
            configurations: config.configurations.clone(),
        }
    }

    fn materialize(
        entry: &PluginConfigurationConfig,
        definitions: &BTreeMap<String, PluginDefinition>,
    ) -> Option<PluginConfiguration> {
        let definition = definitions.get(&entry.definition)?.clone();
        Some(PluginConfiguration {
            id: ConfigurationId(entry.id),
            name: entry.name.clone(),
            definition,
            is_autostart: entry.autostart,
            is_available: entry.available,
            properties: entry.properties.clone(),
        })
    }
}

#[async_trait]
impl CatalogStore for ConfiguredCatalog {
    async fn definitions(&self) -> Result<Vec<PluginDefinition>, MaestroError> {
        Ok(self.definitions.read().await.values().cloned().collect())
    }

    async fn definition(&self, identifier: &str) -> Result<Option<PluginDefinition>, MaestroError> {
        Ok(self.definitions.read().await.get(identifier).cloned())
    }

    async fn mark_unavailable(&self, identifier: &str) -> Result<(), MaestroError> {
        let mut definitions = self.definitions.write().await;
        let definition = definitions.get_mut(identifier).ok_or_else(|| {
            MaestroError::Config(format!("unknown plugin definition `{identifier}`"))
        })?;
        if definition.is_available {
            debug!(identifier, "definition marked unavailable");
        }
        definition.is_available = false;
        Ok(())
    }

    async fn configurations_of(
        &self,
        identifier: &str,
    ) -> Result<Vec<PluginConfiguration>, MaestroError> {
        let definitions = self.definitions.read().await;
        Ok(self
            .configurations
            .iter()
            .filter(|c| c.definition == identifier)
            .filter_map(|c| Self::materialize(c, &definitions))
            .collect())
    }

    async fn available_configurations(&self) -> Result<Vec<PluginConfiguration>, MaestroError> {
        let definitions = self.definitions.read().await;
        Ok(self
            .configurations
            .iter()
            .filter_map(|c| Self::materialize(c, &definitions))
            .filter(|c| c.is_available && c.definition.is_available)
            .collect())
    }

    async fn available_configuration(
        &self,
        id: ConfigurationId,
    ) -> Result<Option<PluginConfiguration>, MaestroError> {
        let definitions = self.definitions.read().await;
        Ok(self
            .configurations
            .iter()
            .find(|c| c.id == id.0)
            .and_then(|c| Self::materialize(c, &definitions))
            .filter(|c| c.is_available && c.definition.is_available))
    }
}
