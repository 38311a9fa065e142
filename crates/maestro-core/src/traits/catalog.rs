// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read access to persisted plugin definitions and configurations.

use async_trait::async_trait;

use crate::error::MaestroError;
use crate::types::{ConfigurationId, PluginConfiguration, PluginDefinition};

/// The store owning plugin definitions and configurations.
///
/// The core reads it at start-up and at registration time. The only write it
/// performs is [`mark_unavailable`](CatalogStore::mark_unavailable).
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// All definitions, available or not.
    async fn definitions(&self) -> Result<Vec<PluginDefinition>, MaestroError>;

    /// A single definition by identifier.
    async fn definition(&self, identifier: &str)
    -> Result<Option<PluginDefinition>, MaestroError>;

    /// Flag a definition as unavailable. This is never reverted by the core.
    async fn mark_unavailable(&self, identifier: &str) -> Result<(), MaestroError>;

    /// Every configuration attached to a definition, regardless of availability.
    async fn configurations_of(
        &self,
        identifier: &str,
    ) -> Result<Vec<PluginConfiguration>, MaestroError>;

    /// Configurations that are available and whose definition is available.
    async fn available_configurations(&self) -> Result<Vec<PluginConfiguration>, MaestroError>;

    /// A single available configuration.
    async fn available_configuration(
        &self,
        id: ConfigurationId,
    ) -> Result<Option<PluginConfiguration>, MaestroError>;
}
