// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context handed to a runner by its init hook.

use async_trait::async_trait;

use crate::error::PluginError;
use crate::types::PluginConfiguration;

/// Host services exposed to one plugin configuration.
#[async_trait]
pub trait PluginContext: Send + Sync + 'static {
    /// The persisted configuration this runner was instantiated for.
    fn configuration(&self) -> &PluginConfiguration;

    /// Ask the host to perform a named service on behalf of the plugin.
    async fn request_service(
        &self,
        service: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError>;
}
