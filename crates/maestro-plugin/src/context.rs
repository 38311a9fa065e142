// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host-side implementation of the context handed to runner init hooks.

use std::sync::Arc;

use async_trait::async_trait;
use maestro_core::{ConfigurationId, PluginConfiguration, PluginContext, PluginError};

/// Named services the embedding application exposes to plugins.
#[async_trait]
pub trait HostServices: Send + Sync + 'static {
    async fn call(
        &self,
        configuration_id: ConfigurationId,
        service: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError>;
}

/// Context bound to one plugin configuration.
pub struct HostContext {
    configuration: PluginConfiguration,
    services: Option<Arc<dyn HostServices>>,
}

impl HostContext {
    pub fn new(
        configuration: PluginConfiguration,
        services: Option<Arc<dyn HostServices>>,
    ) -> Self {
        Self {
            configuration,
            services,
        }
    }
}

#[async_trait]
impl PluginContext for HostContext {
    fn configuration(&self) -> &PluginConfiguration {
        &self.configuration
    }

    async fn request_service(
        &self,
        service: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError> {
        match &self.services {
            Some(services) => services.call(self.configuration.id, service, request).await,
            None => Err(PluginError::new(format!(
                "host service `{service}` is not available"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::PluginDefinition;

    struct Echo;

    #[async_trait]
    impl HostServices for Echo {
        async fn call(
            &self,
            configuration_id: ConfigurationId,
            service: &str,
            request: serde_json::Value,
        ) -> Result<serde_json::Value, PluginError> {
            Ok(serde_json::json!({ "plugin": configuration_id.0, "service": service, "echo": request }))
        }
    }

    fn configuration() -> PluginConfiguration {
        PluginConfiguration {
            id: ConfigurationId(9),
            name: "ctx".to_string(),
            definition: PluginDefinition {
                identifier: "echo".to_string(),
                implementation: String::new(),
                is_available: true,
            },
            is_autostart: false,
            is_available: true,
            properties: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn request_without_services_fails() {
        let ctx = HostContext::new(configuration(), None);
        let err = ctx
            .request_service("lookup", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(err.message().contains("lookup"));
    }

    #[tokio::test]
    async fn request_is_forwarded_with_configuration_id() {
        let ctx = HostContext::new(configuration(), Some(Arc::new(Echo)));
        let reply = ctx
            .request_service("lookup", serde_json::json!(1))
            .await
            .unwrap();
        assert_eq!(reply["plugin"], 9);
        assert_eq!(reply["echo"], 1);
        assert_eq!(ctx.configuration().name, "ctx");
    }
}
