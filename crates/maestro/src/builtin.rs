// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runners compiled into the binary.
//!
//! A definition opts into the built-in log runner by setting its
//! `implementation` to `builtin:log`, optionally followed by the data types it
//! subscribes to: `builtin:log:ticket,comment`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use maestro_config::MaestroConfig;
use maestro_core::{
    EventMessage, FlowType, InterfaceConfig, PluginConfiguration, PluginContext, PluginError,
    PluginRunner, RunnerConfigurator, StaticDescriptor,
};
use maestro_plugin::RunnerRegistry;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const LOG_IMPLEMENTATION: &str = "builtin:log";

/// Data types the log runner subscribes to when none are listed.
const DEFAULT_DATA_TYPES: &[&str] = &["ticket"];

/// Builds the runner registry from the configured definitions.
///
/// Definitions pointing at an unknown implementation are left out; the
/// manager marks them unavailable at start-up.
pub fn builtin_registry(config: &MaestroConfig) -> RunnerRegistry {
    let mut registry = RunnerRegistry::new();
    for definition in &config.definitions {
        let Some(data_types) = log_data_types(&definition.implementation) else {
            debug!(
                identifier = %definition.identifier,
                implementation = %definition.implementation,
                "no built-in runner for implementation"
            );
            continue;
        };
        let descriptor = StaticDescriptor::new(
            definition.identifier.clone(),
            format!("Log ({})", definition.identifier),
        )
        .with_data_types(data_types.iter().map(String::as_str));
        registry.register(definition.identifier.clone(), move || {
            Arc::new(LogRunner::new(descriptor.clone())) as Arc<dyn PluginRunner>
        });
    }
    info!(count = registry.len(), "built-in runners loaded");
    registry
}

fn log_data_types(implementation: &str) -> Option<Vec<String>> {
    let rest = implementation.strip_prefix(LOG_IMPLEMENTATION)?;
    if rest.is_empty() {
        return Some(DEFAULT_DATA_TYPES.iter().map(|s| s.to_string()).collect());
    }
    let list = rest.strip_prefix(':')?;
    Some(
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Writes every event it receives to the log.
pub struct LogRunner {
    descriptor: StaticDescriptor,
    configurator: RunnerConfigurator,
    configuration: OnceCell<PluginConfiguration>,
    handled: AtomicU64,
}

impl LogRunner {
    pub fn new(descriptor: StaticDescriptor) -> Self {
        Self {
            descriptor,
            configurator: RunnerConfigurator {
                in_interface: Some(InterfaceConfig::new(1)),
                out_interface: Some(InterfaceConfig::new(1)),
                registration_data_types: Default::default(),
            },
            configuration: OnceCell::new(),
            handled: AtomicU64::new(0),
        }
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    fn log(&self, flow: FlowType, message: &EventMessage) {
        self.handled.fetch_add(1, Ordering::Relaxed);
        let plugin = self
            .configuration
            .get()
            .map(|c| c.name.as_str())
            .unwrap_or("-");
        info!(
            plugin,
            %flow,
            transaction_id = %message.transaction_id,
            kind = %message.kind,
            data_type = %message.data_type,
            internal_id = ?message.internal_id,
            external_id = ?message.external_id,
            "event received"
        );
    }
}

#[async_trait]
impl PluginRunner for LogRunner {
    async fn init(&self, context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        self.configuration
            .set(context.configuration().clone())
            .map_err(|_| PluginError::new("log runner initialized twice"))
    }

    async fn start(&self) -> Result<(), PluginError> {
        debug!(identifier = %self.descriptor.identifier, "log runner started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        debug!(
            identifier = %self.descriptor.identifier,
            handled = self.handled(),
            "log runner stopped"
        );
        Ok(())
    }

    fn descriptor(&self) -> &StaticDescriptor {
        &self.descriptor
    }

    fn configurator(&self) -> Option<&RunnerConfigurator> {
        Some(&self.configurator)
    }

    async fn handle_in_message(&self, message: &EventMessage) -> Result<(), PluginError> {
        self.log(FlowType::In, message);
        Ok(())
    }

    async fn handle_out_message(&self, message: &EventMessage) -> Result<(), PluginError> {
        self.log(FlowType::Out, message);
        Ok(())
    }
}
