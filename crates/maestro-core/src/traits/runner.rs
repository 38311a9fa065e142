// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The runner contract every plugin implementation satisfies.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PluginError;
use crate::traits::context::PluginContext;
use crate::types::{DataType, EventMessage, FlowType};

/// Static metadata a runner declares before it is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDescriptor {
    /// Must equal the identifier of the definition the runner was created for.
    pub identifier: String,
    pub name: String,
    pub version: semver::Version,
    /// Data types this runner wants to receive as broadcasts.
    pub supported_data_types: HashSet<DataType>,
}

impl StaticDescriptor {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            version: semver::Version::new(0, 1, 0),
            supported_data_types: HashSet::new(),
        }
    }

    pub fn with_data_types<I, T>(mut self, data_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<DataType>,
    {
        self.supported_data_types = data_types.into_iter().map(Into::into).collect();
        self
    }

    /// Data-type membership test used by broadcast dispatch.
    pub fn supports(&self, data_type: &DataType) -> bool {
        self.supported_data_types.contains(data_type)
    }

    /// Resource key of the small plugin image.
    pub fn small_image_key(&self) -> String {
        format!("plugins/{}/small.png", self.identifier)
    }

    /// Resource key of the big plugin image.
    pub fn big_image_key(&self) -> String {
        format!("plugins/{}/big.png", self.identifier)
    }
}

/// Router settings for one direction of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// Number of workers in the router pool. Zero disables the router.
    pub pool_size: usize,
    /// Escalated failures tolerated per worker within `retry_window`.
    pub max_retries: u32,
    pub retry_window: Duration,
}

impl InterfaceConfig {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            max_retries: 10,
            retry_window: Duration::from_secs(60),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_window: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_window = retry_window;
        self
    }
}

/// Optional runtime settings a runner declares for its message interfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerConfigurator {
    pub in_interface: Option<InterfaceConfig>,
    pub out_interface: Option<InterfaceConfig>,
    /// Data types for which the plugin supports object registration.
    pub registration_data_types: HashSet<DataType>,
}

impl RunnerConfigurator {
    /// The interface declared for a direction, if it has at least one worker.
    pub fn interface(&self, flow: FlowType) -> Option<InterfaceConfig> {
        let config = match flow {
            FlowType::In => self.in_interface,
            FlowType::Out => self.out_interface,
        };
        config.filter(|c| c.pool_size > 0)
    }
}

/// A loaded plugin implementation.
///
/// One runner instance is owned by one registration entry for its whole
/// lifetime and is shared with that entry's lifecycle controller and router
/// workers, so every hook takes `&self`.
#[async_trait]
pub trait PluginRunner: Send + Sync + 'static {
    /// Called once, before the plugin is registered.
    async fn init(&self, context: Arc<dyn PluginContext>) -> Result<(), PluginError>;

    async fn start(&self) -> Result<(), PluginError>;

    async fn stop(&self) -> Result<(), PluginError>;

    fn descriptor(&self) -> &StaticDescriptor;

    fn configurator(&self) -> Option<&RunnerConfigurator> {
        None
    }

    /// Handle a message posted on the inbound interface.
    async fn handle_in_message(&self, message: &EventMessage) -> Result<(), PluginError>;

    /// Handle a message posted on the outbound interface.
    async fn handle_out_message(&self, message: &EventMessage) -> Result<(), PluginError>;
}
