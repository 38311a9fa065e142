// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted runner used by this crate's unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use maestro_core::{
    EventMessage, FlowType, InterfaceConfig, MessageKind, PluginContext, PluginError,
    PluginRunner, RunnerConfigurator, StaticDescriptor,
};
use tokio::sync::Mutex;

/// Observations shared by every instance created from one [`ScriptedRunner`].
#[derive(Default)]
pub(crate) struct Tally {
    handled: Mutex<Vec<(FlowType, EventMessage)>>,
    pub inits: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    init_delay_ms: AtomicU64,
}

impl Tally {
    /// Every later init of this runner sleeps for `delay` first.
    pub fn delay_init(&self, delay: Duration) {
        self.init_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn handled(&self) -> Vec<(FlowType, EventMessage)> {
        self.handled.lock().await.clone()
    }

    pub async fn count(&self, kind: MessageKind) -> usize {
        self.handled
            .lock()
            .await
            .iter()
            .filter(|(_, m)| m.kind == kind)
            .count()
    }
}

#[derive(Clone)]
pub(crate) struct ScriptedRunner {
    descriptor: StaticDescriptor,
    configurator: RunnerConfigurator,
    fail_start: bool,
    fail_stop: bool,
    start_delay: Duration,
    failing_kinds: Vec<MessageKind>,
    tally: Arc<Tally>,
}

impl ScriptedRunner {
    pub fn new(identifier: &str) -> Self {
        Self {
            descriptor: StaticDescriptor::new(identifier, format!("{identifier} plugin"))
                .with_data_types(["ticket"]),
            configurator: RunnerConfigurator {
                in_interface: Some(InterfaceConfig::new(1)),
                out_interface: Some(InterfaceConfig::new(1)),
                ..RunnerConfigurator::default()
            },
            fail_start: false,
            fail_stop: false,
            start_delay: Duration::ZERO,
            failing_kinds: Vec::new(),
            tally: Arc::new(Tally::default()),
        }
    }

    pub fn with_data_types(mut self, data_types: &[&str]) -> Self {
        self.descriptor = self.descriptor.with_data_types(data_types.iter().copied());
        self
    }

    pub fn with_interfaces(
        mut self,
        inbound: Option<InterfaceConfig>,
        outbound: Option<InterfaceConfig>,
    ) -> Self {
        self.configurator.in_interface = inbound;
        self.configurator.out_interface = outbound;
        self
    }

    pub fn with_configurator(mut self, configurator: RunnerConfigurator) -> Self {
        self.configurator = configurator;
        self
    }

    pub fn descriptor_identifier(&self) -> String {
        self.descriptor.identifier.clone()
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn slow_start(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Handlers fail for messages of these kinds.
    pub fn failing_on(mut self, kinds: &[MessageKind]) -> Self {
        self.failing_kinds = kinds.to_vec();
        self
    }

    pub fn tally(&self) -> Arc<Tally> {
        Arc::clone(&self.tally)
    }

    pub fn into_runner(self) -> Arc<dyn PluginRunner> {
        Arc::new(self)
    }

    async fn handle(&self, flow: FlowType, message: &EventMessage) -> Result<(), PluginError> {
        self.tally
            .handled
            .lock()
            .await
            .push((flow, message.clone()));
        if self.failing_kinds.contains(&message.kind) {
            return Err(PluginError::new(format!(
                "scripted failure for {}",
                message.kind
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PluginRunner for ScriptedRunner {
    async fn init(&self, _context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        self.tally.inits.fetch_add(1, Ordering::SeqCst);
        let delay = self.tally.init_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), PluginError> {
        self.tally.starts.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start {
            return Err(PluginError::new("scripted start failure"));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        self.tally.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(PluginError::new("scripted stop failure"));
        }
        Ok(())
    }

    fn descriptor(&self) -> &StaticDescriptor {
        &self.descriptor
    }

    fn configurator(&self) -> Option<&RunnerConfigurator> {
        Some(&self.configurator)
    }

    async fn handle_in_message(&self, message: &EventMessage) -> Result<(), PluginError> {
        self.handle(FlowType::In, message).await
    }

    async fn handle_out_message(&self, message: &EventMessage) -> Result<(), PluginError> {
        self.handle(FlowType::Out, message).await
    }
}
