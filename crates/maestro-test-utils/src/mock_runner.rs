// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock plugin runner for deterministic testing.
//!
//! `MockRunner` implements `PluginRunner` with scripted hook outcomes and
//! records every message it handles. Clones share their recordings, so a
//! test can keep one clone for assertions and hand another to the registry.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use maestro_core::{
    DataType, EventMessage, FlowType, InterfaceConfig, MessageKind, PluginConfiguration,
    PluginContext, PluginError, PluginRunner, RunnerConfigurator, StaticDescriptor,
};

#[derive(Default)]
struct Recorder {
    handled: Mutex<Vec<(FlowType, EventMessage)>>,
    contexts: Mutex<Vec<PluginConfiguration>>,
    scripted_failures: Mutex<VecDeque<String>>,
    init_calls: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

/// A plugin runner whose behaviour is configured up front.
#[derive(Clone)]
pub struct MockRunner {
    descriptor: StaticDescriptor,
    configurator: RunnerConfigurator,
    fail_init: bool,
    fail_start: bool,
    fail_stop: bool,
    start_delay: Duration,
    failing_kinds: HashSet<MessageKind>,
    recorder: Arc<Recorder>,
}

impl MockRunner {
    /// A runner accepting `ticket` broadcasts with one worker per direction.
    pub fn new(identifier: &str) -> Self {
        Self {
            descriptor: StaticDescriptor::new(identifier, format!("Mock {identifier}"))
                .with_data_types(["ticket"]),
            configurator: RunnerConfigurator {
                in_interface: Some(InterfaceConfig::new(1)),
                out_interface: Some(InterfaceConfig::new(1)),
                registration_data_types: HashSet::new(),
            },
            fail_init: false,
            fail_start: false,
            fail_stop: false,
            start_delay: Duration::ZERO,
            failing_kinds: HashSet::new(),
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.descriptor.identifier
    }

    pub fn with_data_types(mut self, data_types: &[&str]) -> Self {
        self.descriptor = self.descriptor.with_data_types(data_types.iter().copied());
        self
    }

    /// Set the router settings of each direction. `None` disables it.
    pub fn with_interfaces(
        mut self,
        inbound: Option<InterfaceConfig>,
        outbound: Option<InterfaceConfig>,
    ) -> Self {
        self.configurator.in_interface = inbound;
        self.configurator.out_interface = outbound;
        self
    }

    pub fn with_registration_types(mut self, data_types: &[&str]) -> Self {
        self.configurator.registration_data_types =
            data_types.iter().map(|d| DataType::new(*d)).collect();
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Every handled message of these kinds fails.
    pub fn failing_on(mut self, kinds: &[MessageKind]) -> Self {
        self.failing_kinds = kinds.iter().copied().collect();
        self
    }

    /// Queue a one-shot handler failure, consumed by the next handled message.
    pub async fn fail_next(&self, reason: &str) {
        self.recorder
            .scripted_failures
            .lock()
            .await
            .push_back(reason.to_string());
    }

    /// Factory closure for `RunnerRegistry::register`.
    pub fn factory(&self) -> impl Fn() -> Arc<dyn PluginRunner> + Send + Sync + 'static {
        let runner = self.clone();
        move || Arc::new(runner.clone()) as Arc<dyn PluginRunner>
    }

    pub async fn handled(&self) -> Vec<(FlowType, EventMessage)> {
        self.recorder.handled.lock().await.clone()
    }

    pub async fn handled_count(&self, kind: MessageKind) -> usize {
        self.recorder
            .handled
            .lock()
            .await
            .iter()
            .filter(|(_, m)| m.kind == kind)
            .count()
    }

    /// Configurations received by `init`, in call order.
    pub async fn contexts(&self) -> Vec<PluginConfiguration> {
        self.recorder.contexts.lock().await.clone()
    }

    pub fn init_calls(&self) -> usize {
        self.recorder.init_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.recorder.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.recorder.stop_calls.load(Ordering::SeqCst)
    }

    async fn handle(&self, flow: FlowType, message: &EventMessage) -> Result<(), PluginError> {
        self.recorder
            .handled
            .lock()
            .await
            .push((flow, message.clone()));

        if let Some(reason) = self.recorder.scripted_failures.lock().await.pop_front() {
            return Err(PluginError::new(reason));
        }
        if self.failing_kinds.contains(&message.kind) {
            return Err(PluginError::new(format!(
                "mock handler rejects {} messages",
                message.kind
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PluginRunner for MockRunner {
    async fn init(&self, context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        self.recorder.init_calls.fetch_add(1, Ordering::SeqCst);
        self.recorder
            .contexts
            .lock()
            .await
            .push(context.configuration().clone());
        if self.fail_init {
            return Err(PluginError::new("mock init failure"));
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), PluginError> {
        self.recorder.start_calls.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start {
            return Err(PluginError::new("mock start failure"));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        self.recorder.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(PluginError::new("mock stop failure"));
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
