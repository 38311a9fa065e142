// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manager facade.
//!
//! The manager is the single entry point the host uses to drive plugins. It
//! owns the registration table, the router directory, and the status
//! aggregator for as long as it is started. Every operation called before
//! [`PluginManager::start_up`] (or after [`PluginManager::shutdown`]) is a
//! logged no-op.

use std::sync::Arc;
use std::time::Duration;

use maestro_config::model::ManagerConfig;
use maestro_core::{
    AuditSink, CatalogStore, ConfigurationId, DataType, EventMessage, FlowType, MaestroError,
    PluginContext, PluginDefinition, PluginStatus, StaticDescriptor,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::aggregator::{StatusAggregator, StatusReporter};
use crate::context::{HostContext, HostServices};
use crate::directory::RouterDirectory;
use crate::dispatch::dispatch;
use crate::lifecycle::{
    CommandOutcome, ControllerSettings, LifecycleCommand, LifecycleController, LifecycleHandle,
};
use crate::registry::RunnerRegistry;
use crate::supervisor::guarded;
use crate::table::{PluginInfo, RegistrationEntry, RegistrationTable};

const SHUTDOWN_POLL: Duration = Duration::from_millis(25);

/// Runtime tunables of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Bound on a router liveness tally before START.
    pub probe_timeout: Duration,
    /// Bound on waiting for in-flight transitions at shutdown.
    pub shutdown_timeout: Duration,
    pub lifecycle_mailbox: usize,
    pub router_mailbox: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            lifecycle_mailbox: 16,
            router_mailbox: 1024,
        }
    }
}

impl From<&ManagerConfig> for ManagerSettings {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            lifecycle_mailbox: config.lifecycle_mailbox,
            router_mailbox: config.router_mailbox,
        }
    }
}

/// A definition together with the descriptor its implementation declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub definition: PluginDefinition,
    pub descriptor: StaticDescriptor,
}

struct Runtime {
    table: Arc<RegistrationTable>,
    directory: Arc<RouterDirectory>,
    aggregator: StatusAggregator,
}

/// Handles cloned out of the runtime so no manager lock is held while working.
#[derive(Clone)]
struct RuntimeView {
    table: Arc<RegistrationTable>,
    directory: Arc<RouterDirectory>,
    reporter: StatusReporter,
}

impl Runtime {
    fn view(&self) -> RuntimeView {
        RuntimeView {
            table: Arc::clone(&self.table),
            directory: Arc::clone(&self.directory),
            reporter: self.aggregator.reporter(),
        }
    }
}

pub struct PluginManager {
    registry: Arc<RunnerRegistry>,
    catalog: Arc<dyn CatalogStore>,
    audit: Arc<dyn AuditSink>,
    services: Option<Arc<dyn HostServices>>,
    settings: ManagerSettings,
    runtime: RwLock<Option<Runtime>>,
}

impl PluginManager {
    pub fn new(
        registry: Arc<RunnerRegistry>,
        catalog: Arc<dyn CatalogStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            catalog,
            audit,
            services: None,
            settings: ManagerSettings::default(),
            runtime: RwLock::new(None),
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Services offered to plugins through their init context.
    pub fn with_host_services(mut self, services: Arc<dyn HostServices>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.read().await.is_some()
    }

    async fn view(&self) -> Option<RuntimeView> {
        self.runtime.read().await.as_ref().map(Runtime::view)
    }

    /// Start the manager.
    ///
    /// Definitions without a loaded implementation are marked unavailable,
    /// then every available configuration is registered and the autostart
    /// ones are started. Per-plugin failures are logged and do not abort
    /// start-up.
    pub async fn start_up(&self) -> Result<(), MaestroError> {
        let view = {
            let mut runtime = self.runtime.write().await;
            if runtime.is_some() {
                warn!("plugin manager already started");
                return Ok(());
            }
            info!("starting the plugin manager");
            self.hide_unloaded_definitions().await?;

            let table = Arc::new(RegistrationTable::new());
            let started = Runtime {
                aggregator: StatusAggregator::spawn(Arc::clone(&table)),
                table,
                directory: Arc::new(RouterDirectory::new()),
            };
            let view = started.view();
            *runtime = Some(started);
            view
        };

        let configurations = self.catalog.available_configurations().await?;
        for configuration in configurations {
            let id = configuration.id;
            if let Err(e) = self.register_with(&view, id).await {
                error!(configuration_id = %id, name = %configuration.name, error = %e, "unable to register plugin");
                continue;
            }
            if configuration.is_autostart {
                let outcome = self.command_with(&view, id, LifecycleCommand::Start).await;
                if !outcome.is_accepted() {
                    warn!(configuration_id = %id, %outcome, "autostart was not accepted");
                }
            }
        }

        info!(
            plugins = view.table.len().await,
            "plugin manager started"
        );
        Ok(())
    }

    async fn hide_unloaded_definitions(&self) -> Result<(), MaestroError> {
        for definition in self.catalog.definitions().await? {
            if self.registry.contains(&definition.identifier) {
                continue;
            }
            warn!(
                identifier = %definition.identifier,
                "no implementation loaded for plugin definition, marking it unavailable"
            );
            if definition.is_available {
                self.catalog.mark_unavailable(&definition.identifier).await?;
            }
            for configuration in self.catalog.configurations_of(&definition.identifier).await? {
                warn!(
                    identifier = %definition.identifier,
                    configuration_id = %configuration.id,
                    name = %configuration.name,
                    "configuration is attached to a plugin that is not loaded"
                );
            }
        }
        Ok(())
    }

    /// Register an available configuration. Registering twice is a no-op.
    pub async fn register(&self, id: ConfigurationId) -> Result<(), MaestroError> {
        let Some(view) = self.view().await else {
            warn!(configuration_id = %id, "plugin manager not started, register ignored");
            return Ok(());
        };
        self.register_with(&view, id).await
    }

    async fn register_with(&self, view: &RuntimeView, id: ConfigurationId) -> Result<(), MaestroError> {
        if view.table.contains(id).await {
            info!(configuration_id = %id, "plugin already registered");
            return Ok(());
        }

        // The init hook runs with no table lock held so lookups, broadcasts
        // and other registrations proceed while a slow plugin initializes.
        let configuration = self
            .catalog
            .available_configuration(id)
            .await?
            .ok_or(MaestroError::PluginNotFound { id })?;
        let runner = self.registry.resolve(&configuration.definition)?;
        let name = configuration.name.clone();

        let context: Arc<dyn PluginContext> =
            Arc::new(HostContext::new(configuration, self.services.clone()));
        guarded("init hook", runner.init(context))
            .await
            .map_err(|source| MaestroError::Initialization { id, source })?;

        let mut entries = view.table.structural().await;
        if entries.contains_key(&id) {
            warn!(configuration_id = %id, "plugin registered concurrently, discarding the new runner");
            return Ok(());
        }

        let (lifecycle, commands) = LifecycleHandle::channel(self.settings.lifecycle_mailbox);
        let cancel = lifecycle.cancellation();
        let entry = Arc::new(RegistrationEntry::new(id, name, runner, lifecycle));
        LifecycleController::new(
            Arc::clone(&entry),
            view.reporter.clone(),
            Arc::clone(&self.audit),
            Arc::clone(&view.directory),
            ControllerSettings {
                probe_timeout: self.settings.probe_timeout,
                router_mailbox: self.settings.router_mailbox,
            },
        )
        .spawn(commands, cancel);

        entries.insert(id, entry);
        info!(configuration_id = %id, "plugin registered");
        Ok(())
    }

    /// Remove a stopped plugin from the table.
    pub async fn unregister(&self, id: ConfigurationId) -> Result<(), MaestroError> {
        let Some(view) = self.view().await else {
            warn!(configuration_id = %id, "plugin manager not started, unregister ignored");
            return Ok(());
        };

        let mut entries = view.table.structural().await;
        let entry = entries
            .get(&id)
            .cloned()
            .ok_or(MaestroError::PluginNotFound { id })?;
        let status = entry.status().await;
        if status != PluginStatus::Stopped {
            return Err(MaestroError::NotStopped { id, status });
        }
        entry.lifecycle().shutdown();
        entries.remove(&id);
        info!(configuration_id = %id, "plugin unregistered");
        Ok(())
    }

    /// Ask the plugin's lifecycle controller to start it.
    pub async fn start(&self, id: ConfigurationId) -> CommandOutcome {
        self.command(id, LifecycleCommand::Start).await
    }

    /// Ask the plugin's lifecycle controller to stop it.
    pub async fn stop(&self, id: ConfigurationId) -> CommandOutcome {
        self.command(id, LifecycleCommand::Stop).await
    }

    async fn command(&self, id: ConfigurationId, command: LifecycleCommand) -> CommandOutcome {
        let Some(view) = self.view().await else {
            warn!(configuration_id = %id, ?command, "plugin manager not started, command ignored");
            return CommandOutcome::Unavailable;
        };
        self.command_with(&view, id, command).await
    }

    async fn command_with(
        &self,
        view: &RuntimeView,
        id: ConfigurationId,
        command: LifecycleCommand,
    ) -> CommandOutcome {
        let Some(entry) = view.table.get(id).await else {
            error!(configuration_id = %id, ?command, "no plugin registered under this id");
            return CommandOutcome::NotRegistered;
        };
        let outcome = entry.lifecycle().send(command).await;
        debug!(configuration_id = %id, ?command, %outcome, "lifecycle command answered");
        outcome
    }

    /// Current status of a registered plugin.
    pub async fn status(&self, id: ConfigurationId) -> Result<PluginStatus, MaestroError> {
        let view = self.view().await.ok_or(MaestroError::PluginNotFound { id })?;
        let entry = view
            .table
            .get(id)
            .await
            .ok_or(MaestroError::PluginNotFound { id })?;
        Ok(entry.status().await)
    }

    /// Snapshot of every registered plugin, ordered by id.
    pub async fn list_all(&self) -> Vec<PluginInfo> {
        match self.view().await {
            Some(view) => view.table.list_all().await,
            None => Vec::new(),
        }
    }

    /// Route a message to the inbound interfaces of its recipients.
    pub async fn post_in_message(&self, message: EventMessage) -> Result<usize, MaestroError> {
        self.post(FlowType::In, message).await
    }

    /// Route a message to the outbound interfaces of its recipients.
    pub async fn post_out_message(&self, message: EventMessage) -> Result<usize, MaestroError> {
        self.post(FlowType::Out, message).await
    }

    async fn post(&self, flow: FlowType, message: EventMessage) -> Result<usize, MaestroError> {
        let Some(view) = self.view().await else {
            warn!(transaction_id = %message.transaction_id, %flow, "plugin manager not started, message dropped");
            return Ok(0);
        };
        dispatch(&view.table, flow, message).await
    }

    /// Registered plugins able to register objects of `data_type`.
    pub async fn plugins_supporting_registration(&self, data_type: &DataType) -> Vec<PluginInfo> {
        let Some(view) = self.view().await else {
            return Vec::new();
        };
        let mut supporting = Vec::new();
        for entry in view.table.entries().await {
            let supported = entry
                .runner()
                .configurator()
                .is_some_and(|c| c.registration_data_types.contains(data_type));
            if supported {
                supporting.push(entry.info().await);
            }
        }
        supporting
    }

    /// Descriptors of every catalog definition with a loaded implementation.
    pub async fn descriptors(&self) -> Result<Vec<PluginDescriptor>, MaestroError> {
        Ok(self
            .catalog
            .definitions()
            .await?
            .into_iter()
            .filter(|d| self.registry.contains(&d.identifier))
            .filter_map(|definition| {
                let descriptor = self.registry.descriptor(&definition)?;
                Some(PluginDescriptor {
                    definition,
                    descriptor,
                })
            })
            .collect())
    }

    /// Descriptor of one definition, available or not.
    pub async fn descriptor(
        &self,
        identifier: &str,
    ) -> Result<Option<StaticDescriptor>, MaestroError> {
        Ok(self
            .catalog
            .definition(identifier)
            .await?
            .and_then(|d| self.registry.descriptor(&d)))
    }

    /// Descriptor of one definition, only if it is available.
    pub async fn available_descriptor(
        &self,
        identifier: &str,
    ) -> Result<Option<StaticDescriptor>, MaestroError> {
        Ok(self
            .catalog
            .definition(identifier)
            .await?
            .filter(|d| d.is_available)
            .and_then(|d| self.registry.descriptor(&d)))
    }

    /// Whether a definition is available and its implementation is loaded.
    pub async fn is_plugin_available(&self, identifier: &str) -> Result<bool, MaestroError> {
        Ok(self
            .catalog
            .definition(identifier)
            .await?
            .is_some_and(|d| d.is_available && self.registry.contains(identifier)))
    }

    /// Send STOP to every registered plugin. Rejections are logged only.
    pub async fn stop_all(&self) {
        let Some(view) = self.view().await else {
            return;
        };
        for entry in view.table.entries().await {
            let outcome = entry.lifecycle().send(LifecycleCommand::Stop).await;
            if !outcome.is_accepted() {
                debug!(configuration_id = %entry.configuration_id(), %outcome, "stop not accepted");
            }
        }
    }

    /// Stop every plugin and tear the manager down.
    ///
    /// Waits up to the shutdown timeout for every plugin to reach STOPPED.
    pub async fn shutdown(&self) {
        let Some(view) = self.view().await else {
            debug!("plugin manager not started, nothing to shut down");
            return;
        };
        info!("shutting down the plugin manager");

        let timeout = self.settings.shutdown_timeout;
        let settled = tokio::time::timeout(timeout, async {
            loop {
                let mut settled = true;
                for entry in view.table.entries().await {
                    let status = entry.status().await;
                    if status.can_stop() {
                        entry.lifecycle().send(LifecycleCommand::Stop).await;
                        settled = false;
                    } else if status != PluginStatus::Stopped {
                        settled = false;
                    }
                }
                if settled {
                    break;
                }
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
        })
        .await
        .is_ok();
        if !settled {
            warn!(?timeout, "plugins still running at shutdown");
        }

        let Some(runtime) = self.runtime.write().await.take() else {
            return;
        };
        let entries = runtime.table.entries().await;
        for entry in &entries {
            entry.lifecycle().shutdown();
        }
        // A start that was still running above may have published routers
        // before seeing the cancellation.
        for entry in &entries {
            let routers = {
                let mut state = entry.lock().await;
                [state.inbound.take(), state.outbound.take()]
            };
            for router in routers.into_iter().flatten() {
                debug!(configuration_id = %entry.configuration_id(), router = %router.name(), "stopping leftover router");
                router.shutdown(self.settings.probe_timeout).await;
            }
        }
        runtime.aggregator.shutdown().await;
        info!("plugin manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::catalog::ConfiguredCatalog;
    use crate::testing::{Tally, ScriptedRunner};
    use maestro_config::MaestroConfig;
    use maestro_config::model::{DefinitionConfig, PluginConfigurationConfig};
    use maestro_core::{InterfaceConfig, MessageKind, RunnerConfigurator};
    use std::collections::HashSet;

    fn definition(identifier: &str) -> DefinitionConfig {
        DefinitionConfig {
            identifier: identifier.into(),
            implementation: String::new(),
            available: true,
        }
    }

    fn configuration(id: u64, definition: &str, autostart: bool) -> PluginConfigurationConfig {
        PluginConfigurationConfig {
            id,
            name: format!("plugin {id}"),
            definition: definition.into(),
            autostart,
            available: true,
            properties: serde_json::Map::new(),
        }
    }

    struct Setup {
        manager: PluginManager,
        audit: Arc<MemoryAuditLog>,
    }

    fn setup(
        definitions: Vec<DefinitionConfig>,
        configurations: Vec<PluginConfigurationConfig>,
        runners: Vec<ScriptedRunner>,
    ) -> Setup {
        let mut config = MaestroConfig::default();
        config.definitions = definitions;
        config.configurations = configurations;

        let mut registry = RunnerRegistry::new();
        for runner in runners {
            let identifier = runner.descriptor_identifier();
            registry.register(identifier, move || runner.clone().into_runner());
        }
        let audit = Arc::new(MemoryAuditLog::new());
        let manager = PluginManager::new(
            Arc::new(registry),
            Arc::new(ConfiguredCatalog::from_config(&config)),
            audit.clone(),
        )
        .with_settings(ManagerSettings {
            probe_timeout: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(2),
            ..ManagerSettings::default()
        });
        Setup { manager, audit }
    }

    async fn wait_status(manager: &PluginManager, id: u64, status: PluginStatus) {
        for _ in 0..200 {
            if manager.status(ConfigurationId(id)).await.ok() == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("plugin {id} never reached {status}");
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn single(autostart: bool) -> (Setup, Arc<Tally>) {
        let runner = ScriptedRunner::new("echo");
        let tally = runner.tally();
        let setup = setup(
            vec![definition("echo")],
            vec![configuration(1, "echo", autostart)],
            vec![runner],
        );
        (setup, tally)
    }

    #[tokio::test]
    async fn operations_before_start_up_are_no_ops() {
        let (s, tally) = single(false);
        assert!(!s.manager.is_running().await);
        assert!(s.manager.register(ConfigurationId(1)).await.is_ok());
        assert_eq!(s.manager.start(ConfigurationId(1)).await, CommandOutcome::Unavailable);
        assert!(s.manager.list_all().await.is_empty());
        assert_eq!(
            s.manager
                .post_out_message(EventMessage::broadcast("ticket", 1))
                .await
                .unwrap(),
            0
        );
        assert_eq!(tally.inits.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_up_registers_and_autostarts() {
        let (s, tally) = single(true);
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::Started).await;
        assert_eq!(tally.inits.load(std::sync::atomic::Ordering::SeqCst), 1);

        let infos = s.manager.list_all().await;
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].inbound_workers, Some(1));
        assert_eq!(infos[0].outbound_workers, Some(1));
        s.manager.shutdown().await;
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn unloaded_definitions_are_hidden() {
        let s = setup(
            vec![definition("echo"), definition("ghost")],
            vec![configuration(1, "echo", false), configuration(2, "ghost", true)],
            vec![ScriptedRunner::new("echo")],
        );
        s.manager.start_up().await.unwrap();

        let ids: Vec<_> = s.manager.list_all().await.iter().map(|i| i.configuration_id).collect();
        assert_eq!(ids, vec![ConfigurationId(1)]);
        assert!(!s.manager.is_plugin_available("ghost").await.unwrap());
        assert!(s.manager.is_plugin_available("echo").await.unwrap());
        assert!(logs_contain("configuration is attached to a plugin that is not loaded"));
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn register_is_idempotent_and_unknown_ids_fail() {
        let (s, tally) = single(false);
        s.manager.start_up().await.unwrap();
        s.manager.register(ConfigurationId(1)).await.unwrap();
        assert_eq!(tally.inits.load(std::sync::atomic::Ordering::SeqCst), 1);

        let err = s.manager.register(ConfigurationId(404)).await.unwrap_err();
        assert!(matches!(err, MaestroError::PluginNotFound { .. }));
        s.manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_start_accepts_exactly_one() {
        let runner = ScriptedRunner::new("echo").slow_start(Duration::from_millis(100));
        let s = setup(
            vec![definition("echo")],
            vec![configuration(1, "echo", false)],
            vec![runner],
        );
        let manager = Arc::new(s.manager);
        manager.start_up().await.unwrap();

        let a = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.start(ConfigurationId(1)).await }
        });
        let b = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.start(ConfigurationId(1)).await }
        });
        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| o.is_accepted()).count(), 1);
        assert!(outcomes.contains(&CommandOutcome::Rejected {
            status: PluginStatus::Starting
        }));
        wait_status(&manager, 1, PluginStatus::Started).await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn unregister_requires_stopped() {
        let (s, _tally) = single(true);
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::Started).await;

        let err = s.manager.unregister(ConfigurationId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            MaestroError::NotStopped {
                status: PluginStatus::Started,
                ..
            }
        ));

        assert!(s.manager.stop(ConfigurationId(1)).await.is_accepted());
        wait_status(&s.manager, 1, PluginStatus::Stopped).await;
        s.manager.unregister(ConfigurationId(1)).await.unwrap();
        assert!(matches!(
            s.manager.status(ConfigurationId(1)).await,
            Err(MaestroError::PluginNotFound { .. })
        ));
        assert_eq!(
            s.manager.start(ConfigurationId(1)).await,
            CommandOutcome::NotRegistered
        );
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn broadcast_reaches_only_compatible_started_plugins() {
        let tickets = ScriptedRunner::new("tickets");
        let comments = ScriptedRunner::new("comments").with_data_types(&["comment"]);
        let idle = ScriptedRunner::new("idle");
        let (tickets_tally, comments_tally, idle_tally) =
            (tickets.tally(), comments.tally(), idle.tally());
        let s = setup(
            vec![definition("tickets"), definition("comments"), definition("idle")],
            vec![
                configuration(1, "tickets", true),
                configuration(2, "comments", true),
                configuration(3, "idle", false),
            ],
            vec![tickets, comments, idle],
        );
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::Started).await;
        wait_status(&s.manager, 2, PluginStatus::Started).await;

        let delivered = s
            .manager
            .post_out_message(EventMessage::broadcast("ticket", 5))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        settle().await;

        assert_eq!(tickets_tally.handled().await.len(), 1);
        assert!(comments_tally.handled().await.is_empty());
        assert!(idle_tally.handled().await.is_empty());
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn addressed_message_to_stopped_plugin_is_dropped() {
        let (s, tally) = single(false);
        s.manager.start_up().await.unwrap();

        let delivered = s
            .manager
            .post_in_message(EventMessage::addressed(ConfigurationId(1), "ticket"))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        let delivered = s
            .manager
            .post_in_message(EventMessage::addressed(ConfigurationId(77), "ticket"))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        settle().await;
        assert!(tally.handled().await.is_empty());
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn addressed_message_ignores_data_type_filter() {
        let (s, tally) = single(true);
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::Started).await;

        let delivered = s
            .manager
            .post_in_message(EventMessage::addressed(ConfigurationId(1), "invoice"))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        settle().await;
        let handled = tally.handled().await;
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].0, FlowType::In);
        assert_eq!(handled[0].1.kind, MessageKind::Addressed);
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn inconsistent_message_is_rejected() {
        let (s, _tally) = single(false);
        s.manager.start_up().await.unwrap();
        let mut message = EventMessage::broadcast("ticket", 1);
        message.internal_id = None;
        let err = s.manager.post_out_message(message).await.unwrap_err();
        assert!(matches!(err, MaestroError::InvalidMessage(_)));
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn failed_start_is_reported_as_start_failed() {
        let runner = ScriptedRunner::new("echo").failing_start();
        let s = setup(
            vec![definition("echo")],
            vec![configuration(1, "echo", true)],
            vec![runner],
        );
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::StartFailed).await;
        let entries = s.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_error);
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_every_plugin() {
        let runner = ScriptedRunner::new("echo");
        let tally = runner.tally();
        let s = setup(
            vec![definition("echo")],
            vec![configuration(1, "echo", true), configuration(2, "echo", true)],
            vec![runner],
        );
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::Started).await;
        wait_status(&s.manager, 2, PluginStatus::Started).await;

        s.manager.shutdown().await;
        assert!(!s.manager.is_running().await);
        assert_eq!(tally.stops.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lookups_proceed_while_a_plugin_initializes() {
        let echo = ScriptedRunner::new("echo");
        let slow = ScriptedRunner::new("slow");
        let slow_tally = slow.tally();
        let s = setup(
            vec![definition("echo"), definition("slow")],
            vec![configuration(1, "echo", true), configuration(2, "slow", false)],
            vec![echo, slow],
        );
        let manager = Arc::new(s.manager);
        manager.start_up().await.unwrap();
        wait_status(&manager, 1, PluginStatus::Started).await;
        manager.unregister(ConfigurationId(2)).await.unwrap();

        slow_tally.delay_init(Duration::from_secs(1));
        let registrations: Vec<_> = (0..2)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.register(ConfigurationId(2)).await })
            })
            .collect();
        settle().await;

        let prompt = Duration::from_millis(200);
        let status = tokio::time::timeout(prompt, manager.status(ConfigurationId(1)))
            .await
            .expect("status lookup waited for the init hook");
        assert_eq!(status.unwrap(), PluginStatus::Started);
        let delivered = tokio::time::timeout(
            prompt,
            manager.post_out_message(EventMessage::broadcast("ticket", 3)),
        )
        .await
        .expect("broadcast waited for the init hook")
        .unwrap();
        assert_eq!(delivered, 1);

        for registration in registrations {
            registration.await.unwrap().unwrap();
        }
        // Both concurrent registrations ran init, only one entry was kept.
        assert_eq!(slow_tally.inits.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(manager.list_all().await.len(), 2);
        assert_eq!(
            manager.status(ConfigurationId(2)).await.unwrap(),
            PluginStatus::Stopped
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn broadcasts_are_not_delayed_by_a_router_liveness_check() {
        let runner = ScriptedRunner::new("echo");
        let tally = runner.tally();
        let s = setup(
            vec![definition("echo")],
            vec![configuration(1, "echo", true), configuration(2, "echo", false)],
            vec![runner],
        );
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::Started).await;

        let directory = Arc::clone(&s.manager.view().await.unwrap().directory);
        let _stale = directory.publish("out-router-2".to_string());

        let manager = Arc::new(s.manager);
        let starting = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.start(ConfigurationId(2)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The liveness check of plugin 2 waits up to 200ms for the stale router.
        let delivered = tokio::time::timeout(
            Duration::from_millis(100),
            manager.post_out_message(EventMessage::broadcast("ticket", 9)),
        )
        .await
        .expect("broadcast waited for the router liveness check")
        .unwrap();
        assert_eq!(delivered, 1);

        assert_eq!(starting.await.unwrap(), CommandOutcome::RoutersBusy);
        assert_eq!(
            manager.status(ConfigurationId(2)).await.unwrap(),
            PluginStatus::Stopped
        );
        settle().await;
        assert_eq!(tally.handled().await.len(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_during_a_slow_start_leaves_no_router_behind() {
        let runner = ScriptedRunner::new("echo").slow_start(Duration::from_millis(300));
        let tally = runner.tally();
        let s = setup(
            vec![definition("echo")],
            vec![configuration(1, "echo", true)],
            vec![runner],
        );
        let manager = s.manager.with_settings(ManagerSettings {
            probe_timeout: Duration::from_millis(200),
            shutdown_timeout: Duration::from_millis(100),
            ..ManagerSettings::default()
        });
        manager.start_up().await.unwrap();
        assert_eq!(
            manager.status(ConfigurationId(1)).await.unwrap(),
            PluginStatus::Starting
        );
        let directory = Arc::clone(&manager.view().await.unwrap().directory);

        manager.shutdown().await;
        assert!(!manager.is_running().await);

        // Let the start hook finish after the manager is gone.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(directory.is_empty());
        assert_eq!(tally.starts.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(tally.stops.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn plugin_without_outbound_interface_only_receives_inbound() {
        let runner =
            ScriptedRunner::new("echo").with_interfaces(Some(InterfaceConfig::new(2)), None);
        let tally = runner.tally();
        let s = setup(
            vec![definition("echo")],
            vec![configuration(1, "echo", true)],
            vec![runner],
        );
        s.manager.start_up().await.unwrap();
        wait_status(&s.manager, 1, PluginStatus::Started).await;

        let infos = s.manager.list_all().await;
        assert_eq!(infos[0].inbound_workers, Some(2));
        assert_eq!(infos[0].outbound_workers, None);

        let out = s
            .manager
            .post_out_message(EventMessage::broadcast("ticket", 1))
            .await
            .unwrap();
        let inbound = s
            .manager
            .post_in_message(EventMessage::broadcast("ticket", 2))
            .await
            .unwrap();
        assert_eq!((out, inbound), (0, 1));
        settle().await;
        let handled = tally.handled().await;
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].0, FlowType::In);
        s.manager.shutdown().await;
    }

    #[tokio::test]
    async fn registration_support_and_descriptors() {
        let runner = ScriptedRunner::new("echo").with_configurator(RunnerConfigurator {
            in_interface: Some(InterfaceConfig::new(1)),
            out_interface: None,
            registration_data_types: HashSet::from([DataType::new("ticket")]),
        });
        let s = setup(
            vec![definition("echo"), definition("ghost")],
            vec![configuration(1, "echo", false)],
            vec![runner],
        );
        s.manager.start_up().await.unwrap();

        let supporting = s
            .manager
            .plugins_supporting_registration(&DataType::new("ticket"))
            .await;
        assert_eq!(supporting.len(), 1);
        assert!(s
            .manager
            .plugins_supporting_registration(&DataType::new("comment"))
            .await
            .is_empty());

        let descriptors = s.manager.descriptors().await.unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].descriptor.identifier, "echo");
        assert!(s.manager.descriptor("echo").await.unwrap().is_some());
        assert!(s.manager.available_descriptor("ghost").await.unwrap().is_none());
        s.manager.shutdown().await;
    }
}
