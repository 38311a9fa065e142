// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-plugin lifecycle controllers.
//!
//! Every registration entry owns one controller task. START and STOP commands
//! reach it through a bounded mailbox and are answered immediately with a
//! [`CommandOutcome`]. An accepted command moves the entry to STARTING or
//! STOPPING and spawns the transition; the terminal outcome goes to the status
//! aggregator. Commands arriving while a transition is in progress see the
//! transitional status and are rejected.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use maestro_core::{AuditSink, FlowType, PluginLogEntry, PluginStatus};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregator::StatusReporter;
use crate::directory::RouterDirectory;
use crate::router::{MessageRouter, RouterHandle};
use crate::supervisor::guarded;
use crate::table::RegistrationEntry;

/// Answer to a START or STOP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CommandOutcome {
    /// The transition was accepted and is running.
    Accepted,
    /// The current status does not allow the command.
    Rejected { status: PluginStatus },
    /// A router from a previous run is still alive.
    RoutersBusy,
    /// No plugin is registered under the id.
    NotRegistered,
    /// The manager is not running.
    Unavailable,
}

impl CommandOutcome {
    pub fn is_accepted(self) -> bool {
        self == CommandOutcome::Accepted
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Accepted => f.write_str("accepted"),
            CommandOutcome::Rejected { status } => write!(f, "rejected while {status}"),
            CommandOutcome::RoutersBusy => f.write_str("rejected, routers still running"),
            CommandOutcome::NotRegistered => f.write_str("plugin not registered"),
            CommandOutcome::Unavailable => f.write_str("manager not running"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleCommand {
    Start,
    Stop,
}

pub(crate) struct Envelope {
    command: LifecycleCommand,
    reply: oneshot::Sender<CommandOutcome>,
}

/// Mailbox of a lifecycle controller.
#[derive(Clone)]
pub(crate) struct LifecycleHandle {
    commands: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
}

impl LifecycleHandle {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                commands: tx,
                cancel: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Send a command and wait for the controller's answer.
    pub(crate) async fn send(&self, command: LifecycleCommand) -> CommandOutcome {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(Envelope { command, reply }).await.is_err() {
            return CommandOutcome::NotRegistered;
        }
        answer.await.unwrap_or(CommandOutcome::NotRegistered)
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the controller. In-flight transitions still report their outcome.
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ControllerSettings {
    pub probe_timeout: Duration,
    pub router_mailbox: usize,
}

/// Everything a transition needs, cloned out of the controller.
#[derive(Clone)]
struct Transition {
    entry: Arc<RegistrationEntry>,
    reporter: StatusReporter,
    audit: Arc<dyn AuditSink>,
    directory: Arc<RouterDirectory>,
    settings: ControllerSettings,
    /// Cancelled when the controller is torn down.
    cancel: CancellationToken,
}

pub(crate) struct LifecycleController {
    transition: Transition,
}

impl LifecycleController {
    pub(crate) fn new(
        entry: Arc<RegistrationEntry>,
        reporter: StatusReporter,
        audit: Arc<dyn AuditSink>,
        directory: Arc<RouterDirectory>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            transition: Transition {
                entry,
                reporter,
                audit,
                directory,
                settings,
                cancel: CancellationToken::new(),
            },
        }
    }

    pub(crate) fn spawn(
        mut self,
        commands: mpsc::Receiver<Envelope>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        self.transition.cancel = cancel.clone();
        tokio::spawn(self.run(commands, cancel))
    }

    async fn run(self, mut commands: mpsc::Receiver<Envelope>, cancel: CancellationToken) {
        let id = self.transition.entry.configuration_id();
        debug!(configuration_id = %id, "lifecycle controller started");
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                envelope = commands.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            let outcome = match envelope.command {
                LifecycleCommand::Start => self.accept_start().await,
                LifecycleCommand::Stop => self.accept_stop().await,
            };
            let _ = envelope.reply.send(outcome);
        }
        debug!(configuration_id = %id, "lifecycle controller stopped");
    }

    async fn accept_start(&self) -> CommandOutcome {
        let entry = &self.transition.entry;
        let id = entry.configuration_id();

        let status = entry.status().await;
        if !status.can_start() {
            warn!(configuration_id = %id, %status, "the plugin is not stopped, cannot start it");
            return CommandOutcome::Rejected { status };
        }

        // The liveness check may wait for the full timeout; the entry stays unlocked meanwhile.
        for flow in [FlowType::In, FlowType::Out] {
            let name = flow.router_name(id);
            if !self
                .transition
                .directory
                .is_stopped(&name, self.transition.settings.probe_timeout)
                .await
            {
                error!(configuration_id = %id, router = %name, "router is still running, cannot start the plugin");
                return CommandOutcome::RoutersBusy;
            }
        }

        let mut state = entry.lock().await;
        if !state.status.can_start() {
            warn!(configuration_id = %id, status = %state.status, "status changed while checking routers, cannot start it");
            return CommandOutcome::Rejected {
                status: state.status,
            };
        }
        state.status = PluginStatus::Starting;
        drop(state);
        info!(configuration_id = %id, "plugin is starting");

        tokio::spawn(self.transition.clone().start());
        CommandOutcome::Accepted
    }

    async fn accept_stop(&self) -> CommandOutcome {
        let entry = &self.transition.entry;
        let id = entry.configuration_id();
        let mut state = entry.lock().await;

        if !state.status.can_stop() {
            warn!(configuration_id = %id, status = %state.status, "the plugin is not started, cannot stop it");
            return CommandOutcome::Rejected {
                status: state.status,
            };
        }

        state.status = PluginStatus::Stopping;
        let inbound = state.inbound.take();
        let outbound = state.outbound.take();
        drop(state);
        info!(configuration_id = %id, "plugin is stopping");

        tokio::spawn(self.transition.clone().stop(inbound, outbound));
        CommandOutcome::Accepted
    }
}

impl Transition {
    async fn start(self) {
        let id = self.entry.configuration_id();
        match guarded("start hook", self.entry.runner().start()).await {
            Ok(()) => {
                let inbound = self.spawn_router(FlowType::In);
                let outbound = self.spawn_router(FlowType::Out);
                let withdrawn = {
                    let mut state = self.entry.lock().await;
                    // Checked under the entry lock: the manager cancels first and
                    // then sweeps router handles under the same lock.
                    if self.cancel.is_cancelled() {
                        Some([inbound, outbound])
                    } else {
                        state.inbound = inbound;
                        state.outbound = outbound;
                        None
                    }
                };
                if let Some(routers) = withdrawn {
                    self.abandon(routers).await;
                    return;
                }
                info!(configuration_id = %id, "plugin started");
                self.record(PluginLogEntry::start(
                    id,
                    format!("plugin {id} started successfully"),
                    false,
                ))
                .await;
                self.reporter.report(id, PluginStatus::Started).await;
            }
            Err(err) => {
                let correlation_id = Uuid::new_v4();
                error!(configuration_id = %id, %correlation_id, error = %err, "the plugin cannot be started");
                self.record(PluginLogEntry::start(
                    id,
                    format!("plugin {id} cannot be started (correlation id {correlation_id}): {err}"),
                    true,
                ))
                .await;
                self.reporter.report(id, PluginStatus::StartFailed).await;
            }
        }
    }

    async fn stop(self, inbound: Option<RouterHandle>, outbound: Option<RouterHandle>) {
        let id = self.entry.configuration_id();
        for router in [inbound, outbound].into_iter().flatten() {
            let name = router.name().to_string();
            if router.shutdown(self.settings.probe_timeout).await {
                info!(configuration_id = %id, router = %name, "interface stopped");
            }
        }

        match guarded("stop hook", self.entry.runner().stop()).await {
            Ok(()) => {
                info!(configuration_id = %id, "plugin stopped");
                self.record(PluginLogEntry::stop(
                    id,
                    format!("plugin {id} stopped successfully"),
                    false,
                ))
                .await;
            }
            Err(err) => {
                let correlation_id = Uuid::new_v4();
                error!(configuration_id = %id, %correlation_id, error = %err, "the plugin cannot be stopped cleanly");
                self.record(PluginLogEntry::stop(
                    id,
                    format!("plugin {id} cannot be stopped (correlation id {correlation_id}): {err}"),
                    true,
                ))
                .await;
            }
        }
        self.reporter.report(id, PluginStatus::Stopped).await;
    }

    fn spawn_router(&self, flow: FlowType) -> Option<RouterHandle> {
        let id = self.entry.configuration_id();
        let runner = self.entry.runner();
        let Some(interface) = runner.configurator().and_then(|c| c.interface(flow)) else {
            debug!(configuration_id = %id, %flow, "no interface declared");
            return None;
        };
        let handle = MessageRouter {
            configuration_id: id,
            flow,
            runner: Arc::clone(runner),
            interface,
            audit: Arc::clone(&self.audit),
            mailbox: self.settings.router_mailbox,
        }
        .spawn(&self.directory);
        info!(configuration_id = %id, %flow, workers = interface.pool_size, "interface started");
        Some(handle)
    }

    /// Undo a start that completed after the controller was torn down.
    async fn abandon(&self, routers: [Option<RouterHandle>; 2]) {
        let id = self.entry.configuration_id();
        warn!(configuration_id = %id, "controller shut down during start, stopping the plugin again");
        for router in routers.into_iter().flatten() {
            router.shutdown(self.settings.probe_timeout).await;
        }
        if let Err(err) = guarded("stop hook", self.entry.runner().stop()).await {
            warn!(configuration_id = %id, error = %err, "the plugin cannot be stopped cleanly");
        }
        self.reporter.report(id, PluginStatus::Stopped).await;
    }

    async fn record(&self, entry: PluginLogEntry) {
        if let Err(e) = self.audit.record(entry).await {
            warn!(configuration_id = %self.entry.configuration_id(), error = %e, "failed to record audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::StatusAggregator;
    use crate::audit::MemoryAuditLog;
    use crate::table::RegistrationTable;
    use crate::testing::ScriptedRunner;
    use maestro_core::{ConfigurationId, PluginLogKind};

    struct Fixture {
        table: Arc<RegistrationTable>,
        directory: Arc<RouterDirectory>,
        audit: Arc<MemoryAuditLog>,
        lifecycle: LifecycleHandle,
        _aggregator: StatusAggregator,
    }

    async fn fixture(runner: ScriptedRunner) -> Fixture {
        let table = Arc::new(RegistrationTable::new());
        let directory = Arc::new(RouterDirectory::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let aggregator = StatusAggregator::spawn(Arc::clone(&table));

        let (lifecycle, commands) = LifecycleHandle::channel(4);
        let entry = Arc::new(RegistrationEntry::new(
            ConfigurationId(1),
            "one".into(),
            runner.into_runner(),
            lifecycle.clone(),
        ));
        table
            .structural()
            .await
            .insert(ConfigurationId(1), Arc::clone(&entry));
        LifecycleController::new(
            entry,
            aggregator.reporter(),
            audit.clone(),
            Arc::clone(&directory),
            ControllerSettings {
                probe_timeout: Duration::from_millis(200),
                router_mailbox: 8,
            },
        )
        .spawn(commands, lifecycle.cancellation());

        Fixture {
            table,
            directory,
            audit,
            lifecycle,
            _aggregator: aggregator,
        }
    }

    async fn wait_for(table: &RegistrationTable, status: PluginStatus) {
        let entry = table.get(ConfigurationId(1)).await.unwrap();
        for _ in 0..100 {
            if entry.status().await == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("plugin never reached {status}");
    }

    #[tokio::test]
    async fn start_then_stop_round_trip() {
        let runner = ScriptedRunner::new("echo");
        let tally = runner.tally();
        let f = fixture(runner).await;

        assert_eq!(f.lifecycle.send(LifecycleCommand::Start).await, CommandOutcome::Accepted);
        wait_for(&f.table, PluginStatus::Started).await;
        assert!(f.directory.contains("in-router-1"));
        assert!(f.directory.contains("out-router-1"));

        assert_eq!(f.lifecycle.send(LifecycleCommand::Stop).await, CommandOutcome::Accepted);
        wait_for(&f.table, PluginStatus::Stopped).await;
        assert!(f.directory.is_empty());

        assert_eq!(tally.starts.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(tally.stops.load(std::sync::atomic::Ordering::SeqCst), 1);
        let kinds: Vec<_> = f.audit.entries().await.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![PluginLogKind::Start, PluginLogKind::Stop]);
    }

    #[tokio::test]
    async fn stop_is_rejected_while_stopped() {
        let f = fixture(ScriptedRunner::new("echo")).await;
        assert_eq!(
            f.lifecycle.send(LifecycleCommand::Stop).await,
            CommandOutcome::Rejected {
                status: PluginStatus::Stopped
            }
        );
    }

    #[tokio::test]
    async fn overlapping_start_is_rejected() {
        let f = fixture(ScriptedRunner::new("echo").slow_start(Duration::from_millis(100))).await;
        assert!(f.lifecycle.send(LifecycleCommand::Start).await.is_accepted());
        assert_eq!(
            f.lifecycle.send(LifecycleCommand::Start).await,
            CommandOutcome::Rejected {
                status: PluginStatus::Starting
            }
        );
        assert_eq!(
            f.lifecycle.send(LifecycleCommand::Stop).await,
            CommandOutcome::Rejected {
                status: PluginStatus::Starting
            }
        );
        wait_for(&f.table, PluginStatus::Started).await;
    }

    #[tokio::test]
    async fn failed_start_is_audited_and_can_be_stopped() {
        let runner = ScriptedRunner::new("echo").failing_start();
        let tally = runner.tally();
        let f = fixture(runner).await;

        assert!(f.lifecycle.send(LifecycleCommand::Start).await.is_accepted());
        wait_for(&f.table, PluginStatus::StartFailed).await;
        assert!(f.directory.is_empty());

        let entries = f.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_error);
        assert!(entries[0].message.contains("correlation id"));

        assert!(f.lifecycle.send(LifecycleCommand::Stop).await.is_accepted());
        wait_for(&f.table, PluginStatus::Stopped).await;
        assert_eq!(tally.stops.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_stop_still_reaches_stopped() {
        let f = fixture(ScriptedRunner::new("echo").failing_stop()).await;
        assert!(f.lifecycle.send(LifecycleCommand::Start).await.is_accepted());
        wait_for(&f.table, PluginStatus::Started).await;
        assert!(f.lifecycle.send(LifecycleCommand::Stop).await.is_accepted());
        wait_for(&f.table, PluginStatus::Stopped).await;

        let entries = f.audit.entries().await;
        assert!(entries.iter().any(|e| e.kind == PluginLogKind::Stop && e.is_error));
    }

    #[tokio::test]
    async fn start_is_refused_while_a_router_is_alive() {
        let f = fixture(ScriptedRunner::new("echo")).await;
        let _stale = f.directory.publish("out-router-1".to_string());

        assert_eq!(
            f.lifecycle.send(LifecycleCommand::Start).await,
            CommandOutcome::RoutersBusy
        );
        let entry = f.table.get(ConfigurationId(1)).await.unwrap();
        assert_eq!(entry.status().await, PluginStatus::Stopped);
    }

    #[tokio::test]
    async fn router_liveness_check_runs_without_the_entry_lock() {
        let f = fixture(ScriptedRunner::new("echo")).await;
        let _stale = f.directory.publish("in-router-1".to_string());
        let entry = f.table.get(ConfigurationId(1)).await.unwrap();

        let lifecycle = f.lifecycle.clone();
        let starting = tokio::spawn(async move { lifecycle.send(LifecycleCommand::Start).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The check waits up to 200ms for the stale router to go away.
        let state = tokio::time::timeout(Duration::from_millis(50), entry.lock())
            .await
            .expect("entry lock held during the router liveness check");
        assert_eq!(state.status, PluginStatus::Stopped);
        drop(state);

        assert_eq!(starting.await.unwrap(), CommandOutcome::RoutersBusy);
    }

    #[tokio::test]
    async fn start_finishing_after_controller_shutdown_withdraws_its_routers() {
        let runner = ScriptedRunner::new("echo").slow_start(Duration::from_millis(100));
        let tally = runner.tally();
        let f = fixture(runner).await;

        assert!(f.lifecycle.send(LifecycleCommand::Start).await.is_accepted());
        f.lifecycle.shutdown();
        wait_for(&f.table, PluginStatus::Stopped).await;

        assert!(f.directory.is_empty());
        let entry = f.table.get(ConfigurationId(1)).await.unwrap();
        let state = entry.lock().await;
        assert!(state.inbound.is_none() && state.outbound.is_none());
        drop(state);
        assert_eq!(tally.stops.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn controller_shutdown_closes_the_mailbox() {
        let f = fixture(ScriptedRunner::new("echo")).await;
        f.lifecycle.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            f.lifecycle.send(LifecycleCommand::Start).await,
            CommandOutcome::NotRegistered
        );
    }
}
