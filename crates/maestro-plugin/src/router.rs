// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-plugin message routers.
//!
//! A router serves one direction of one plugin with a fixed pool of workers.
//! Each worker drains its own bounded queue in arrival order; the router hands
//! out messages round-robin, skipping full or terminated slots.
//!
//! Failure policy per message:
//! - a failed NORMAL message is replaced by exactly one RESYNC request,
//!   re-enqueued on the same router, and the worker carries on;
//! - a failed RESYNC or ADDRESSED message is audited and escalated to the
//!   slot's [`RestartBudget`]. The worker resumes while the budget allows it,
//!   otherwise the slot terminates and its siblings keep serving.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use maestro_core::{
    AuditSink, ConfigurationId, EventMessage, FlowType, InterfaceConfig, MessageKind,
    PluginError, PluginLogEntry, PluginRunner,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::directory::RouterDirectory;
use crate::supervisor::{RestartBudget, guarded};

/// Parameters for spawning one router.
pub struct MessageRouter {
    pub configuration_id: ConfigurationId,
    pub flow: FlowType,
    pub runner: Arc<dyn PluginRunner>,
    pub interface: InterfaceConfig,
    pub audit: Arc<dyn AuditSink>,
    /// Capacity of each worker queue.
    pub mailbox: usize,
}

impl MessageRouter {
    /// Spawn the worker pool and publish the router in `directory`.
    pub fn spawn(self, directory: &Arc<RouterDirectory>) -> RouterHandle {
        let name = self.flow.router_name(self.configuration_id);
        let liveness = directory.publish(name.clone());
        let running = liveness.subscribe();
        let cancel = CancellationToken::new();

        let pool_size = self.interface.pool_size.max(1);
        let mut slots = Vec::with_capacity(pool_size);
        let mut inboxes = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let (tx, rx) = mpsc::channel(self.mailbox.max(1));
            slots.push(tx);
            inboxes.push(rx);
        }
        let queue = Arc::new(RouterQueue {
            name: name.clone(),
            slots,
            next: AtomicUsize::new(0),
        });

        let mut workers = JoinSet::new();
        for (slot, inbox) in inboxes.into_iter().enumerate() {
            let worker = RouterWorker {
                slot,
                configuration_id: self.configuration_id,
                flow: self.flow,
                runner: Arc::clone(&self.runner),
                audit: Arc::clone(&self.audit),
                queue: Arc::downgrade(&queue),
            };
            workers.spawn(worker.supervise(
                inbox,
                RestartBudget::new(&self.interface),
                cancel.clone(),
            ));
        }

        let router = name.clone();
        tokio::spawn(async move {
            while workers.join_next().await.is_some() {}
            info!(router = %router, "router stopped");
            drop(liveness);
        });

        info!(
            router = %name,
            configuration_id = %self.configuration_id,
            flow = %self.flow,
            workers = pool_size,
            "router started"
        );

        RouterHandle {
            name,
            flow: self.flow,
            queue,
            cancel,
            running,
        }
    }
}

/// Round-robin hand-off over the worker queues of one router.
struct RouterQueue {
    name: String,
    slots: Vec<mpsc::Sender<EventMessage>>,
    next: AtomicUsize,
}

impl RouterQueue {
    fn enqueue(&self, message: EventMessage) -> Result<(), EventMessage> {
        let len = self.slots.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let mut message = message;
        for offset in 0..len {
            match self.slots[(start + offset) % len].try_send(message) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(m))
                | Err(mpsc::error::TrySendError::Closed(m)) => message = m,
            }
        }
        Err(message)
    }

    fn live_workers(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_closed()).count()
    }
}

/// Handle owned by a registration entry while its plugin is started.
pub struct RouterHandle {
    name: String,
    flow: FlowType,
    queue: Arc<RouterQueue>,
    cancel: CancellationToken,
    running: watch::Receiver<bool>,
}

impl RouterHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flow(&self) -> FlowType {
        self.flow
    }

    pub fn pool_size(&self) -> usize {
        self.queue.slots.len()
    }

    /// Workers that have not been terminated by their supervisor.
    pub fn live_workers(&self) -> usize {
        self.queue.live_workers()
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Hand a message to the next worker. Returns `false` if it was dropped.
    pub fn route(&self, message: EventMessage) -> bool {
        match self.queue.enqueue(message) {
            Ok(()) => true,
            Err(message) => {
                warn!(
                    router = %self.name,
                    transaction_id = %message.transaction_id,
                    "no router worker can accept the message, dropping it"
                );
                false
            }
        }
    }

    /// Stop the workers once their in-flight message is done.
    ///
    /// Queued messages are discarded. Returns `false` if the workers were
    /// still running when `timeout` elapsed.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, self.running.wait_for(|running| !*running)).await {
            Ok(_) => true,
            Err(_) => {
                warn!(router = %self.name, ?timeout, "router did not stop in time");
                false
            }
        }
    }
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("name", &self.name)
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

enum WorkerExit {
    Stopped,
    Escalated(PluginError),
}

struct RouterWorker {
    slot: usize,
    configuration_id: ConfigurationId,
    flow: FlowType,
    runner: Arc<dyn PluginRunner>,
    audit: Arc<dyn AuditSink>,
    queue: Weak<RouterQueue>,
}

impl RouterWorker {
    async fn supervise(
        self,
        mut inbox: mpsc::Receiver<EventMessage>,
        mut budget: RestartBudget,
        cancel: CancellationToken,
    ) {
        debug!(configuration_id = %self.configuration_id, flow = %self.flow, slot = self.slot, "router worker started");
        loop {
            match self.run(&mut inbox, &cancel).await {
                WorkerExit::Stopped => break,
                WorkerExit::Escalated(err) => {
                    if budget.record_failure(Instant::now()) {
                        warn!(
                            configuration_id = %self.configuration_id,
                            flow = %self.flow,
                            slot = self.slot,
                            error = %err,
                            "router worker resumed after failure"
                        );
                    } else {
                        error!(
                            configuration_id = %self.configuration_id,
                            flow = %self.flow,
                            slot = self.slot,
                            error = %err,
                            "router worker exceeded its retry budget and was terminated"
                        );
                        break;
                    }
                }
            }
        }
        debug!(configuration_id = %self.configuration_id, flow = %self.flow, slot = self.slot, "router worker stopped");
    }

    async fn run(
        &self,
        inbox: &mut mpsc::Receiver<EventMessage>,
        cancel: &CancellationToken,
    ) -> WorkerExit {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WorkerExit::Stopped,
                message = inbox.recv() => match message {
                    Some(message) => message,
                    None => return WorkerExit::Stopped,
                },
            };
            if let Err(err) = self.process(message).await {
                return WorkerExit::Escalated(err);
            }
        }
    }

    async fn process(&self, message: EventMessage) -> Result<(), PluginError> {
        info!(
            transaction_id = %message.transaction_id,
            configuration_id = %self.configuration_id,
            flow = %self.flow,
            kind = %message.kind,
            data_type = %message.data_type,
            "[BEGIN] handling event message"
        );

        let outcome = match self.flow {
            FlowType::In => guarded("inbound handler", self.runner.handle_in_message(&message)).await,
            FlowType::Out => {
                guarded("outbound handler", self.runner.handle_out_message(&message)).await
            }
        };

        let err = match outcome {
            Ok(()) => {
                info!(
                    transaction_id = %message.transaction_id,
                    configuration_id = %self.configuration_id,
                    "[SUCCESS] event message handled"
                );
                return Ok(());
            }
            Err(err) => err,
        };

        if message.kind == MessageKind::Normal {
            warn!(
                transaction_id = %message.transaction_id,
                configuration_id = %self.configuration_id,
                error = %err,
                "[FAILURE] event message failed, requesting a resync"
            );
            self.reissue(message.resync());
            return Ok(());
        }

        let text = format!(
            "[FAILURE] transaction {} for plugin {} failed",
            message.transaction_id, self.configuration_id
        );
        error!(
            transaction_id = %message.transaction_id,
            configuration_id = %self.configuration_id,
            kind = %message.kind,
            error = %err,
            "{text}"
        );
        let entry = PluginLogEntry::event_handling(
            self.configuration_id,
            &message,
            format!("{text}: {err}\nmessage was: {}", message.summary()),
        );
        if let Err(e) = self.audit.record(entry).await {
            warn!(configuration_id = %self.configuration_id, error = %e, "failed to record audit entry");
        }
        Err(err)
    }

    fn reissue(&self, resync: EventMessage) {
        let Some(queue) = self.queue.upgrade() else {
            debug!(transaction_id = %resync.transaction_id, "router gone, resync dropped");
            return;
        };
        if let Err(message) = queue.enqueue(resync) {
            warn!(
                router = %queue.name,
                transaction_id = %message.transaction_id,
                "router saturated, resync dropped"
            );
        }
    }
}
