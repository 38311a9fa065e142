// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status aggregator.
//!
//! Lifecycle transitions report their terminal outcome here instead of
//! writing it themselves. The aggregator applies reports in arrival order, so
//! a plugin's final status is always the outcome of its most recent
//! transition.

use std::sync::Arc;

use maestro_core::{ConfigurationId, PluginStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::table::RegistrationTable;

const REPORT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StatusReport {
    pub configuration_id: ConfigurationId,
    pub outcome: PluginStatus,
}

/// Sending half handed to lifecycle controllers.
#[derive(Clone)]
pub(crate) struct StatusReporter {
    tx: mpsc::Sender<StatusReport>,
}

impl StatusReporter {
    pub(crate) async fn report(&self, configuration_id: ConfigurationId, outcome: PluginStatus) {
        let report = StatusReport {
            configuration_id,
            outcome,
        };
        if self.tx.send(report).await.is_err() {
            warn!(%configuration_id, %outcome, "status aggregator is gone, report dropped");
        }
    }
}

pub(crate) struct StatusAggregator {
    reporter: StatusReporter,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StatusAggregator {
    pub(crate) fn spawn(table: Arc<RegistrationTable>) -> Self {
        let (tx, rx) = mpsc::channel(REPORT_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(table, rx, cancel.clone()));
        info!("status aggregator started");
        Self {
            reporter: StatusReporter { tx },
            cancel,
            task,
        }
    }

    pub(crate) fn reporter(&self) -> StatusReporter {
        self.reporter.clone()
    }

    /// Apply pending reports, then stop.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "status aggregator task failed");
        }
        info!("status aggregator stopped");
    }
}

async fn run(
    table: Arc<RegistrationTable>,
    mut reports: mpsc::Receiver<StatusReport>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            report = reports.recv() => match report {
                Some(report) => apply(&table, report).await,
                None => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(report) = reports.try_recv() {
                    apply(&table, report).await;
                }
                break;
            }
        }
    }
}

async fn apply(table: &RegistrationTable, report: StatusReport) {
    let StatusReport {
        configuration_id,
        outcome,
    } = report;

    let Some(entry) = table.get(configuration_id).await else {
        warn!(%configuration_id, %outcome, "status report for an unregistered plugin");
        return;
    };

    match outcome {
        PluginStatus::Started | PluginStatus::StartFailed | PluginStatus::Stopped => {
            let mut state = entry.lock().await;
            debug!(%configuration_id, from = %state.status, to = %outcome, "applying status report");
            state.status = outcome;
            info!(%configuration_id, status = %outcome, "plugin status updated");
        }
        PluginStatus::Starting | PluginStatus::Stopping => {
            warn!(%configuration_id, %outcome, "ignoring non-terminal status report");
        }
    }
}
