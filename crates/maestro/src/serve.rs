// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `maestro serve` command implementation.
//!
//! Opens the plugin log, loads the built-in runners, starts the plugin
//! manager, optionally replays a file of event messages, and then runs until
//! a shutdown signal arrives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use maestro_config::MaestroConfig;
use maestro_core::{AuditSink, EventMessage, FlowType, MaestroError};
use maestro_plugin::{ConfiguredCatalog, ManagerSettings, MemoryAuditLog, PluginManager};
use maestro_storage::{Database, SqlitePluginLog};
use tracing::{debug, info, warn};

use crate::builtin::builtin_registry;
use crate::shutdown;

/// Options of the `serve` subcommand.
#[derive(Debug, Default)]
pub struct ServeOptions {
    pub events: Option<PathBuf>,
    pub inbound: bool,
}

/// Outcome of replaying an events file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub posted: usize,
    /// Routers that accepted a replayed message, summed over all lines.
    pub deliveries: usize,
    pub skipped: usize,
}

/// Runs the `maestro serve` command.
pub async fn run_serve(config: MaestroConfig, options: ServeOptions) -> Result<(), MaestroError> {
    init_tracing(&config.manager.log_level);

    info!("starting maestro serve");

    let mut database = None;
    let audit: Arc<dyn AuditSink> = if config.storage.audit_enabled {
        let db = Database::open(&config.storage.database_path).await?;
        info!(path = %config.storage.database_path, "plugin log opened");
        database = Some(db.clone());
        Arc::new(SqlitePluginLog::new(db))
    } else {
        info!("plugin log persistence disabled, keeping entries in memory");
        Arc::new(MemoryAuditLog::new())
    };

    let manager = PluginManager::new(
        Arc::new(builtin_registry(&config)),
        Arc::new(ConfiguredCatalog::from_config(&config)),
        audit,
    )
    .with_settings(ManagerSettings::from(&config.manager));

    let cancel = shutdown::install_signal_handler();

    manager.start_up().await?;

    if let Some(path) = &options.events {
        let flow = if options.inbound {
            FlowType::In
        } else {
            FlowType::Out
        };
        let summary = replay_events(&manager, path, flow).await?;
        info!(
            path = %path.display(),
            posted = summary.posted,
            deliveries = summary.deliveries,
            skipped = summary.skipped,
            "event replay finished"
        );
    }

    info!("maestro ready, waiting for shutdown signal");
    cancel.cancelled().await;

    manager.shutdown().await;
    if let Some(db) = database {
        db.close().await?;
    }

    info!("maestro serve shutdown complete");
    Ok(())
}

/// Posts every JSON-lines event message of `path` in the `flow` direction.
///
/// Blank lines and lines starting with `#` are ignored. Lines that do not
/// parse or are rejected by the manager are logged and counted as skipped.
pub async fn replay_events(
    manager: &PluginManager,
    path: &Path,
    flow: FlowType,
) -> Result<ReplaySummary, MaestroError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MaestroError::Config(format!("cannot read events file {}: {e}", path.display())))?;

    let mut summary = ReplaySummary::default();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_number = index + 1;
        let message: EventMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(line = line_number, error = %e, "skipping malformed event");
                summary.skipped += 1;
                continue;
            }
        };
        let posted = match flow {
            FlowType::In => manager.post_in_message(message).await,
            FlowType::Out => manager.post_out_message(message).await,
        };
        match posted {
            Ok(recipients) => {
                debug!(line = line_number, recipients, "event posted");
                summary.posted += 1;
                summary.deliveries += recipients;
            }
            Err(e) => {
                warn!(line = line_number, error = %e, "event rejected");
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}

/// Initialize the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("maestro={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
