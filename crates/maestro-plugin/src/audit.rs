// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory audit sink.

use async_trait::async_trait;
use maestro_core::{AuditSink, ConfigurationId, MaestroError, PluginLogEntry};
use tokio::sync::Mutex;
use tracing::debug;

/// Audit sink keeping entries in memory, used when persistence is disabled.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<PluginLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded entry, oldest first.
    pub async fn entries(&self) -> Vec<PluginLogEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn entries_for(&self, id: ConfigurationId) -> Vec<PluginLogEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.configuration_id == id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, entry: PluginLogEntry) -> Result<(), MaestroError> {
        debug!(
            configuration_id = %entry.configuration_id,
            kind = %entry.kind,
            is_error = entry.is_error,
            "audit entry recorded"
        );
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
