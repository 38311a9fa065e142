// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only sink for plugin lifecycle and event-handling records.

use async_trait::async_trait;

use crate::error::MaestroError;
use crate::types::PluginLogEntry;

#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    /// Append one entry. Implementations must not reorder or drop entries.
    async fn record(&self, entry: PluginLogEntry) -> Result<(), MaestroError>;
}
