// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent plugin audit log.
//!
//! Entries are append-only: the core writes them on lifecycle transitions and
//! on escalated event-handling failures, and nothing ever updates them.

use std::str::FromStr;

use async_trait::async_trait;
use maestro_core::{
    AuditSink, ConfigurationId, DataType, MaestroError, MessageKind, PluginLogEntry,
    PluginLogKind,
};
use rusqlite::params;
use rusqlite::types::Type;
use tracing::debug;

use crate::database::{Database, map_tr_err};

/// [`AuditSink`] writing to the `plugin_log` table.
#[derive(Clone)]
pub struct SqlitePluginLog {
    db: Database,
}

impl SqlitePluginLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Most recent entries of a plugin, newest first.
    pub async fn recent(
        &self,
        id: ConfigurationId,
        limit: usize,
    ) -> Result<Vec<PluginLogEntry>, MaestroError> {
        let configuration_id = id.0 as i64;
        let limit = limit as i64;
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, configuration_id, kind, is_error, message, transaction_id,
                            message_kind, data_type, internal_id, external_id, created_at
                     FROM plugin_log WHERE configuration_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![configuration_id, limit], row_to_entry)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Number of error entries recorded for a plugin.
    pub async fn error_count(&self, id: ConfigurationId) -> Result<u64, MaestroError> {
        let configuration_id = id.0 as i64;
        self.db
            .connection()
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM plugin_log WHERE configuration_id = ?1 AND is_error = 1",
                    params![configuration_id],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(map_tr_err)
    }
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<PluginLogEntry> {
    let kind: String = row.get(2)?;
    let message_kind: Option<String> = row.get(6)?;
    let data_type: Option<String> = row.get(7)?;
    Ok(PluginLogEntry {
        id: row.get(0)?,
        configuration_id: ConfigurationId(row.get::<_, i64>(1)? as u64),
        kind: parse_column::<PluginLogKind>(2, &kind)?,
        is_error: row.get(3)?,
        message: row.get(4)?,
        transaction_id: row.get(5)?,
        message_kind: message_kind
            .as_deref()
            .map(|k| parse_column::<MessageKind>(6, k))
            .transpose()?,
        data_type: data_type.map(DataType),
        internal_id: row.get(8)?,
        external_id: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[async_trait]
impl AuditSink for SqlitePluginLog {
    async fn record(&self, entry: PluginLogEntry) -> Result<(), MaestroError> {
        let configuration_id = entry.configuration_id;
        let kind = entry.kind;
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO plugin_log (id, configuration_id, kind, is_error, message,
                     transaction_id, message_kind, data_type, internal_id, external_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        entry.id,
                        entry.configuration_id.0 as i64,
                        entry.kind.to_string(),
                        entry.is_error,
                        entry.message,
                        entry.transaction_id,
                        entry.message_kind.map(|k| k.to_string()),
                        entry.data_type.map(|d| d.0),
                        entry.internal_id,
                        entry.external_id,
                        entry.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(%configuration_id, %kind, "plugin log entry stored");
        Ok(())
    }
}
