// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Maestro plugin orchestrator.

use thiserror::Error;

use crate::types::{ConfigurationId, PluginStatus};

/// The primary error type used across the orchestration core.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No runner implementation was registered for a plugin definition.
    #[error("no runner registered for plugin definition `{identifier}`")]
    RunnerNotFound { identifier: String },

    /// The runner produced for a definition declares a different identifier.
    #[error(
        "plugin definition `{expected}` resolved to an implementation declaring `{actual}`"
    )]
    IdentifierMismatch { expected: String, actual: String },

    /// The plugin configuration is unknown or not registered.
    #[error("plugin {id} not found")]
    PluginNotFound { id: ConfigurationId },

    /// A running plugin cannot be unregistered.
    #[error("cannot unregister plugin {id} while it is {status}")]
    NotStopped {
        id: ConfigurationId,
        status: PluginStatus,
    },

    /// The runner init hook failed; the plugin was not registered.
    #[error("unable to initialize plugin {id}: {source}")]
    Initialization {
        id: ConfigurationId,
        source: PluginError,
    },

    /// A posted event message failed its consistency check.
    #[error("invalid event message: {0}")]
    InvalidMessage(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure reported by a plugin runner hook or message handler.
///
/// This is the only error type a runner is allowed to surface. The core never
/// propagates it to callers of unrelated plugins.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PluginError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PluginError {
    /// Create a plugin error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a plugin error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The human-readable failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}
