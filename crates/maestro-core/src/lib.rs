// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Maestro plugin orchestrator.
//!
//! This crate provides the shared types, the error taxonomy, and the trait
//! contracts (runner, plugin context, audit sink, catalog store) used by the
//! orchestration core and by plugin implementations.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{MaestroError, PluginError};
pub use types::{
    ConfigurationId, DataType, EventMessage, FlowType, MessageKind, PluginConfiguration,
    PluginDefinition, PluginLogEntry, PluginLogKind, PluginStatus,
};

pub use traits::{
    AuditSink, CatalogStore, InterfaceConfig, PluginContext, PluginRunner, RunnerConfigurator,
    StaticDescriptor,
};
