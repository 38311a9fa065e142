// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contracts between the orchestration core and its collaborators.
//!
//! Runners are supplied by plugin authors; the audit sink and catalog store
//! are supplied by the host application. All traits use `#[async_trait]` for
//! dynamic dispatch compatibility.

pub mod audit;
pub mod catalog;
pub mod context;
pub mod runner;

pub use audit::AuditSink;
pub use catalog::CatalogStore;
pub use context::PluginContext;
pub use runner::{InterfaceConfig, PluginRunner, RunnerConfigurator, StaticDescriptor};
