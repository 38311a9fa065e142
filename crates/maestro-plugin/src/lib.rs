// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin orchestration for Maestro.
//!
//! This crate hosts the runtime side of the plugin system:
//! - [`RunnerRegistry`] resolves plugin definitions to runner implementations.
//! - [`PluginManager`] registers configurations, drives their lifecycles, and
//!   routes event messages to per-plugin [`router`] worker pools.
//! - [`ConfiguredCatalog`] and [`MemoryAuditLog`] provide the catalog and
//!   audit backends used when no external store is wired in.

mod aggregator;
pub mod audit;
pub mod catalog;
pub mod context;
pub mod directory;
mod dispatch;
pub mod lifecycle;
pub mod manager;
pub mod registry;
pub mod router;
mod supervisor;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::MemoryAuditLog;
pub use catalog::ConfiguredCatalog;
pub use context::{HostContext, HostServices};
pub use directory::RouterDirectory;
pub use lifecycle::CommandOutcome;
pub use manager::{ManagerSettings, PluginDescriptor, PluginManager};
pub use registry::{RunnerFactory, RunnerRegistry};
pub use router::{MessageRouter, RouterHandle};
pub use table::{PluginInfo, RegistrationEntry, RegistrationTable};
