// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration table of live plugin entries.

use std::collections::HashMap;
use std::sync::Arc;

use maestro_core::{
    ConfigurationId, DataType, FlowType, PluginRunner, PluginStatus, StaticDescriptor,
};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockWriteGuard};

use crate::lifecycle::LifecycleHandle;
use crate::router::RouterHandle;

/// Mutable part of a registration entry.
///
/// `status` is written only by the entry's lifecycle controller (transitional
/// states) and by the status aggregator (terminal states).
pub(crate) struct EntryState {
    pub status: PluginStatus,
    pub inbound: Option<RouterHandle>,
    pub outbound: Option<RouterHandle>,
}

impl EntryState {
    pub(crate) fn router(&self, flow: FlowType) -> Option<&RouterHandle> {
        match flow {
            FlowType::In => self.inbound.as_ref(),
            FlowType::Out => self.outbound.as_ref(),
        }
    }
}

/// One registered plugin configuration.
pub struct RegistrationEntry {
    configuration_id: ConfigurationId,
    name: String,
    runner: Arc<dyn PluginRunner>,
    lifecycle: LifecycleHandle,
    state: Mutex<EntryState>,
}

impl RegistrationEntry {
    pub(crate) fn new(
        configuration_id: ConfigurationId,
        name: String,
        runner: Arc<dyn PluginRunner>,
        lifecycle: LifecycleHandle,
    ) -> Self {
        Self {
            configuration_id,
            name,
            runner,
            lifecycle,
            state: Mutex::new(EntryState {
                status: PluginStatus::Stopped,
                inbound: None,
                outbound: None,
            }),
        }
    }

    pub fn configuration_id(&self) -> ConfigurationId {
        self.configuration_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runner(&self) -> &Arc<dyn PluginRunner> {
        &self.runner
    }

    pub(crate) fn lifecycle(&self) -> &LifecycleHandle {
        &self.lifecycle
    }

    pub fn descriptor(&self) -> &StaticDescriptor {
        self.runner.descriptor()
    }

    /// Whether broadcasts of `data_type` should reach this plugin.
    pub fn is_compatible(&self, data_type: &DataType) -> bool {
        self.runner.descriptor().supports(data_type)
    }

    pub async fn status(&self) -> PluginStatus {
        self.state.lock().await.status
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().await
    }

    pub async fn info(&self) -> PluginInfo {
        let state = self.state.lock().await;
        let descriptor = self.runner.descriptor();
        let mut data_types: Vec<DataType> =
            descriptor.supported_data_types.iter().cloned().collect();
        data_types.sort();
        PluginInfo {
            configuration_id: self.configuration_id,
            name: self.name.clone(),
            identifier: descriptor.identifier.clone(),
            version: descriptor.version.to_string(),
            status: state.status,
            inbound_workers: state.inbound.as_ref().map(RouterHandle::live_workers),
            outbound_workers: state.outbound.as_ref().map(RouterHandle::live_workers),
            supported_data_types: data_types,
            small_image: descriptor.small_image_key(),
            big_image: descriptor.big_image_key(),
        }
    }
}

/// Point-in-time view of a registration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub configuration_id: ConfigurationId,
    pub name: String,
    pub identifier: String,
    pub version: String,
    pub status: PluginStatus,
    /// Live workers of the inbound router, if one is running.
    pub inbound_workers: Option<usize>,
    pub outbound_workers: Option<usize>,
    pub supported_data_types: Vec<DataType>,
    pub small_image: String,
    pub big_image: String,
}

/// Map from configuration id to entry.
///
/// Structural changes (register, unregister) take the write lock; dispatch and
/// lifecycle commands only read it and then work on the entry itself.
#[derive(Default)]
pub struct RegistrationTable {
    entries: RwLock<HashMap<ConfigurationId, Arc<RegistrationEntry>>>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: ConfigurationId) -> Option<Arc<RegistrationEntry>> {
        self.entries.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: ConfigurationId) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    /// Snapshot of every entry, ordered by configuration id.
    pub async fn entries(&self) -> Vec<Arc<RegistrationEntry>> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by_key(|e| e.configuration_id);
        entries
    }

    pub async fn ids(&self) -> Vec<ConfigurationId> {
        let mut ids: Vec<_> = self.entries.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot info of every entry.
    pub async fn list_all(&self) -> Vec<PluginInfo> {
        let mut infos = Vec::new();
        for entry in self.entries().await {
            infos.push(entry.info().await);
        }
        infos
    }

    /// Exclusive access for register and unregister.
    pub(crate) async fn structural(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<ConfigurationId, Arc<RegistrationEntry>>> {
        self.entries.write().await
    }
}
