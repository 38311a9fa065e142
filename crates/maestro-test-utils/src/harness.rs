// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a started [`PluginManager`] over mock runners, a
//! configuration-backed catalog, and either an in-memory or a temp SQLite
//! audit log.

use std::sync::Arc;
use std::time::Duration;

use maestro_config::MaestroConfig;
use maestro_config::model::{DefinitionConfig, PluginConfigurationConfig};
use maestro_core::{AuditSink, ConfigurationId, MaestroError, PluginLogEntry, PluginStatus};
use maestro_plugin::{
    ConfiguredCatalog, ManagerSettings, MemoryAuditLog, PluginManager, RunnerRegistry,
};
use maestro_storage::{Database, SqlitePluginLog};

use crate::mock_runner::MockRunner;

const AUDIT_READ_LIMIT: usize = 10_000;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    runners: Vec<MockRunner>,
    unloaded: Vec<String>,
    configurations: Vec<PluginConfigurationConfig>,
    settings: ManagerSettings,
    sqlite: bool,
    start: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            runners: Vec::new(),
            unloaded: Vec::new(),
            configurations: Vec::new(),
            settings: ManagerSettings {
                probe_timeout: Duration::from_millis(500),
                shutdown_timeout: Duration::from_secs(2),
                ..ManagerSettings::default()
            },
            sqlite: false,
            start: true,
        }
    }

    /// Load a runner implementation and declare its definition.
    pub fn with_runner(mut self, runner: &MockRunner) -> Self {
        self.runners.push(runner.clone());
        self
    }

    /// Declare a definition that has no loaded implementation.
    pub fn with_unloaded_definition(mut self, identifier: &str) -> Self {
        self.unloaded.push(identifier.to_string());
        self
    }

    /// Add a plugin configuration of `definition`.
    pub fn with_configuration(mut self, id: u64, definition: &str, autostart: bool) -> Self {
        self.configurations.push(PluginConfigurationConfig {
            id,
            name: format!("{definition} #{id}"),
            definition: definition.to_string(),
            autostart,
            available: true,
            properties: serde_json::Map::new(),
        });
        self
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Record audit entries in a temp SQLite database instead of memory.
    pub fn with_sqlite_audit(mut self) -> Self {
        self.sqlite = true;
        self
    }

    /// Build without calling `start_up`.
    pub fn not_started(mut self) -> Self {
        self.start = false;
        self
    }

    /// Build the harness and start the manager.
    pub async fn build(self) -> Result<TestHarness, MaestroError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| MaestroError::Storage { source: e.into() })?;

        let mut config = MaestroConfig::default();
        config.definitions = self
            .runners
            .iter()
            .map(|r| r.identifier().to_string())
            .chain(self.unloaded.iter().cloned())
            .map(|identifier| DefinitionConfig {
                identifier,
                implementation: String::new(),
                available: true,
            })
            .collect();
        config.configurations = self.configurations;

        let mut registry = RunnerRegistry::new();
        for runner in &self.runners {
            registry.register(runner.identifier(), runner.factory());
        }

        let mut memory_audit = None;
        let mut plugin_log = None;
        let audit: Arc<dyn AuditSink> = if self.sqlite {
            let db_path = temp_dir.path().join("test.db");
            let db = Database::open(&db_path.to_string_lossy()).await?;
            let log = SqlitePluginLog::new(db);
            plugin_log = Some(log.clone());
            Arc::new(log)
        } else {
            let memory = Arc::new(MemoryAuditLog::new());
            memory_audit = Some(Arc::clone(&memory));
            memory
        };

        let manager = Arc::new(
            PluginManager::new(
                Arc::new(registry),
                Arc::new(ConfiguredCatalog::from_config(&config)),
                audit,
            )
            .with_settings(self.settings),
        );
        if self.start {
            manager.start_up().await?;
        }

        Ok(TestHarness {
            manager,
            config,
            memory_audit,
            plugin_log,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment around one plugin manager.
pub struct TestHarness {
    pub manager: Arc<PluginManager>,
    /// Configuration the catalog was built from.
    pub config: MaestroConfig,
    memory_audit: Option<Arc<MemoryAuditLog>>,
    plugin_log: Option<SqlitePluginLog>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Poll until the plugin reports `status`, or fail after `timeout`.
    pub async fn wait_for_status(
        &self,
        id: u64,
        status: PluginStatus,
        timeout: Duration,
    ) -> Result<(), MaestroError> {
        let id = ConfigurationId(id);
        let reached = tokio::time::timeout(timeout, async {
            loop {
                if self.manager.status(id).await.ok() == Some(status) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        reached.map_err(|_| MaestroError::Timeout { duration: timeout })
    }

    /// Let routers drain their queues.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    /// Audit entries of one plugin, oldest first.
    pub async fn audit_entries(&self, id: u64) -> Result<Vec<PluginLogEntry>, MaestroError> {
        let id = ConfigurationId(id);
        if let Some(memory) = &self.memory_audit {
            return Ok(memory.entries_for(id).await);
        }
        match &self.plugin_log {
            Some(log) => {
                let mut entries = log.recent(id, AUDIT_READ_LIMIT).await?;
                entries.reverse();
                Ok(entries)
            }
            None => Ok(Vec::new()),
        }
    }
}
