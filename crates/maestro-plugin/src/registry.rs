// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runner registry mapping definition identifiers to runner factories.
//!
//! The registry is populated by the extension-loading step before the manager
//! starts and is read-only afterwards, so it can be shared behind an `Arc` and
//! resolved from any task.

use std::collections::HashMap;
use std::sync::Arc;

use maestro_core::{MaestroError, PluginDefinition, PluginRunner, StaticDescriptor};
use tracing::{error, info, warn};

/// Produces fresh runner instances for one plugin definition.
pub trait RunnerFactory: Send + Sync {
    fn create(&self) -> Arc<dyn PluginRunner>;
}

impl<F> RunnerFactory for F
where
    F: Fn() -> Arc<dyn PluginRunner> + Send + Sync,
{
    fn create(&self) -> Arc<dyn PluginRunner> {
        self()
    }
}

/// Registry of loaded runner implementations, keyed by definition identifier.
pub struct RunnerRegistry {
    factories: HashMap<String, Box<dyn RunnerFactory>>,
}

impl RunnerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register the factory for a definition identifier, replacing any previous one.
    pub fn register(&mut self, identifier: impl Into<String>, factory: impl RunnerFactory + 'static) {
        let identifier = identifier.into();
        if self
            .factories
            .insert(identifier.clone(), Box::new(factory))
            .is_some()
        {
            warn!(identifier = %identifier, "runner factory replaced");
        } else {
            info!(identifier = %identifier, "runner implementation loaded");
        }
    }

    /// Whether an implementation is loaded for the identifier.
    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// Loaded identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate the runner for a definition.
    ///
    /// Fails when no implementation is loaded under the definition identifier,
    /// or when the instance declares a different identifier than the
    /// definition it was obtained from.
    pub fn resolve(
        &self,
        definition: &PluginDefinition,
    ) -> Result<Arc<dyn PluginRunner>, MaestroError> {
        let factory = self.factories.get(&definition.identifier).ok_or_else(|| {
            MaestroError::RunnerNotFound {
                identifier: definition.identifier.clone(),
            }
        })?;

        let runner = factory.create();
        let declared = &runner.descriptor().identifier;
        if *declared != definition.identifier {
            error!(
                expected = %definition.identifier,
                actual = %declared,
                "runner identifier does not match its definition"
            );
            return Err(MaestroError::IdentifierMismatch {
                expected: definition.identifier.clone(),
                actual: declared.clone(),
            });
        }
        Ok(runner)
    }

    /// Static descriptor of a definition, from a throwaway instance.
    pub fn descriptor(&self, definition: &PluginDefinition) -> Option<StaticDescriptor> {
        match self.resolve(definition) {
            Ok(runner) => Some(runner.descriptor().clone()),
            Err(e) => {
                error!(identifier = %definition.identifier, error = %e, "unable to instantiate plugin");
                None
            }
        }
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}
