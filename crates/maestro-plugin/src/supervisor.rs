// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault containment for runner hooks and router workers.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use maestro_core::{InterfaceConfig, PluginError};
use tokio::time::Instant;

/// Run a runner hook, turning a panic into a [`PluginError`].
pub(crate) async fn guarded<F>(hook: &str, fut: F) -> Result<(), PluginError>
where
    F: Future<Output = Result<(), PluginError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(PluginError::new(format!("{hook} panicked: {detail}")))
        }
    }
}

/// One-for-one restart budget of a router worker slot.
///
/// A slot may resume after at most `max_retries` escalated failures inside a
/// sliding `window`. One more and the slot is terminated.
#[derive(Debug)]
pub(crate) struct RestartBudget {
    max_retries: u32,
    window: Duration,
    failures: VecDeque<Instant>,
}

impl RestartBudget {
    pub(crate) fn new(config: &InterfaceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            window: config.retry_window,
            failures: VecDeque::new(),
        }
    }

    /// Record an escalated failure. Returns `true` if the slot may resume.
    pub(crate) fn record_failure(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        self.failures.push_back(now);
        self.failures.len() <= self.max_retries as usize
    }
}
