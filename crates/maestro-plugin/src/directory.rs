// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory of running routers, addressed by name.
//!
//! A router publishes a liveness flag under `in-router-<id>` or
//! `out-router-<id>` while any of its workers is alive. Lifecycle controllers
//! probe the directory before accepting a START so two routers never serve the
//! same plugin direction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Default)]
pub struct RouterDirectory {
    routers: DashMap<String, watch::Receiver<bool>>,
}

impl RouterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a router under `name`. The returned guard withdraws it on drop.
    pub(crate) fn publish(self: &Arc<Self>, name: String) -> RouterLiveness {
        let (tx, rx) = watch::channel(true);
        if self.routers.insert(name.clone(), rx.clone()).is_some() {
            warn!(router = %name, "router name published twice");
        }
        debug!(router = %name, "router published");
        RouterLiveness {
            name,
            directory: Arc::clone(self),
            tx,
            rx,
        }
    }

    /// Whether a router is currently published under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.routers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    /// Probe whether the router named `name` is stopped.
    ///
    /// An absent name counts as stopped. A router that is still winding down
    /// is waited for up to `timeout`; an unanswered probe counts as running.
    pub async fn is_stopped(&self, name: &str, timeout: Duration) -> bool {
        let Some(mut liveness) = self.routers.get(name).map(|r| r.value().clone()) else {
            return true;
        };

        match tokio::time::timeout(timeout, liveness.wait_for(|running| !*running)).await {
            Ok(_) => true,
            Err(_) => {
                warn!(router = name, ?timeout, "router liveness probe timed out");
                false
            }
        }
    }
}

/// Published liveness of one router. Dropping it marks the router stopped.
pub(crate) struct RouterLiveness {
    name: String,
    directory: Arc<RouterDirectory>,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl RouterLiveness {
    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Drop for RouterLiveness {
    fn drop(&mut self) {
        // Withdraw before signalling so a waiting probe never races a
        // replacement router published under the same name.
        self.directory
            .routers
            .remove_if(&self.name, |_, published| published.same_channel(&self.rx));
        let _ = self.tx.send(false);
        debug!(router = %self.name, "router withdrawn");
    }
}
