//! Live change feed subscriptions, one per (entity kind, workspace).
//!
//! Each pairing runs as its own task. The task opens the feed, pulls the full
//! scope to cover whatever happened before the feed was live, then applies
//! events in order. Lost feeds are reopened with exponential backoff until the
//! retry ceiling, after which the pairing reports [`Connectivity::Degraded`]
//! and waits to be stopped.

use futures::{Stream, StreamExt};
use hive_config::SyncConfig;
use hive_remote::{PullScope, RemoteError, RemoteSyncClient};
use hive_storage::{EntityKind, WorkspaceId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::{record_degraded, record_reconnect};
use crate::reconcile::Reconciler;

/// Feed state of one pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
    Degraded,
}

/// Backoff and retry ceiling of the supervisor loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl From<&SyncConfig> for Backoff {
    fn from(config: &SyncConfig) -> Self {
        Self {
            initial: config.initial_backoff(),
            max: config.max_backoff(),
            max_retries: config.max_retries,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

type Pairing = (EntityKind, WorkspaceId);

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
    connectivity: watch::Receiver<Connectivity>,
}

impl Running {
    async fn shut_down(self) {
        self.stop.send_replace(true);
        if let Err(e) = self.handle.await {
            error!("Subscription task failed: {}", e);
        }
    }
}

/// Owns every running subscription and guarantees at most one per pairing.
pub struct SubscriptionManager {
    remote: RemoteSyncClient,
    reconciler: Reconciler,
    backoff: Backoff,
    running: Mutex<HashMap<Pairing, Running>>,
}

impl SubscriptionManager {
    pub fn new(remote: RemoteSyncClient, reconciler: Reconciler, backoff: Backoff) -> Self {
        Self {
            remote,
            reconciler,
            backoff,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Start the subscription of `kind` in `scope.workspace_id`.
    ///
    /// A subscription already running for the pairing is stopped, and its task
    /// awaited, before the replacement is spawned.
    pub async fn start(&self, kind: EntityKind, scope: PullScope) -> watch::Receiver<Connectivity> {
        let pairing = (kind, scope.workspace_id);
        let mut running = self.running.lock().await;
        if let Some(previous) = running.remove(&pairing) {
            debug!(kind = %kind, workspace = %scope.workspace_id, "replacing subscription");
            previous.shut_down().await;
        }

        let (stop, stop_rx) = watch::channel(false);
        let (status, connectivity) = watch::channel(Connectivity::Connecting);
        let supervisor = Supervisor {
            kind,
            scope,
            remote: self.remote.clone(),
            reconciler: self.reconciler.clone(),
            backoff: self.backoff,
            stop: stop_rx,
            status,
        };
        let handle = tokio::spawn(supervisor.run());
        info!(kind = %kind, workspace = %scope.workspace_id, "subscription started");

        running.insert(
            pairing,
            Running {
                stop,
                handle,
                connectivity: connectivity.clone(),
            },
        );
        connectivity
    }

    /// Stop one pairing and wait for its task to finish. Returns whether it was running.
    ///
    /// The map stays locked until the task is gone, so a concurrent `start` of
    /// the same pairing cannot spawn alongside it.
    pub async fn stop(&self, kind: EntityKind, workspace_id: &WorkspaceId) -> bool {
        let mut running = self.running.lock().await;
        match running.remove(&(kind, *workspace_id)) {
            Some(previous) => {
                previous.shut_down().await;
                info!(kind = %kind, workspace = %workspace_id, "subscription stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every pairing. All tasks have finished when this returns.
    pub async fn stop_all(&self) {
        let mut running = self.running.lock().await;
        let drained: Vec<_> = running.drain().collect();
        for (_, previous) in &drained {
            previous.stop.send_replace(true);
        }
        for ((kind, workspace_id), previous) in drained {
            previous.shut_down().await;
            info!(kind = %kind, workspace = %workspace_id, "subscription stopped");
        }
    }

    /// Pairings with a running task.
    pub async fn active(&self) -> Vec<(EntityKind, WorkspaceId)> {
        let mut active: Vec<_> = self.running.lock().await.keys().copied().collect();
        active.sort();
        active
    }

    pub async fn connectivity(
        &self,
        kind: EntityKind,
        workspace_id: &WorkspaceId,
    ) -> Option<watch::Receiver<Connectivity>> {
        self.running
            .lock()
            .await
            .get(&(kind, *workspace_id))
            .map(|r| r.connectivity.clone())
    }
}

struct Supervisor {
    kind: EntityKind,
    scope: PullScope,
    remote: RemoteSyncClient,
    reconciler: Reconciler,
    backoff: Backoff,
    stop: watch::Receiver<bool>,
    status: watch::Sender<Connectivity>,
}

enum Exit {
    Stopped,
    Lost,
}

impl Supervisor {
    async fn run(mut self) {
        let mut attempt = 0u32;
        loop {
            let opened = tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => return,
                opened = self.remote.subscribe(self.kind, &self.scope.workspace_id) => opened,
            };

            match opened {
                Ok(stream) => {
                    attempt = 0;
                    self.status.send_replace(Connectivity::Live);
                    debug!(kind = %self.kind, workspace = %self.scope.workspace_id, "feed live");
                    let mut stop = self.stop.clone();
                    tokio::select! {
                        biased;
                        _ = stopped(&mut stop) => return,
                        _ = self.resync() => {}
                    }
                    match self.consume(stream).await {
                        Exit::Stopped => return,
                        Exit::Lost => {
                            warn!(kind = %self.kind, workspace = %self.scope.workspace_id, "Change feed ended");
                        }
                    }
                }
                Err(RemoteError::NotConfigured) => {
                    info!(kind = %self.kind, "No remote store configured; live sync disabled");
                    self.status.send_replace(Connectivity::Degraded);
                    stopped(&mut self.stop).await;
                    return;
                }
                Err(e) => {
                    warn!(kind = %self.kind, workspace = %self.scope.workspace_id, "Failed to open change feed: {}", e);
                }
            }

            attempt += 1;
            if attempt > self.backoff.max_retries {
                error!(
                    kind = %self.kind,
                    workspace = %self.scope.workspace_id,
                    "Change feed gave up after {} attempts",
                    self.backoff.max_retries
                );
                record_degraded(self.kind);
                self.status.send_replace(Connectivity::Degraded);
                stopped(&mut self.stop).await;
                return;
            }

            let delay = self.backoff.delay(attempt);
            info!(kind = %self.kind, "Change feed reconnecting in {:?} (attempt {})", delay, attempt);
            self.status
                .send_replace(Connectivity::Reconnecting { attempt });
            record_reconnect(self.kind);
            tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn consume<S>(&mut self, mut stream: S) -> Exit
    where
        S: Stream<Item = hive_events::RawChange> + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => return Exit::Stopped,
                next = stream.next() => next,
            };
            let Some(raw) = next else {
                return Exit::Lost;
            };
            // Failures are counted and logged by the reconciler; the feed goes on.
            let _ = self.reconciler.reconcile(self.kind, &self.scope, &raw).await;
        }
    }

    /// Bulk pull of the pairing's scope; covers changes made while the feed was down.
    async fn resync(&self) {
        match self.remote.pull_all(self.kind, &self.scope).await {
            Ok(rows) => {
                if let Err(e) = self
                    .reconciler
                    .apply_pull(self.kind, &self.scope, rows)
                    .await
                {
                    warn!(kind = %self.kind, "Failed to apply resync pull: {}", e);
                }
            }
            Err(e) => warn!(kind = %self.kind, "Resync pull failed: {}", e),
        }
    }
}

/// Resolves once stop is signalled. A dropped sender counts as stop.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let backoff = Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            max_retries: 10,
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_from_config() {
        let backoff = Backoff::default();
        assert_eq!(backoff.initial, Duration::from_secs(1));
        assert_eq!(backoff.max, Duration::from_secs(60));
        assert_eq!(backoff.max_retries, 8);
    }
}
