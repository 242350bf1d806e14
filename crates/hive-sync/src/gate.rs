//! Ties live subscriptions to the session.
//!
//! The gate follows an identity stream and keeps the Task, Notification and
//! Remark feeds bound to the current (user, workspace). When that pair changes
//! every old subscription is stopped and awaited before any new one starts.

use futures::{Stream, StreamExt};
use hive_storage::EntityKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::session::{Identity, SessionKey};
use crate::subscription::{stopped, SubscriptionManager};

/// Kinds kept live while a session is active.
pub const LIVE_KINDS: [EntityKind; 3] = [
    EntityKind::Task,
    EntityKind::Notification,
    EntityKind::Remark,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Starting,
    Active,
    Stopping,
}

pub struct SessionLifecycleGate {
    manager: Arc<SubscriptionManager>,
    states: Arc<HashMap<EntityKind, watch::Sender<GateState>>>,
}

impl SessionLifecycleGate {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        let states = LIVE_KINDS
            .iter()
            .map(|kind| (*kind, watch::Sender::new(GateState::Idle)))
            .collect();
        Self {
            manager,
            states: Arc::new(states),
        }
    }

    /// State of one live kind. `None` for kinds the gate does not manage.
    pub fn state(&self, kind: EntityKind) -> Option<watch::Receiver<GateState>> {
        self.states.get(&kind).map(watch::Sender::subscribe)
    }

    /// Follow `identities` until the stream ends or the handle shuts down.
    pub fn spawn<S>(self, identities: S) -> GateHandle
    where
        S: Stream<Item = Option<Identity>> + Send + 'static,
    {
        let (stop, mut stop_rx) = watch::channel(false);
        let gate = Arc::new(self);
        let task = tokio::spawn({
            let gate = gate.clone();
            async move {
                let mut identities = Box::pin(identities);
                let mut current: Option<SessionKey> = None;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = stopped(&mut stop_rx) => break,
                        next = identities.next() => next,
                    };
                    match next {
                        Some(identity) => gate.transition(&mut current, identity).await,
                        None => {
                            debug!("identity stream ended");
                            break;
                        }
                    }
                }
                gate.transition(&mut current, None).await;
            }
        });
        GateHandle { gate, stop, task }
    }

    async fn transition(&self, current: &mut Option<SessionKey>, identity: Option<Identity>) {
        let next = identity.as_ref().map(Identity::session_key);
        if next == *current {
            debug!("session key unchanged; subscriptions kept");
            return;
        }

        if current.is_some() {
            self.set_all(GateState::Stopping);
            self.manager.stop_all().await;
            self.set_all(GateState::Idle);
        }
        *current = next;

        if let Some(identity) = identity {
            info!(user = %identity.user_id, workspace = %identity.workspace_id, "starting live sync");
            self.set_all(GateState::Starting);
            let scope = identity.pull_scope();
            for kind in LIVE_KINDS {
                self.manager.start(kind, scope).await;
                self.set(kind, GateState::Active);
            }
        } else {
            info!("live sync stopped");
        }
    }

    fn set(&self, kind: EntityKind, state: GateState) {
        if let Some(tx) = self.states.get(&kind) {
            tx.send_replace(state);
        }
    }

    fn set_all(&self, state: GateState) {
        for kind in LIVE_KINDS {
            self.set(kind, state);
        }
    }
}

/// Running gate. Dropping it stops the gate without waiting for it.
pub struct GateHandle {
    gate: Arc<SessionLifecycleGate>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GateHandle {
    pub fn state(&self, kind: EntityKind) -> Option<watch::Receiver<GateState>> {
        self.gate.state(kind)
    }

    /// Stop every subscription and wait for the gate task to exit.
    pub async fn shutdown(self) {
        self.stop.send_replace(true);
        if let Err(e) = self.task.await {
            error!("Session gate task failed: {}", e);
        }
    }
}
