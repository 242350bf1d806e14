use hive_events::{ChangeFeed, ChangeStream};
use hive_storage::{Entity, EntityKey, EntityKind, WorkspaceId};
use std::sync::Arc;
use tracing::debug;

use crate::{PullScope, RemoteError, RemoteStore};

/// Entry point of the sync engine into the remote store.
///
/// Built without a backend it fails closed: every call, `subscribe` included,
/// returns [`RemoteError::NotConfigured`].
#[derive(Clone)]
pub struct RemoteSyncClient {
    backend: Option<Backend>,
}

#[derive(Clone)]
struct Backend {
    store: Arc<dyn RemoteStore>,
    feed: Arc<dyn ChangeFeed>,
}

impl RemoteSyncClient {
    pub fn new(store: Arc<dyn RemoteStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            backend: Some(Backend { store, feed }),
        }
    }

    /// Client for a deployment with no remote store.
    pub fn unconfigured() -> Self {
        Self { backend: None }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&Backend, RemoteError> {
        self.backend.as_ref().ok_or(RemoteError::NotConfigured)
    }

    pub async fn pull_all(
        &self,
        kind: EntityKind,
        scope: &PullScope,
    ) -> Result<Vec<Entity>, RemoteError> {
        let rows = self.backend()?.store.pull_all(kind, scope).await?;
        debug!(kind = %kind, workspace = %scope.workspace_id, rows = rows.len(), "pulled");
        Ok(rows)
    }

    pub async fn get_by_id(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<Option<Entity>, RemoteError> {
        self.backend()?.store.get_by_id(kind, key).await
    }

    pub async fn create(&self, entity: Entity) -> Result<Entity, RemoteError> {
        self.backend()?.store.create(entity).await
    }

    pub async fn update(&self, entity: Entity) -> Result<Entity, RemoteError> {
        self.backend()?.store.update(entity).await
    }

    pub async fn delete(&self, kind: EntityKind, key: &EntityKey) -> Result<(), RemoteError> {
        self.backend()?.store.delete(kind, key).await
    }

    /// Open the change feed of one table inside one workspace.
    pub async fn subscribe(
        &self,
        kind: EntityKind,
        workspace_id: &WorkspaceId,
    ) -> Result<ChangeStream, RemoteError> {
        Ok(self.backend()?.feed.subscribe(kind, workspace_id).await?)
    }
}
