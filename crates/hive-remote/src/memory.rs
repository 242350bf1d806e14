//! In-process remote store.
//!
//! Keeps every table in memory and publishes its own writes to a
//! [`MemoryChangeFeed`], the way database triggers would. Reachability can be
//! switched off to exercise degraded paths: calls then fail with
//! [`RemoteError::Unavailable`] and open feeds end.

use async_trait::async_trait;
use futures::StreamExt;
use hive_events::{ChangeFeed, ChangeStream, FeedError, RawChange};
use hive_events_memory::MemoryChangeFeed;
use hive_storage::{Entity, EntityKey, EntityKind, WorkspaceId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::warn;

use crate::{PullScope, RemoteError, RemoteStore, RemoteSyncClient};

type Tables = HashMap<(EntityKind, EntityKey), Entity>;

#[derive(Clone)]
pub struct MemoryRemote {
    tables: Arc<RwLock<Tables>>,
    feed: Arc<MemoryChangeFeed>,
    reachable: Arc<watch::Sender<bool>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            feed: Arc::new(MemoryChangeFeed::new()),
            reachable: Arc::new(watch::Sender::new(true)),
        }
    }

    /// A sync client backed by this store and its feed.
    pub fn client(&self) -> RemoteSyncClient {
        RemoteSyncClient::new(Arc::new(self.clone()), Arc::new(self.clone()))
    }

    /// The underlying feed, for injecting changes that bypass the tables.
    pub fn feed(&self) -> Arc<MemoryChangeFeed> {
        self.feed.clone()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.send_replace(reachable);
    }

    pub fn is_reachable(&self) -> bool {
        *self.reachable.borrow()
    }

    /// Insert rows without publishing changes.
    pub async fn seed(&self, entities: impl IntoIterator<Item = Entity>) {
        let mut tables = self.tables.write().await;
        for entity in entities {
            tables.insert((entity.kind(), entity.key()), entity);
        }
    }

    /// Current remote copy of a row.
    pub async fn row(&self, kind: EntityKind, key: &EntityKey) -> Option<Entity> {
        self.tables.read().await.get(&(kind, *key)).cloned()
    }

    fn ensure_reachable(&self) -> Result<(), RemoteError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("remote store unreachable".into()))
        }
    }

    async fn announce(&self, change: Result<RawChange, FeedError>) {
        let result = match change {
            Ok(change) => self.feed.publish(change).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to publish change: {}", e);
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn pull_all(
        &self,
        kind: EntityKind,
        scope: &PullScope,
    ) -> Result<Vec<Entity>, RemoteError> {
        self.ensure_reachable()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Entity> = tables
            .iter()
            .filter(|((k, _), entity)| *k == kind && scope.contains(entity))
            .map(|(_, entity)| entity.clone())
            .collect();
        rows.sort_by_key(|e| e.key().to_string());
        Ok(rows)
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<Option<Entity>, RemoteError> {
        self.ensure_reachable()?;
        Ok(self.row(kind, key).await)
    }

    async fn create(&self, entity: Entity) -> Result<Entity, RemoteError> {
        self.ensure_reachable()?;
        {
            let mut tables = self.tables.write().await;
            let slot = (entity.kind(), entity.key());
            if tables.contains_key(&slot) {
                return Err(RemoteError::Rejected(format!(
                    "{} {} already exists",
                    slot.0, slot.1
                )));
            }
            if let Entity::Remark(r) = &entity {
                if !tables.contains_key(&(EntityKind::Task, r.task_id.into())) {
                    return Err(RemoteError::Rejected(format!(
                        "task {} does not exist",
                        r.task_id
                    )));
                }
            }
            tables.insert(slot, entity.clone());
        }
        self.announce(RawChange::inserted(&entity)).await;
        Ok(entity)
    }

    async fn update(&self, entity: Entity) -> Result<Entity, RemoteError> {
        self.ensure_reachable()?;
        {
            let mut tables = self.tables.write().await;
            let slot = tables
                .get_mut(&(entity.kind(), entity.key()))
                .ok_or(RemoteError::NotFound)?;
            *slot = entity.clone();
        }
        self.announce(RawChange::updated(&entity)).await;
        Ok(entity)
    }

    async fn delete(&self, kind: EntityKind, key: &EntityKey) -> Result<(), RemoteError> {
        self.ensure_reachable()?;
        let (removed, cascaded) = {
            let mut tables = self.tables.write().await;
            let removed = tables.remove(&(kind, *key)).ok_or(RemoteError::NotFound)?;
            let cascaded: Vec<Entity> = match &removed {
                Entity::Task(task) => {
                    let orphans: Vec<_> = tables
                        .iter()
                        .filter(|(_, e)| e.as_remark().is_some_and(|r| r.task_id == task.id))
                        .map(|(slot, _)| *slot)
                        .collect();
                    orphans
                        .into_iter()
                        .filter_map(|slot| tables.remove(&slot))
                        .collect()
                }
                _ => Vec::new(),
            };
            (removed, cascaded)
        };

        for remark in &cascaded {
            self.announce(RawChange::deleted(remark)).await;
        }
        self.announce(RawChange::deleted(&removed)).await;
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryRemote {
    async fn publish(&self, change: RawChange) -> Result<(), FeedError> {
        self.feed.publish(change).await
    }

    async fn subscribe(
        &self,
        kind: EntityKind,
        workspace_id: &WorkspaceId,
    ) -> Result<ChangeStream, FeedError> {
        if !self.is_reachable() {
            return Err(FeedError::Backend("remote store unreachable".into()));
        }
        let stream = self.feed.subscribe(kind, workspace_id).await?;

        // The connection drops when the store becomes unreachable.
        let mut reachable = self.reachable.subscribe();
        let lost = async move {
            let _ = reachable.wait_for(|up| !*up).await;
        };
        Ok(Box::pin(stream.take_until(lost)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hive_events::ChangeEvent;
    use hive_storage::{Priority, Remark, RemarkId, Task, TaskId, TaskStatus, UserId};
    use std::time::Duration;

    fn task(ws: WorkspaceId) -> Task {
        Task {
            id: TaskId::new(),
            workspace_id: ws,
            title: "Launch".into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::High,
            assignee_id: None,
            creator_id: UserId::new(),
            due_at: None,
            created_at: Utc::now(),
        }
    }

    fn remark(t: &Task) -> Remark {
        Remark {
            id: RemarkId::new(),
            task_id: t.id,
            workspace_id: t.workspace_id,
            message: "looks good".into(),
            author_id: UserId::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_are_published_to_the_feed() {
        let remote = MemoryRemote::new();
        let ws = WorkspaceId::new();
        let mut stream = remote.subscribe(EntityKind::Task, &ws).await.unwrap();

        let mut t = task(ws);
        remote.create(t.clone().into()).await.unwrap();
        t.status = TaskStatus::Done;
        remote.update(t.clone().into()).await.unwrap();
        remote.delete(EntityKind::Task, &t.id.into()).await.unwrap();

        let mut events = Vec::new();
        for _ in 0..3 {
            let raw = tokio::time::timeout(Duration::from_millis(100), stream.next())
                .await
                .expect("timeout")
                .expect("stream ended");
            events.push(raw.decode(EntityKind::Task).unwrap());
        }
        assert!(matches!(events[0], ChangeEvent::Inserted(_)));
        assert_eq!(events[1], ChangeEvent::Updated(t.clone().into()));
        assert_eq!(events[2], ChangeEvent::Deleted(t.id.into()));
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_orphan_remarks() {
        let remote = MemoryRemote::new();
        let t = task(WorkspaceId::new());

        let orphan = remark(&t);
        assert!(matches!(
            remote.create(orphan.into()).await,
            Err(RemoteError::Rejected(_))
        ));

        remote.create(t.clone().into()).await.unwrap();
        assert!(matches!(
            remote.create(t.into()).await,
            Err(RemoteError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let remote = MemoryRemote::new();
        let t = task(WorkspaceId::new());
        assert!(matches!(
            remote.update(t.into()).await,
            Err(RemoteError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_task_deletes_its_remarks() {
        let remote = MemoryRemote::new();
        let t = task(WorkspaceId::new());
        let r = remark(&t);
        remote.create(t.clone().into()).await.unwrap();
        remote.create(r.clone().into()).await.unwrap();

        remote.delete(EntityKind::Task, &t.id.into()).await.unwrap();
        assert_eq!(remote.row(EntityKind::Remark, &r.id.into()).await, None);
    }

    #[tokio::test]
    async fn pull_is_scoped_to_workspace() {
        let remote = MemoryRemote::new();
        let ws = WorkspaceId::new();
        let mine = task(ws);
        remote
            .seed([mine.clone().into(), task(WorkspaceId::new()).into()])
            .await;

        let rows = remote
            .pull_all(EntityKind::Task, &PullScope::workspace(ws))
            .await
            .unwrap();
        assert_eq!(rows, vec![Entity::Task(mine)]);
    }

    #[tokio::test]
    async fn unreachable_remote_fails_calls_and_ends_feeds() {
        let remote = MemoryRemote::new();
        let ws = WorkspaceId::new();
        let mut stream = remote.subscribe(EntityKind::Task, &ws).await.unwrap();

        remote.set_reachable(false);
        assert!(matches!(
            remote
                .pull_all(EntityKind::Task, &PullScope::workspace(ws))
                .await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(remote.subscribe(EntityKind::Task, &ws).await.is_err());

        let ended = tokio::time::timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("stream should end");
        assert!(ended.is_none());
    }
}
