use futures::StreamExt;
use hive_storage::{
    ensure_kind, CacheChange, CacheChanges, CacheOp, CacheStore, ClearScope, Entity, EntityKey,
    EntityKind, ListFilter, StoreError, TaskCounters, UserId, WorkspaceId,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio_stream::wrappers::BroadcastStream;

mod rows;

use rows::backend;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Buffered change notifications per subscriber. Slow subscribers skip ahead.
const CHANGE_CAPACITY: usize = 256;

/// Local cache on SQLite.
///
/// Every write runs in one transaction under the mutex of each kind it touches.
/// Reads go straight to the pool.
pub struct SqliteCache {
    pool: SqlitePool,
    locks: [Mutex<()>; EntityKind::ALL.len()],
    changes: broadcast::Sender<CacheChange>,
}

impl SqliteCache {
    /// `~/.hive/cache.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".hive");
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Self::open_file(&dir.join("cache.db")).await
    }

    /// Open (creating if missing) the cache file at `path`.
    pub async fn open_file(path: &Path) -> Result<Self, StoreError> {
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(backend)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            pool,
            locks: std::array::from_fn(|_| Mutex::new(())),
            changes,
        })
    }

    /// Resize the per-subscriber change buffer. Existing subscribers keep the old one.
    pub fn with_change_capacity(mut self, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        self.changes = changes;
        self
    }

    /// Take the write locks for `kind` in lock order. Tasks also guard their remarks.
    async fn lock(&self, kind: EntityKind) -> Vec<MutexGuard<'_, ()>> {
        let kinds: &[EntityKind] = match kind {
            EntityKind::Task => &[EntityKind::Task, EntityKind::Remark],
            EntityKind::Remark => &[EntityKind::Remark],
            EntityKind::Employee => &[EntityKind::Employee],
            EntityKind::Notification => &[EntityKind::Notification],
            EntityKind::AuditLog => &[EntityKind::AuditLog],
            EntityKind::Settings => &[EntityKind::Settings],
        };
        let mut guards = Vec::with_capacity(kinds.len());
        for k in kinds {
            guards.push(self.locks[*k as usize].lock().await);
        }
        guards
    }

    fn publish(&self, changes: Vec<CacheChange>) {
        for change in changes {
            // No subscribers is fine.
            let _ = self.changes.send(change);
        }
    }
}

fn upserted(entity: &Entity) -> CacheChange {
    CacheChange {
        kind: entity.kind(),
        key: entity.key(),
        op: CacheOp::Upserted,
    }
}

#[async_trait::async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, kind: EntityKind, key: &EntityKey) -> Result<Option<Entity>, StoreError> {
        rows::get(&self.pool, kind, key).await
    }

    async fn list(&self, kind: EntityKind, filter: &ListFilter) -> Result<Vec<Entity>, StoreError> {
        rows::list(&self.pool, kind, filter).await
    }

    fn subscribe_changes(&self) -> CacheChanges {
        let rx = self.changes.subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|r| async move { r.ok() }))
    }

    async fn upsert(&self, kind: EntityKind, entities: &[Entity]) -> Result<(), StoreError> {
        ensure_kind(kind, entities)?;
        let _guards = self.lock(kind).await;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut changes = Vec::new();
        for entity in entities {
            if rows::upsert_one(&mut tx, entity).await? {
                changes.push(upserted(entity));
            }
        }
        tx.commit().await.map_err(backend)?;

        self.publish(changes);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &EntityKey) -> Result<bool, StoreError> {
        let _guards = self.lock(kind).await;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let changes = rows::delete_one(&mut tx, kind, key).await?;
        tx.commit().await.map_err(backend)?;

        let existed = changes.iter().any(|c| c.kind == kind && c.key == *key);
        self.publish(changes);
        Ok(existed)
    }

    async fn clear(&self, kind: EntityKind, scope: &ClearScope) -> Result<u64, StoreError> {
        let _guards = self.lock(kind).await;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let keys = rows::keys_in_scope(&mut tx, kind, scope).await?;
        let mut changes = Vec::new();
        for key in &keys {
            changes.extend(rows::delete_one(&mut tx, kind, key).await?);
        }
        tx.commit().await.map_err(backend)?;

        let removed = changes.iter().filter(|c| c.kind == kind).count() as u64;
        self.publish(changes);
        Ok(removed)
    }

    async fn replace(
        &self,
        kind: EntityKind,
        scope: &ClearScope,
        entities: &[Entity],
    ) -> Result<(), StoreError> {
        ensure_kind(kind, entities)?;
        let _guards = self.lock(kind).await;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let incoming: HashSet<EntityKey> = entities.iter().map(Entity::key).collect();
        let mut changes = Vec::new();

        // Only rows missing from the new set are deleted, so surviving tasks keep their remarks.
        for key in rows::keys_in_scope(&mut tx, kind, scope).await? {
            if !incoming.contains(&key) {
                changes.extend(rows::delete_one(&mut tx, kind, &key).await?);
            }
        }
        for entity in entities {
            if rows::upsert_one(&mut tx, entity).await? {
                changes.push(upserted(entity));
            }
        }
        tx.commit().await.map_err(backend)?;

        tracing::debug!(
            kind = %kind,
            rows = entities.len(),
            changed = changes.len(),
            "replaced cache scope"
        );
        self.publish(changes);
        Ok(())
    }

    async fn set_task_counts(
        &self,
        workspace_id: &WorkspaceId,
        counts: &[(UserId, TaskCounters)],
    ) -> Result<(), StoreError> {
        let _guards = self.lock(EntityKind::Employee).await;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut changes = Vec::new();
        for (user_id, counters) in counts {
            if rows::set_counts(&mut tx, workspace_id, user_id, counters).await? {
                changes.push(CacheChange {
                    kind: EntityKind::Employee,
                    key: EntityKey::Member {
                        user_id: *user_id,
                        workspace_id: *workspace_id,
                    },
                    op: CacheOp::Upserted,
                });
            }
        }
        tx.commit().await.map_err(backend)?;

        self.publish(changes);
        Ok(())
    }
}
