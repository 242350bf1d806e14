//! Applies remote-sourced changes and pull results to the local cache.
//!
//! Events are applied in arrival order and the last one wins. Upserts are
//! idempotent, so redelivered events collapse into the row already stored.

use hive_events::{ChangeEvent, RawChange};
use hive_remote::PullScope;
use hive_storage::{
    CacheStore, ClearScope, Entity, EntityKey, EntityKind, NotificationSettings, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::should_persist;
use crate::metrics::record_reconcile;
use crate::SyncError;

/// What happened to one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Upserted,
    Deleted,
    /// Delete of a row the cache never held.
    Absent,
    /// Dropped by the recipient's notification settings.
    Filtered,
    /// Belongs to another workspace or another user.
    OutOfScope,
}

impl Applied {
    fn as_str(&self) -> &'static str {
        match self {
            Applied::Upserted => "upserted",
            Applied::Deleted => "deleted",
            Applied::Absent => "absent",
            Applied::Filtered => "filtered",
            Applied::OutOfScope => "out_of_scope",
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    cache: Arc<dyn CacheStore>,
}

impl Reconciler {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Decode a feed payload and apply it.
    ///
    /// A payload that does not decode is counted and returned as
    /// [`SyncError::Decode`]; the caller moves on to the next one.
    pub async fn reconcile(
        &self,
        kind: EntityKind,
        scope: &PullScope,
        raw: &RawChange,
    ) -> Result<Applied, SyncError> {
        let event = match raw.decode(kind) {
            Ok(event) => event,
            Err(e) => {
                warn!(kind = %kind, table = %raw.table, "Dropping malformed change: {}", e);
                record_reconcile(kind, "malformed", 1);
                return Err(e.into());
            }
        };
        self.apply(kind, scope, event).await
    }

    pub async fn apply(
        &self,
        kind: EntityKind,
        scope: &PullScope,
        event: ChangeEvent,
    ) -> Result<Applied, SyncError> {
        let result = match event {
            ChangeEvent::Inserted(entity) | ChangeEvent::Updated(entity) => {
                self.apply_upsert(kind, scope, entity).await
            }
            ChangeEvent::Deleted(key) => self.apply_delete(kind, scope, &key).await,
        };
        match &result {
            Ok(applied) => {
                debug!(kind = %kind, outcome = applied.as_str(), "reconciled");
                record_reconcile(kind, applied.as_str(), 1);
            }
            Err(e) => {
                warn!(kind = %kind, "Failed to reconcile change: {}", e);
                record_reconcile(kind, "failed", 1);
            }
        }
        result
    }

    async fn apply_upsert(
        &self,
        kind: EntityKind,
        scope: &PullScope,
        entity: Entity,
    ) -> Result<Applied, SyncError> {
        if !scope.contains(&entity) {
            return Ok(Applied::OutOfScope);
        }
        if let Entity::Notification(n) = &entity {
            let settings = self.settings_of(&n.recipient_id.into()).await;
            if !should_persist(n, settings.as_ref()) {
                return Ok(Applied::Filtered);
            }
        }
        self.cache.upsert(kind, std::slice::from_ref(&entity)).await?;
        Ok(Applied::Upserted)
    }

    async fn apply_delete(
        &self,
        kind: EntityKind,
        scope: &PullScope,
        key: &EntityKey,
    ) -> Result<Applied, SyncError> {
        // The key alone does not say where the row lives; the cached copy does.
        match self.cache.get(kind, key).await? {
            None => Ok(Applied::Absent),
            Some(cached) if !scope.contains(&cached) => Ok(Applied::OutOfScope),
            Some(_) => {
                if self.cache.delete(kind, key).await? {
                    Ok(Applied::Deleted)
                } else {
                    Ok(Applied::Absent)
                }
            }
        }
    }

    /// Replace the cached rows of `kind` inside `scope` with a bulk pull result.
    ///
    /// Rows outside the scope and notifications muted by the recipient are left
    /// out. Returns the number of rows stored.
    pub async fn apply_pull(
        &self,
        kind: EntityKind,
        scope: &PullScope,
        entities: Vec<Entity>,
    ) -> Result<usize, SyncError> {
        let mut kept = Vec::with_capacity(entities.len());
        let mut settings: HashMap<UserId, Option<NotificationSettings>> = HashMap::new();
        let (mut out_of_scope, mut filtered) = (0, 0);
        for entity in entities {
            if !scope.contains(&entity) {
                out_of_scope += 1;
                continue;
            }
            if let Entity::Notification(n) = &entity {
                if !settings.contains_key(&n.recipient_id) {
                    let found = self.settings_of(&n.recipient_id.into()).await;
                    settings.insert(n.recipient_id, found);
                }
                let recipient = settings.get(&n.recipient_id).and_then(Option::as_ref);
                if !should_persist(n, recipient) {
                    filtered += 1;
                    continue;
                }
            }
            kept.push(entity);
        }

        self.cache
            .replace(kind, &clear_scope(kind, scope), &kept)
            .await?;
        record_reconcile(kind, "pulled", kept.len() as u64);
        record_reconcile(kind, Applied::OutOfScope.as_str(), out_of_scope);
        record_reconcile(kind, Applied::Filtered.as_str(), filtered);
        debug!(kind = %kind, workspace = %scope.workspace_id, rows = kept.len(), "applied pull");
        Ok(kept.len())
    }

    /// Fails open: a read error counts as "no settings".
    async fn settings_of(&self, user: &EntityKey) -> Option<NotificationSettings> {
        match self.cache.get(EntityKind::Settings, user).await {
            Ok(Some(Entity::Settings(settings))) => Some(settings),
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to read notification settings: {}", e);
                None
            }
        }
    }
}

/// Cached rows a pull of `kind` inside `scope` supersedes.
fn clear_scope(kind: EntityKind, scope: &PullScope) -> ClearScope {
    match (kind, scope.recipient_id) {
        (EntityKind::Notification, Some(recipient_id)) => ClearScope::Inbox {
            recipient_id,
            workspace_id: scope.workspace_id,
        },
        (EntityKind::Settings, Some(recipient_id)) => ClearScope::Recipient(recipient_id),
        _ => ClearScope::Workspace(scope.workspace_id),
    }
}
