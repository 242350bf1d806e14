//! The CacheStore trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// Durable local cache of workspace data.
///
/// Writes to one [`EntityKind`] are serialized by the backend; reads see the
/// last committed state and never block on writers.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    // ───────────────────────────────────── Reads ──────────────────────────────────────────

    /// Get one row by key.
    async fn get(&self, kind: EntityKind, key: &EntityKey) -> Result<Option<Entity>, StoreError>;

    /// List rows of `kind` matching `filter`.
    ///
    /// Tasks come oldest first; remarks, notifications and audit entries newest first.
    async fn list(&self, kind: EntityKind, filter: &ListFilter) -> Result<Vec<Entity>, StoreError>;

    /// Change notifications for every committed write that altered a row.
    ///
    /// Consumers re-run their `list` query when an item of interest arrives.
    fn subscribe_changes(&self) -> CacheChanges;

    // ───────────────────────────────────── Writes ─────────────────────────────────────────

    /// Insert or replace rows. Rows identical to the stored ones are left untouched
    /// and produce no change notification.
    ///
    /// Fails with [`StoreError::KindMismatch`] if an entity is not of `kind`.
    async fn upsert(&self, kind: EntityKind, entities: &[Entity]) -> Result<(), StoreError>;

    /// Delete one row. Deleting a task also deletes its remarks.
    ///
    /// Returns whether the row existed.
    async fn delete(&self, kind: EntityKind, key: &EntityKey) -> Result<bool, StoreError>;

    /// Delete every row of `kind` within `scope`; returns the number of rows removed.
    async fn clear(&self, kind: EntityKind, scope: &ClearScope) -> Result<u64, StoreError>;

    /// Replace the rows of `kind` within `scope` by `entities`, atomically.
    async fn replace(
        &self,
        kind: EntityKind,
        scope: &ClearScope,
        entities: &[Entity],
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Roster ─────────────────────────────────────────

    /// Store the task counters of roster members of one workspace.
    async fn set_task_counts(
        &self,
        workspace_id: &WorkspaceId,
        counts: &[(UserId, TaskCounters)],
    ) -> Result<(), StoreError>;
}
