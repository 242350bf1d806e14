//! Remote relational store abstraction for hive.
//!
//! Backend crates (e.g., hive-remote-postgres) implement [`RemoteStore`] and
//! [`hive_events::ChangeFeed`]. The sync engine talks to them through a
//! [`RemoteSyncClient`], which fails closed when no backend is configured.

use async_trait::async_trait;
use hive_events::FeedError;
use hive_storage::{Entity, EntityKey, EntityKind, UserId, WorkspaceId};
use thiserror::Error;

mod client;
mod memory;

pub use client::RemoteSyncClient;
pub use memory::MemoryRemote;

/// Uniform error type for remote backends.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store is not configured")]
    NotConfigured,
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("not found")]
    NotFound,
    #[error("rejected by remote store: {0}")]
    Rejected(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<FeedError> for RemoteError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Backend(msg) => RemoteError::Unavailable(msg),
            FeedError::Decode(msg) => RemoteError::Decode(msg),
        }
    }
}

/// Rows requested by a bulk pull.
///
/// Notifications and settings are further narrowed to `recipient_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PullScope {
    pub workspace_id: WorkspaceId,
    pub recipient_id: Option<UserId>,
}

impl PullScope {
    pub fn workspace(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            recipient_id: None,
        }
    }

    pub fn for_recipient(mut self, user_id: UserId) -> Self {
        self.recipient_id = Some(user_id);
        self
    }

    /// Whether `entity` falls inside this scope.
    pub fn contains(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Settings(s) => self.recipient_id.map_or(true, |r| r == s.user_id),
            Entity::Notification(n) => {
                n.workspace_id == self.workspace_id
                    && self.recipient_id.map_or(true, |r| r == n.recipient_id)
            }
            other => other.workspace_id() == Some(self.workspace_id),
        }
    }
}

/// Query and write surface of the remote relational store.
///
/// Writes return the row as stored by the remote.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every row of `kind` inside `scope`.
    async fn pull_all(&self, kind: EntityKind, scope: &PullScope)
        -> Result<Vec<Entity>, RemoteError>;

    async fn get_by_id(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<Option<Entity>, RemoteError>;

    async fn create(&self, entity: Entity) -> Result<Entity, RemoteError>;

    async fn update(&self, entity: Entity) -> Result<Entity, RemoteError>;

    /// Delete one row. Deleting a task deletes its remarks.
    async fn delete(&self, kind: EntityKind, key: &EntityKey) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_storage::{Notification, NotificationSettings, NotificationType};

    #[test]
    fn test_feed_errors_map_to_remote_errors() {
        assert!(matches!(
            RemoteError::from(FeedError::Backend("down".into())),
            RemoteError::Unavailable(msg) if msg == "down"
        ));
        assert!(matches!(
            RemoteError::from(FeedError::Decode("bad".into())),
            RemoteError::Decode(_)
        ));
    }

    #[test]
    fn test_scope_narrows_notifications_to_recipient() {
        let ws = WorkspaceId::new();
        let me = UserId::new();
        let scope = PullScope::workspace(ws).for_recipient(me);

        let mine = Notification::new(me, ws, NotificationType::System, "a", "b");
        let theirs = Notification::new(UserId::new(), ws, NotificationType::System, "a", "b");
        let elsewhere = Notification::new(me, WorkspaceId::new(), NotificationType::System, "a", "b");

        assert!(scope.contains(&mine.into()));
        assert!(!scope.contains(&theirs.into()));
        assert!(!scope.contains(&elsewhere.into()));
        assert!(scope.contains(&NotificationSettings::all_enabled(me).into()));
        assert!(!scope.contains(&NotificationSettings::all_enabled(UserId::new()).into()));
    }
}
