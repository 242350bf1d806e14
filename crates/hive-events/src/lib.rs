//! Change feed abstraction for hive.
//!
//! The remote store pushes a [`RawChange`] for every insert, update or delete
//! of a row. Feeds are scoped by table and workspace:
//! - Memory (in-process, tokio broadcast channels)
//! - Postgres (LISTEN/NOTIFY, see hive-remote-postgres)
//!
//! Feeds carry no history. A subscriber only sees changes published after it
//! subscribed; bulk pulls cover everything else.

use async_trait::async_trait;
use futures::Stream;
use hive_storage::{Entity, EntityKey, EntityKind, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use thiserror::Error;

/// Row operation reported by the feed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Wire payload of one row change.
///
/// `record` holds the new row for inserts and updates; `old_record` holds at
/// least the key columns of a deleted row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub table: String,
    #[serde(rename = "type")]
    pub op: ChangeOp,
    #[serde(default)]
    pub workspace_id: Option<WorkspaceId>,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
}

/// A decoded change, ready to be applied to the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted(Entity),
    Updated(Entity),
    Deleted(EntityKey),
}

impl RawChange {
    pub fn inserted(entity: &Entity) -> Result<Self, FeedError> {
        Self::with_record(ChangeOp::Insert, entity)
    }

    pub fn updated(entity: &Entity) -> Result<Self, FeedError> {
        Self::with_record(ChangeOp::Update, entity)
    }

    pub fn deleted(entity: &Entity) -> Result<Self, FeedError> {
        let old = entity.to_json().map_err(|e| FeedError::Decode(e.to_string()))?;
        Ok(Self {
            table: entity.kind().as_str().to_string(),
            op: ChangeOp::Delete,
            workspace_id: entity.workspace_id(),
            record: None,
            old_record: Some(old),
        })
    }

    /// Delete payload carrying only the key columns.
    pub fn deleted_key(
        kind: EntityKind,
        workspace_id: Option<WorkspaceId>,
        key: &EntityKey,
    ) -> Self {
        let old = match (kind, key) {
            (
                _,
                EntityKey::Member {
                    user_id,
                    workspace_id,
                },
            ) => serde_json::json!({ "user_id": user_id, "workspace_id": workspace_id }),
            (EntityKind::Settings, EntityKey::Id(id)) => serde_json::json!({ "user_id": id }),
            (_, EntityKey::Id(id)) => serde_json::json!({ "id": id }),
        };
        Self {
            table: kind.as_str().to_string(),
            op: ChangeOp::Delete,
            workspace_id,
            record: None,
            old_record: Some(old),
        }
    }

    fn with_record(op: ChangeOp, entity: &Entity) -> Result<Self, FeedError> {
        let record = entity.to_json().map_err(|e| FeedError::Decode(e.to_string()))?;
        Ok(Self {
            table: entity.kind().as_str().to_string(),
            op,
            workspace_id: entity.workspace_id(),
            record: Some(record),
            old_record: None,
        })
    }

    /// Decode the payload as a change of `kind`.
    pub fn decode(&self, kind: EntityKind) -> Result<ChangeEvent, FeedError> {
        if self.table != kind.as_str() {
            return Err(FeedError::Decode(format!(
                "expected table {}, got {}",
                kind, self.table
            )));
        }

        let entity = |record: &Option<Value>| -> Result<Entity, FeedError> {
            let record = record
                .clone()
                .ok_or_else(|| FeedError::Decode(format!("{:?} without record", self.op)))?;
            Entity::from_json(kind, record).map_err(|e| FeedError::Decode(e.to_string()))
        };

        match self.op {
            ChangeOp::Insert => Ok(ChangeEvent::Inserted(entity(&self.record)?)),
            ChangeOp::Update => Ok(ChangeEvent::Updated(entity(&self.record)?)),
            ChangeOp::Delete => self
                .old_record
                .as_ref()
                .or(self.record.as_ref())
                .and_then(|old| kind.key_of(old))
                .map(ChangeEvent::Deleted)
                .ok_or_else(|| FeedError::Decode("delete without key columns".into())),
        }
    }
}

/// Error type for change feed operations
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Stream of raw row changes
pub type ChangeStream = Pin<Box<dyn Stream<Item = RawChange> + Send>>;

/// Change feed trait for publishing and subscribing to row changes.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Publish a change to all subscribers of its table and workspace.
    async fn publish(&self, change: RawChange) -> Result<(), FeedError>;

    /// Subscribe to changes of one table inside one workspace.
    ///
    /// The stream runs until dropped or the backend connection is lost.
    async fn subscribe(
        &self,
        kind: EntityKind,
        workspace_id: &WorkspaceId,
    ) -> Result<ChangeStream, FeedError>;
}
