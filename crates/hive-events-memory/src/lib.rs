//! In-memory change feed using tokio broadcast channels.
//!
//! This implementation is suitable for:
//! - Tests and local development
//! - In-process remote stores that publish their own writes
//!
//! Changes are only broadcast within a single process.

use async_trait::async_trait;
use dashmap::DashMap;
use hive_events::{ChangeFeed, ChangeStream, FeedError, RawChange};
use hive_storage::{EntityKind, WorkspaceId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 100;

type Scope = (EntityKind, WorkspaceId);

/// In-memory change feed, one broadcast channel per (table, workspace).
pub struct MemoryChangeFeed {
    channels: Arc<DashMap<Scope, broadcast::Sender<RawChange>>>,
    capacity: usize,
}

impl MemoryChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Feed whose channels buffer `capacity` changes per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Get or create the broadcast channel for a scope
    fn get_or_create_channel(&self, scope: Scope) -> broadcast::Sender<RawChange> {
        self.channels
            .entry(scope)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Number of live subscribers of one scope.
    pub fn subscriber_count(&self, kind: EntityKind, workspace_id: &WorkspaceId) -> usize {
        self.channels
            .get(&(kind, *workspace_id))
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for MemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn publish(&self, change: RawChange) -> Result<(), FeedError> {
        let kind: EntityKind = change
            .table
            .parse()
            .map_err(|e: hive_storage::ParseValueError| FeedError::Decode(e.to_string()))?;

        // Per-user rows (settings) have no workspace feed.
        let Some(workspace_id) = change.workspace_id else {
            return Ok(());
        };

        let tx = self.get_or_create_channel((kind, workspace_id));
        // Ignore error if no receivers (this is fine)
        let _ = tx.send(change);
        Ok(())
    }

    async fn subscribe(
        &self,
        kind: EntityKind,
        workspace_id: &WorkspaceId,
    ) -> Result<ChangeStream, FeedError> {
        let rx = self.get_or_create_channel((kind, *workspace_id)).subscribe();

        // Lagged receivers skip what they missed; the next bulk pull fills the gap.
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());
        Ok(Box::pin(stream))
    }
}
