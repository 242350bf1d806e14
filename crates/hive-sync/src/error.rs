use hive_config::ConfigError;
use hive_events::FeedError;
use hive_remote::RemoteError;
use hive_storage::StoreError;
use thiserror::Error;

/// Errors surfaced by the write path and the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("rejected by remote store: {0}")]
    Rejected(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found")]
    NotFound,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotConfigured => SyncError::RemoteUnavailable(e.to_string()),
            RemoteError::Unavailable(msg) => SyncError::RemoteUnavailable(msg),
            RemoteError::NotFound => SyncError::NotFound,
            RemoteError::Rejected(msg) => SyncError::Rejected(msg),
            RemoteError::Decode(msg) => SyncError::Decode(msg),
        }
    }
}

impl From<FeedError> for SyncError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Backend(msg) => SyncError::RemoteUnavailable(msg),
            FeedError::Decode(msg) => SyncError::Decode(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_map_to_sync_errors() {
        assert!(matches!(
            SyncError::from(RemoteError::NotConfigured),
            SyncError::RemoteUnavailable(msg) if msg == "remote store is not configured"
        ));
        assert!(matches!(
            SyncError::from(RemoteError::NotFound),
            SyncError::NotFound
        ));
        assert!(matches!(
            SyncError::from(RemoteError::Rejected("dup".into())),
            SyncError::Rejected(_)
        ));
        assert!(matches!(
            SyncError::from(FeedError::Decode("bad".into())),
            SyncError::Decode(_)
        ));
    }
}
