//! Storage abstraction for hive.
//!
//! Backend crates (e.g., hive-store-sqlite) implement [`CacheStore`] so the sync
//! engine doesn't depend on any specific database engine or schema details.

use thiserror::Error;

mod store;
pub mod types;

pub use store::*;
pub use types::*;

/// Uniform error type for all cache backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("entity kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: EntityKind,
        found: EntityKind,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Reject entities that are not of `kind`.
pub fn ensure_kind(kind: EntityKind, entities: &[Entity]) -> Result<(), StoreError> {
    match entities.iter().find(|e| e.kind() != kind) {
        Some(other) => Err(StoreError::KindMismatch {
            expected: kind,
            found: other.kind(),
        }),
        None => Ok(()),
    }
}
