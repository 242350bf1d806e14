//! Offline-first sync engine for hive.
//!
//! Reads are served from a local [`hive_storage::CacheStore`]. The cache is kept
//! current by bulk pulls and by live change feeds, both applied through the
//! [`Reconciler`]. Live feeds follow the session through the
//! [`SessionLifecycleGate`]; writes go through the [`AuthorizationGate`] before
//! they reach the remote store.

mod error;
mod metrics;

pub mod authz;
pub mod filter;
pub mod gate;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod subscription;

pub use authz::{authorize, Action, AuthorizationGate, Decision};
pub use error::SyncError;
pub use filter::should_persist;
pub use gate::{GateHandle, GateState, SessionLifecycleGate, LIVE_KINDS};
pub use crate::metrics::describe_metrics;
pub use reconcile::{Applied, Reconciler};
pub use service::{MemberDecision, NewTask, RefreshOutcome, WorkspaceService, REFRESH_ORDER};
pub use session::{Identity, SessionContext, SessionKey};
pub use subscription::{Backoff, Connectivity, SubscriptionManager};
