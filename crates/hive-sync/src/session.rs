//! The signed-in identity and its lifecycle.
//!
//! A [`SessionContext`] is the single owner of the current [`Identity`]. It is
//! cloned into whoever needs it and observed through a `watch` channel, so the
//! lifecycle gate sees every login, workspace switch and logout.

use futures::Stream;
use hive_config::{ConfigError, ProfileConfig};
use hive_remote::PullScope;
use hive_storage::{Role, UserId, WorkspaceId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

use crate::SyncError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    pub workspace_id: WorkspaceId,
    pub approved: bool,
    /// Shown as the actor of audit entries.
    pub display_name: String,
}

/// What a session's subscriptions are bound to.
///
/// Role and approval changes keep the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
}

impl Identity {
    pub fn new(user_id: UserId, workspace_id: WorkspaceId, role: Role) -> Self {
        Self {
            user_id,
            role,
            workspace_id,
            approved: true,
            display_name: user_id.to_string(),
        }
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn pending(mut self) -> Self {
        self.approved = false;
        self
    }

    /// Build an identity from a configured profile. The role string is parsed here.
    pub fn from_profile(profile: &ProfileConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            user_id: profile.user_id,
            role: profile.role()?,
            workspace_id: profile.workspace_id,
            approved: profile.approved,
            display_name: profile.display_name().to_string(),
        })
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            user_id: self.user_id,
            workspace_id: self.workspace_id,
        }
    }

    /// Rows this identity may pull: its workspace, and its own notifications and settings.
    pub fn pull_scope(&self) -> PullScope {
        PullScope::workspace(self.workspace_id).for_recipient(self.user_id)
    }
}

#[derive(Clone, Debug)]
pub struct SessionContext {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(None)),
        }
    }

    pub fn login(&self, identity: Identity) {
        info!(user = %identity.user_id, workspace = %identity.workspace_id, role = %identity.role, "login");
        self.tx.send_replace(Some(identity));
    }

    /// Move the signed-in user to another workspace.
    pub fn switch_workspace(
        &self,
        workspace_id: WorkspaceId,
        role: Role,
        approved: bool,
    ) -> Result<(), SyncError> {
        let mut result = Err(SyncError::NotAuthenticated);
        self.tx.send_if_modified(|current| match current {
            Some(identity) => {
                info!(user = %identity.user_id, from = %identity.workspace_id, to = %workspace_id, "switching workspace");
                identity.workspace_id = workspace_id;
                identity.role = role;
                identity.approved = approved;
                result = Ok(());
                true
            }
            None => false,
        });
        result
    }

    pub fn logout(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("logout");
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn require(&self) -> Result<Identity, SyncError> {
        self.current().ok_or(SyncError::NotAuthenticated)
    }

    /// The current identity followed by every later change.
    ///
    /// Rapid changes may be coalesced; the latest value is always delivered.
    pub fn identities(&self) -> impl Stream<Item = Option<Identity>> + Send + 'static {
        WatchStream::new(self.tx.subscribe())
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
