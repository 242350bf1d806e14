use serde::{Deserialize, Serialize};

use super::{MembershipStatus, Role, TaskCounters, UserId, WorkspaceId};

/// Roster entry: one user's membership in one workspace.
///
/// Keyed by `(user_id, workspace_id)`; a user may belong to several workspaces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: MembershipStatus,
    #[serde(default)]
    pub workspace_name: String,
    /// Derived locally from cached tasks; never sent to the remote store.
    #[serde(default, skip_serializing)]
    pub task_counts: TaskCounters,
}

impl Employee {
    pub fn is_approved(&self) -> bool {
        self.status == MembershipStatus::Approved
    }
}
