use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RemarkId, TaskId, UserId, WorkspaceId};

/// Remark (comment) attached to a task. Deleted together with its task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remark {
    pub id: RemarkId,
    pub task_id: TaskId,
    pub workspace_id: WorkspaceId,
    pub message: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
}
