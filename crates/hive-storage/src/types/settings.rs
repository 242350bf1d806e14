use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NotificationCategory, UserId};

fn enabled() -> bool {
    true
}

/// Per-user notification toggles. Fields missing from a stored record read as enabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: UserId,
    #[serde(default = "enabled")]
    pub task_assigned: bool,
    #[serde(default = "enabled")]
    pub task_updates: bool,
    #[serde(default = "enabled")]
    pub task_overdue: bool,
    #[serde(default = "enabled")]
    pub new_remark: bool,
    pub updated_at: DateTime<Utc>,
}

impl NotificationSettings {
    /// Settings with every category enabled.
    pub fn all_enabled(user_id: UserId) -> Self {
        Self {
            user_id,
            task_assigned: true,
            task_updates: true,
            task_overdue: true,
            new_remark: true,
            updated_at: Utc::now(),
        }
    }

    pub fn is_enabled(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::TaskAssigned => self.task_assigned,
            NotificationCategory::TaskUpdates => self.task_updates,
            NotificationCategory::TaskOverdue => self.task_overdue,
            NotificationCategory::NewRemark => self.new_remark,
        }
    }

    pub fn with(mut self, category: NotificationCategory, on: bool) -> Self {
        match category {
            NotificationCategory::TaskAssigned => self.task_assigned = on,
            NotificationCategory::TaskUpdates => self.task_updates = on,
            NotificationCategory::TaskOverdue => self.task_overdue = on,
            NotificationCategory::NewRemark => self.new_remark = on,
        }
        self
    }
}
