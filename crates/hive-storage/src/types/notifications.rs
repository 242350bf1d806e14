use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{NotificationId, ParseValueError, UserId, WorkspaceId};

/// Kind of notification delivered to a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TaskAssigned,
    TaskUpdated,
    TaskCompleted,
    NewRemark,
    TaskOverdue,
    JoinRequest,
    JoinApproved,
    JoinRejected,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::TaskAssigned => "task_assigned",
            NotificationType::TaskUpdated => "task_updated",
            NotificationType::TaskCompleted => "task_completed",
            NotificationType::NewRemark => "new_remark",
            NotificationType::TaskOverdue => "task_overdue",
            NotificationType::JoinRequest => "join_request",
            NotificationType::JoinApproved => "join_approved",
            NotificationType::JoinRejected => "join_rejected",
            NotificationType::System => "system",
        }
    }

    /// Settings category that controls this type, if any.
    pub fn category(&self) -> Option<NotificationCategory> {
        match self {
            NotificationType::TaskAssigned => Some(NotificationCategory::TaskAssigned),
            NotificationType::TaskUpdated | NotificationType::TaskCompleted => {
                Some(NotificationCategory::TaskUpdates)
            }
            NotificationType::TaskOverdue => Some(NotificationCategory::TaskOverdue),
            NotificationType::NewRemark => Some(NotificationCategory::NewRemark),
            NotificationType::JoinRequest
            | NotificationType::JoinApproved
            | NotificationType::JoinRejected
            | NotificationType::System => None,
        }
    }
}

impl FromStr for NotificationType {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_assigned" => Ok(NotificationType::TaskAssigned),
            "task_updated" => Ok(NotificationType::TaskUpdated),
            "task_completed" => Ok(NotificationType::TaskCompleted),
            "new_remark" => Ok(NotificationType::NewRemark),
            "task_overdue" => Ok(NotificationType::TaskOverdue),
            "join_request" => Ok(NotificationType::JoinRequest),
            "join_approved" => Ok(NotificationType::JoinApproved),
            "join_rejected" => Ok(NotificationType::JoinRejected),
            "system" => Ok(NotificationType::System),
            _ => Err(ParseValueError::new("notification type", s)),
        }
    }
}

/// Toggle groups exposed in notification settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationCategory {
    TaskAssigned,
    TaskUpdates,
    TaskOverdue,
    NewRemark,
}

/// Notification addressed to a single recipient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub workspace_id: WorkspaceId,
    pub title: String,
    pub message: String,
    pub kind: NotificationType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    /// Id of the task/remark/member the notification is about.
    #[serde(default)]
    pub related_id: Option<String>,
}

impl Notification {
    pub fn new(
        recipient_id: UserId,
        workspace_id: WorkspaceId,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            recipient_id,
            workspace_id,
            title: title.into(),
            message: message.into(),
            kind,
            created_at: Utc::now(),
            is_read: false,
            related_id: None,
        }
    }

    pub fn related_to(mut self, related_id: impl ToString) -> Self {
        self.related_id = Some(related_id.to_string());
        self
    }
}
