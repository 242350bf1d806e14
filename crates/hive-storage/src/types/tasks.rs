use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ParseValueError, TaskId, UserId, WorkspaceId};

/// Task progress state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    PendingCompletion,
    Done,
}

impl FromStr for TaskStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "pending_completion" => Ok(TaskStatus::PendingCompletion),
            "done" => Ok(TaskStatus::Done),
            _ => Err(ParseValueError::new("task status", s)),
        }
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::PendingCompletion => "pending_completion",
            TaskStatus::Done => "done",
        }
    }
}

/// Task priority
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(ParseValueError::new("priority", s)),
        }
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Task record. `workspace_id` is fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workspace_id: WorkspaceId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub assignee_id: Option<UserId>,
    pub creator_id: UserId,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Done && self.due_at.is_some_and(|due| due < now)
    }

    pub fn is_assigned_to(&self, user_id: &UserId) -> bool {
        self.assignee_id.as_ref() == Some(user_id)
    }
}

/// Per-status counters of the tasks assigned to one roster member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    pub todo: u32,
    pub in_progress: u32,
    pub pending_completion: u32,
    pub done: u32,
}

impl TaskCounters {
    /// Count the tasks in `tasks` assigned to `user_id`.
    pub fn tally<'a>(tasks: impl IntoIterator<Item = &'a Task>, user_id: &UserId) -> Self {
        let mut counters = Self::default();
        for task in tasks.into_iter().filter(|t| t.is_assigned_to(user_id)) {
            match task.status {
                TaskStatus::Todo => counters.todo += 1,
                TaskStatus::InProgress => counters.in_progress += 1,
                TaskStatus::PendingCompletion => counters.pending_completion += 1,
                TaskStatus::Done => counters.done += 1,
            }
        }
        counters
    }

    pub fn total(&self) -> u32 {
        self.todo + self.in_progress + self.pending_completion + self.done
    }

    pub fn open(&self) -> u32 {
        self.total() - self.done
    }
}
