//! Audit trail entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuditLogId, ParseValueError, UserId, WorkspaceId};

/// Categories of audited workspace actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Create,
    Update,
    Delete,
    Remark,
    StatusChange,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Create => "create",
            AuditEventType::Update => "update",
            AuditEventType::Delete => "delete",
            AuditEventType::Remark => "remark",
            AuditEventType::StatusChange => "status_change",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditEventType::Create),
            "update" => Ok(AuditEventType::Update),
            "delete" => Ok(AuditEventType::Delete),
            "remark" => Ok(AuditEventType::Remark),
            "status_change" => Ok(AuditEventType::StatusChange),
            _ => Err(ParseValueError::new("audit event type", s)),
        }
    }
}

/// Append-only audit log row.
///
/// Use [`AuditLogEntry::builder`] to construct entries from typed ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditLogId,
    pub event_type: AuditEventType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub actor_id: UserId,
    /// Display name of the actor at the time of the action
    #[serde(default)]
    pub actor_name: String,
    pub created_at: DateTime<Utc>,
    pub workspace_id: WorkspaceId,
}

impl AuditLogEntry {
    pub fn builder(
        workspace_id: WorkspaceId,
        actor_id: UserId,
        event_type: AuditEventType,
    ) -> AuditLogEntryBuilder {
        AuditLogEntryBuilder::new(workspace_id, actor_id, event_type)
    }
}

/// Builder for audit log entries
pub struct AuditLogEntryBuilder {
    workspace_id: WorkspaceId,
    actor_id: UserId,
    event_type: AuditEventType,
    title: String,
    description: String,
    actor_name: String,
}

impl AuditLogEntryBuilder {
    pub fn new(workspace_id: WorkspaceId, actor_id: UserId, event_type: AuditEventType) -> Self {
        Self {
            workspace_id,
            actor_id,
            event_type,
            title: String::new(),
            description: String::new(),
            actor_name: String::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn actor_name(mut self, actor_name: impl Into<String>) -> Self {
        self.actor_name = actor_name.into();
        self
    }

    pub fn build(self) -> AuditLogEntry {
        AuditLogEntry {
            id: AuditLogId::new(),
            event_type: self.event_type,
            title: self.title,
            description: self.description,
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            created_at: Utc::now(),
            workspace_id: self.workspace_id,
        }
    }
}
