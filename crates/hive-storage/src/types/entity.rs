//! Kind-generic addressing of cached entities.
//!
//! The cache, the change feed and the reconciler move entities around without
//! caring which concrete record they hold; [`Entity`] carries the record and
//! [`EntityKind`] / [`EntityKey`] address it.

use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use uuid::Uuid;

use super::{
    AuditLogEntry, Employee, Notification, NotificationSettings, ParseValueError, Remark, Task,
    TaskId, UserId, WorkspaceId,
};

/// Entity kinds held in the cache.
///
/// The declaration order is the lock order for writes spanning several kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Task,
    Remark,
    Employee,
    Notification,
    AuditLog,
    Settings,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Task,
        EntityKind::Remark,
        EntityKind::Employee,
        EntityKind::Notification,
        EntityKind::AuditLog,
        EntityKind::Settings,
    ];

    /// Table name, shared by the local cache, the remote store and the change feed.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Remark => "remarks",
            EntityKind::Employee => "employees",
            EntityKind::Notification => "notifications",
            EntityKind::AuditLog => "audit_logs",
            EntityKind::Settings => "notification_settings",
        }
    }

    /// Extract the cache key from a raw JSON record of this kind.
    pub fn key_of(&self, record: &Value) -> Option<EntityKey> {
        fn uuid_field(record: &Value, field: &str) -> Option<Uuid> {
            record.get(field)?.as_str()?.parse().ok()
        }

        match self {
            EntityKind::Employee => Some(EntityKey::Member {
                user_id: UserId(uuid_field(record, "user_id")?),
                workspace_id: WorkspaceId(uuid_field(record, "workspace_id")?),
            }),
            EntityKind::Settings => uuid_field(record, "user_id").map(EntityKey::Id),
            _ => uuid_field(record, "id").map(EntityKey::Id),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseValueError::new("entity kind", s))
    }
}

/// Primary key of a cached row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// Single-id key. Settings use the owning user's id.
    Id(Uuid),
    /// Roster key.
    Member {
        user_id: UserId,
        workspace_id: WorkspaceId,
    },
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKey::Id(id) => write!(f, "{}", id),
            EntityKey::Member {
                user_id,
                workspace_id,
            } => write!(f, "{}@{}", user_id, workspace_id),
        }
    }
}

macro_rules! key_from_id {
    ($($id:ty),*) => {
        $(
            impl From<$id> for EntityKey {
                fn from(id: $id) -> Self {
                    EntityKey::Id(id.0)
                }
            }
        )*
    };
}

key_from_id!(
    TaskId,
    super::RemarkId,
    super::NotificationId,
    super::AuditLogId,
    UserId
);

/// A record of any cached kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entity {
    Task(Task),
    Remark(Remark),
    Employee(Employee),
    Notification(Notification),
    AuditLog(AuditLogEntry),
    Settings(NotificationSettings),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Task(_) => EntityKind::Task,
            Entity::Remark(_) => EntityKind::Remark,
            Entity::Employee(_) => EntityKind::Employee,
            Entity::Notification(_) => EntityKind::Notification,
            Entity::AuditLog(_) => EntityKind::AuditLog,
            Entity::Settings(_) => EntityKind::Settings,
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Task(t) => t.id.into(),
            Entity::Remark(r) => r.id.into(),
            Entity::Employee(e) => EntityKey::Member {
                user_id: e.user_id,
                workspace_id: e.workspace_id,
            },
            Entity::Notification(n) => n.id.into(),
            Entity::AuditLog(a) => a.id.into(),
            Entity::Settings(s) => s.user_id.into(),
        }
    }

    /// Workspace the record belongs to. Settings are per user and have none.
    pub fn workspace_id(&self) -> Option<WorkspaceId> {
        match self {
            Entity::Task(t) => Some(t.workspace_id),
            Entity::Remark(r) => Some(r.workspace_id),
            Entity::Employee(e) => Some(e.workspace_id),
            Entity::Notification(n) => Some(n.workspace_id),
            Entity::AuditLog(a) => Some(a.workspace_id),
            Entity::Settings(_) => None,
        }
    }

    /// Decode a JSON document as a record of `kind`.
    pub fn from_json(kind: EntityKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EntityKind::Task => Entity::Task(serde_json::from_value(value)?),
            EntityKind::Remark => Entity::Remark(serde_json::from_value(value)?),
            EntityKind::Employee => Entity::Employee(serde_json::from_value(value)?),
            EntityKind::Notification => Entity::Notification(serde_json::from_value(value)?),
            EntityKind::AuditLog => Entity::AuditLog(serde_json::from_value(value)?),
            EntityKind::Settings => Entity::Settings(serde_json::from_value(value)?),
        })
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            Entity::Task(t) => serde_json::to_value(t),
            Entity::Remark(r) => serde_json::to_value(r),
            Entity::Employee(e) => serde_json::to_value(e),
            Entity::Notification(n) => serde_json::to_value(n),
            Entity::AuditLog(a) => serde_json::to_value(a),
            Entity::Settings(s) => serde_json::to_value(s),
        }
    }
}

macro_rules! entity_variant {
    ($variant:ident, $ty:ty, $as_ref:ident) => {
        impl From<$ty> for Entity {
            fn from(value: $ty) -> Self {
                Entity::$variant(value)
            }
        }

        impl TryFrom<Entity> for $ty {
            type Error = Entity;

            fn try_from(entity: Entity) -> Result<Self, Self::Error> {
                match entity {
                    Entity::$variant(value) => Ok(value),
                    other => Err(other),
                }
            }
        }

        impl Entity {
            pub fn $as_ref(&self) -> Option<&$ty> {
                match self {
                    Entity::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

entity_variant!(Task, Task, as_task);
entity_variant!(Remark, Remark, as_remark);
entity_variant!(Employee, Employee, as_employee);
entity_variant!(Notification, Notification, as_notification);
entity_variant!(AuditLog, AuditLogEntry, as_audit_log);
entity_variant!(Settings, NotificationSettings, as_settings);

/// Narrowing applied by [`crate::CacheStore::list`]. Fields that do not apply
/// to the listed kind are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub workspace_id: Option<WorkspaceId>,
    pub assignee_id: Option<UserId>,
    pub task_id: Option<TaskId>,
    pub recipient_id: Option<UserId>,
    pub unread_only: bool,
    pub limit: Option<u32>,
}

impl ListFilter {
    pub fn workspace(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            ..Self::default()
        }
    }

    pub fn assignee(mut self, user_id: UserId) -> Self {
        self.assignee_id = Some(user_id);
        self
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn recipient(mut self, user_id: UserId) -> Self {
        self.recipient_id = Some(user_id);
        self
    }

    pub fn unread_only(mut self, unread_only: bool) -> Self {
        self.unread_only = unread_only;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Rows affected by [`crate::CacheStore::clear`] and [`crate::CacheStore::replace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Workspace(WorkspaceId),
    /// Rows addressed to one user: notifications by recipient, settings by owner.
    Recipient(UserId),
    /// One user's notifications inside one workspace; settings by owner.
    Inbox {
        recipient_id: UserId,
        workspace_id: WorkspaceId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOp {
    Upserted,
    Deleted,
}

/// Emitted after a committed cache write that changed a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheChange {
    pub kind: EntityKind,
    pub key: EntityKey,
    pub op: CacheOp,
}

/// Stream of cache changes.
pub type CacheChanges = Pin<Box<dyn Stream<Item = CacheChange> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MembershipStatus, Role, TaskCounters};

    #[test]
    fn test_kind_table_names_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("users".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_lock_order_follows_declaration() {
        assert!(EntityKind::Task < EntityKind::Remark);
        assert!(EntityKind::Remark < EntityKind::Settings);
    }

    #[test]
    fn test_key_of_employee_record() {
        let user = UserId::new();
        let ws = WorkspaceId::new();
        let record = serde_json::json!({ "user_id": user, "workspace_id": ws, "name": "x" });
        assert_eq!(
            EntityKind::Employee.key_of(&record),
            Some(EntityKey::Member {
                user_id: user,
                workspace_id: ws
            })
        );
    }

    #[test]
    fn test_key_of_missing_id() {
        let record = serde_json::json!({ "title": "no id" });
        assert_eq!(EntityKind::Task.key_of(&record), None);
    }

    #[test]
    fn test_employee_counts_never_leave_the_cache() {
        let employee = Employee {
            user_id: UserId::new(),
            workspace_id: WorkspaceId::new(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role: Role::Member,
            status: MembershipStatus::Approved,
            workspace_name: "Ops".into(),
            task_counts: TaskCounters {
                todo: 3,
                ..TaskCounters::default()
            },
        };
        let json = Entity::from(employee.clone()).to_json().unwrap();
        assert!(json.get("task_counts").is_none());

        let decoded = Entity::from_json(EntityKind::Employee, json).unwrap();
        let decoded = decoded.as_employee().unwrap();
        assert_eq!(decoded.task_counts, TaskCounters::default());
        assert_eq!(decoded.name, employee.name);
    }
}
