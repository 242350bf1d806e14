//! Read facade and write path for the current workspace.
//!
//! Reads come from the local cache and never fail; a broken cache reads as
//! empty. Writes are authorized, sent to the remote store, and written back to
//! the cache once the remote accepted them. Audit entries and notifications
//! follow as best-effort side effects.

use chrono::{DateTime, Utc};
use hive_remote::{PullScope, RemoteError, RemoteSyncClient};
use hive_storage::{
    AuditEventType, AuditLogEntry, CacheStore, Employee, Entity, EntityKey, EntityKind,
    ListFilter, MembershipStatus, Notification, NotificationId, NotificationSettings,
    NotificationType, Priority, Remark, RemarkId, Role, Task, TaskCounters, TaskId, TaskStatus,
    UserId, WorkspaceId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::authz::{Action, AuthorizationGate};
use crate::reconcile::Reconciler;
use crate::session::{Identity, SessionContext};
use crate::SyncError;

/// Kinds pulled by [`WorkspaceService::refresh_all`], in pull order.
///
/// Settings come first so pulled notifications are filtered by fresh toggles,
/// tasks before the roster so its counters see them.
pub const REFRESH_ORDER: [EntityKind; 6] = [
    EntityKind::Settings,
    EntityKind::Task,
    EntityKind::Remark,
    EntityKind::Employee,
    EntityKind::Notification,
    EntityKind::AuditLog,
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Fresh { rows: usize },
    /// The cache was left as it was.
    Stale(String),
}

impl RefreshOutcome {
    pub fn is_fresh(&self) -> bool {
        matches!(self, RefreshOutcome::Fresh { .. })
    }
}

/// Fields of a task to be created.
#[derive(Clone, Debug)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub assignee_id: Option<UserId>,
    pub due_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            assignee_id: None,
            due_at: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn assignee(mut self, user_id: UserId) -> Self {
        self.assignee_id = Some(user_id);
        self
    }

    pub fn due(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberDecision {
    Approve,
    Reject,
}

pub struct WorkspaceService {
    session: SessionContext,
    cache: Arc<dyn CacheStore>,
    remote: RemoteSyncClient,
    reconciler: Reconciler,
}

impl WorkspaceService {
    pub fn new(
        session: SessionContext,
        cache: Arc<dyn CacheStore>,
        remote: RemoteSyncClient,
    ) -> Self {
        let reconciler = Reconciler::new(cache.clone());
        Self {
            session,
            cache,
            remote,
            reconciler,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    // ───────────────────────────────────── Reads ──────────────────────────────────────────

    pub async fn tasks(&self) -> Vec<Task> {
        let Some(identity) = self.session.current() else {
            return Vec::new();
        };
        self.read(EntityKind::Task, ListFilter::workspace(identity.workspace_id))
            .await
    }

    /// Tasks assigned to the signed-in user.
    pub async fn my_tasks(&self) -> Vec<Task> {
        let Some(identity) = self.session.current() else {
            return Vec::new();
        };
        self.read(
            EntityKind::Task,
            ListFilter::workspace(identity.workspace_id).assignee(identity.user_id),
        )
        .await
    }

    pub async fn task(&self, task_id: &TaskId) -> Option<Task> {
        let identity = self.session.current()?;
        self.cached::<Task>(EntityKind::Task, &(*task_id).into())
            .await
            .filter(|t| t.workspace_id == identity.workspace_id)
    }

    pub async fn overdue_tasks(&self, now: DateTime<Utc>) -> Vec<Task> {
        self.tasks()
            .await
            .into_iter()
            .filter(|t| t.is_overdue(now))
            .collect()
    }

    /// Remarks of one task, newest first.
    pub async fn remarks(&self, task_id: &TaskId) -> Vec<Remark> {
        let Some(identity) = self.session.current() else {
            return Vec::new();
        };
        self.read(
            EntityKind::Remark,
            ListFilter::workspace(identity.workspace_id).task(*task_id),
        )
        .await
    }

    pub async fn roster(&self) -> Vec<Employee> {
        let Some(identity) = self.session.current() else {
            return Vec::new();
        };
        self.read(
            EntityKind::Employee,
            ListFilter::workspace(identity.workspace_id),
        )
        .await
    }

    /// The signed-in user's notifications in the current workspace, newest first.
    pub async fn notifications(&self, unread_only: bool) -> Vec<Notification> {
        let Some(identity) = self.session.current() else {
            return Vec::new();
        };
        self.read(
            EntityKind::Notification,
            ListFilter::workspace(identity.workspace_id)
                .recipient(identity.user_id)
                .unread_only(unread_only),
        )
        .await
    }

    pub async fn audit_log(&self) -> Vec<AuditLogEntry> {
        let Some(identity) = self.session.current() else {
            return Vec::new();
        };
        self.read(
            EntityKind::AuditLog,
            ListFilter::workspace(identity.workspace_id),
        )
        .await
    }

    pub async fn settings(&self) -> Option<NotificationSettings> {
        let identity = self.session.current()?;
        self.cached(EntityKind::Settings, &identity.user_id.into())
            .await
    }

    // ───────────────────────────────────── Refresh ────────────────────────────────────────

    /// Bulk pull one kind for the current session and replace the cached rows.
    pub async fn refresh(&self, kind: EntityKind) -> RefreshOutcome {
        let Some(identity) = self.session.current() else {
            return RefreshOutcome::Stale(SyncError::NotAuthenticated.to_string());
        };
        let scope = identity.pull_scope();

        let rows = match self.remote.pull_all(kind, &scope).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(kind = %kind, "Refresh failed; keeping cached rows: {}", e);
                return RefreshOutcome::Stale(e.to_string());
            }
        };

        match self.reconciler.apply_pull(kind, &scope, rows).await {
            Ok(rows) => {
                if kind == EntityKind::Employee {
                    self.recount(&identity.workspace_id).await;
                }
                RefreshOutcome::Fresh { rows }
            }
            Err(e) => {
                warn!(kind = %kind, "Failed to apply refresh: {}", e);
                RefreshOutcome::Stale(e.to_string())
            }
        }
    }

    pub async fn refresh_all(&self) -> Vec<(EntityKind, RefreshOutcome)> {
        let mut outcomes = Vec::with_capacity(REFRESH_ORDER.len());
        for kind in REFRESH_ORDER {
            outcomes.push((kind, self.refresh(kind).await));
        }
        let fresh = outcomes.iter().filter(|(_, o)| o.is_fresh()).count();
        info!("Refreshed {}/{} kinds", fresh, outcomes.len());
        outcomes
    }

    // ───────────────────────────────────── Tasks ──────────────────────────────────────────

    pub async fn create_task(&self, draft: NewTask) -> Result<Task, SyncError> {
        let actor = AuthorizationGate::check(&self.session, Action::CreateTask, None)?;
        let task = Task {
            id: TaskId::new(),
            workspace_id: actor.workspace_id,
            title: draft.title,
            description: draft.description,
            status: TaskStatus::Todo,
            priority: draft.priority,
            assignee_id: draft.assignee_id,
            creator_id: actor.user_id,
            due_at: draft.due_at,
            created_at: Utc::now(),
        };

        let stored: Task = into_kind(self.remote.create(task.into()).await?)?;
        self.write_back(stored.clone().into()).await;
        info!(task = %stored.id, "Task created");

        self.audit(
            &actor,
            AuditEventType::Create,
            format!("Task created: {}", stored.title),
            stored.description.clone(),
        )
        .await;
        if let Some(assignee) = stored.assignee_id.filter(|a| *a != actor.user_id) {
            self.notify(assigned(&stored, assignee)).await;
        }
        self.recount(&stored.workspace_id).await;
        Ok(stored)
    }

    /// Replace a task. Its workspace cannot change.
    pub async fn update_task(&self, task: Task) -> Result<Task, SyncError> {
        let actor = AuthorizationGate::check(&self.session, Action::UpdateTask, None)?;
        let previous: Task = self.load(EntityKind::Task, &task.id.into()).await?;
        same_workspace(&actor, previous.workspace_id)?;
        if task.workspace_id != previous.workspace_id {
            return Err(SyncError::Unauthorized(
                "workspace of a task cannot change".into(),
            ));
        }

        let stored: Task = into_kind(self.remote.update(task.into()).await?)?;
        self.write_back(stored.clone().into()).await;

        self.audit(
            &actor,
            AuditEventType::Update,
            format!("Task updated: {}", stored.title),
            stored.description.clone(),
        )
        .await;

        let reassigned = stored.assignee_id != previous.assignee_id;
        let notification = match stored.assignee_id.filter(|a| *a != actor.user_id) {
            Some(assignee) if reassigned => Some(assigned(&stored, assignee)),
            _ if stored.status == TaskStatus::Done && previous.status != TaskStatus::Done => {
                completed(&stored, actor.user_id)
            }
            Some(assignee) => Some(
                Notification::new(
                    assignee,
                    stored.workspace_id,
                    NotificationType::TaskUpdated,
                    "Task updated",
                    format!("\"{}\" was updated", stored.title),
                )
                .related_to(stored.id),
            ),
            None => None,
        };
        if let Some(n) = notification {
            self.notify(n).await;
        }
        self.recount(&stored.workspace_id).await;
        Ok(stored)
    }

    /// Move a task to another status. Allowed to organizers and the assignee.
    pub async fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> Result<Task, SyncError> {
        self.session.require()?;
        let previous: Task = self
            .load_owned(Action::UpdateTaskStatus, EntityKind::Task, &(*task_id).into())
            .await?;
        let actor = AuthorizationGate::check(
            &self.session,
            Action::UpdateTaskStatus,
            previous.assignee_id.as_ref(),
        )?;
        same_workspace(&actor, previous.workspace_id)?;
        if previous.status == status {
            return Ok(previous);
        }

        let updated = Task {
            status,
            ..previous.clone()
        };
        let stored: Task = into_kind(self.remote.update(updated.into()).await?)?;
        self.write_back(stored.clone().into()).await;
        info!(task = %stored.id, status = stored.status.as_str(), "Task status changed");

        self.audit(
            &actor,
            AuditEventType::StatusChange,
            format!("Status changed: {}", stored.title),
            format!(
                "from {} to {}",
                previous.status.as_str(),
                stored.status.as_str()
            ),
        )
        .await;
        let notification = if stored.status == TaskStatus::Done {
            completed(&stored, actor.user_id)
        } else {
            (stored.creator_id != actor.user_id).then(|| {
                Notification::new(
                    stored.creator_id,
                    stored.workspace_id,
                    NotificationType::TaskUpdated,
                    "Task status changed",
                    format!("\"{}\" is now {}", stored.title, stored.status.as_str()),
                )
                .related_to(stored.id)
            })
        };
        if let Some(n) = notification {
            self.notify(n).await;
        }
        self.recount(&stored.workspace_id).await;
        Ok(stored)
    }

    /// Delete a task together with its remarks.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), SyncError> {
        let actor = AuthorizationGate::check(&self.session, Action::DeleteTask, None)?;
        let key: EntityKey = (*task_id).into();
        let previous: Task = self.load(EntityKind::Task, &key).await?;
        same_workspace(&actor, previous.workspace_id)?;

        self.remote.delete(EntityKind::Task, &key).await?;
        if let Err(e) = self.cache.delete(EntityKind::Task, &key).await {
            warn!(task = %task_id, "Failed to drop deleted task from cache: {}", e);
        }
        info!(task = %task_id, "Task deleted");

        self.audit(
            &actor,
            AuditEventType::Delete,
            format!("Task deleted: {}", previous.title),
            String::new(),
        )
        .await;
        self.recount(&previous.workspace_id).await;
        Ok(())
    }

    // ───────────────────────────────────── Remarks ────────────────────────────────────────

    pub async fn add_remark(
        &self,
        task_id: &TaskId,
        message: impl Into<String>,
    ) -> Result<Remark, SyncError> {
        let actor = AuthorizationGate::check(&self.session, Action::CreateRemark, None)?;
        let task: Task = self.load(EntityKind::Task, &(*task_id).into()).await?;
        same_workspace(&actor, task.workspace_id)?;

        let remark = Remark {
            id: RemarkId::new(),
            task_id: task.id,
            workspace_id: task.workspace_id,
            message: message.into(),
            author_id: actor.user_id,
            created_at: Utc::now(),
        };
        let stored: Remark = into_kind(self.remote.create(remark.into()).await?)?;
        self.write_back(stored.clone().into()).await;

        self.audit(
            &actor,
            AuditEventType::Remark,
            format!("Remark on {}", task.title),
            stored.message.clone(),
        )
        .await;
        if let Some(assignee) = task.assignee_id.filter(|a| *a != actor.user_id) {
            self.notify(
                Notification::new(
                    assignee,
                    task.workspace_id,
                    NotificationType::NewRemark,
                    "New remark",
                    format!("{} commented on \"{}\"", actor.display_name, task.title),
                )
                .related_to(task.id),
            )
            .await;
        }
        Ok(stored)
    }

    // ───────────────────────────────────── Roster ─────────────────────────────────────────

    /// Ask to join `workspace_id`. Organizers of that workspace are notified.
    pub async fn request_join(
        &self,
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Employee, SyncError> {
        let actor = AuthorizationGate::check(&self.session, Action::RequestJoin, None)?;
        let member = Employee {
            user_id: actor.user_id,
            workspace_id,
            name: name.into(),
            email: email.into(),
            role: Role::Member,
            status: MembershipStatus::Pending,
            workspace_name: String::new(),
            task_counts: TaskCounters::default(),
        };
        let stored: Employee = into_kind(self.remote.create(member.into()).await?)?;
        self.write_back(stored.clone().into()).await;
        info!(workspace = %workspace_id, "Join requested");

        for organizer in self.organizers_of(workspace_id).await {
            self.notify(
                Notification::new(
                    organizer,
                    workspace_id,
                    NotificationType::JoinRequest,
                    "Join request",
                    format!("{} asked to join", stored.name),
                )
                .related_to(stored.user_id),
            )
            .await;
        }
        Ok(stored)
    }

    /// Approve or reject a member of the current workspace.
    pub async fn set_member_status(
        &self,
        user_id: &UserId,
        decision: MemberDecision,
    ) -> Result<(), SyncError> {
        let actor = AuthorizationGate::check(&self.session, Action::ChangeMemberStatus, None)?;
        let key = EntityKey::Member {
            user_id: *user_id,
            workspace_id: actor.workspace_id,
        };
        let member: Employee = self.load(EntityKind::Employee, &key).await?;

        let (notice, event_type, title) = match decision {
            MemberDecision::Approve => {
                let approved = Employee {
                    status: MembershipStatus::Approved,
                    ..member.clone()
                };
                let stored: Employee = into_kind(self.remote.update(approved.into()).await?)?;
                self.write_back(stored.into()).await;
                (
                    NotificationType::JoinApproved,
                    AuditEventType::Update,
                    "Member approved",
                )
            }
            MemberDecision::Reject => {
                self.remote.delete(EntityKind::Employee, &key).await?;
                if let Err(e) = self.cache.delete(EntityKind::Employee, &key).await {
                    warn!(member = %key, "Failed to drop rejected member from cache: {}", e);
                }
                (
                    NotificationType::JoinRejected,
                    AuditEventType::Delete,
                    "Member rejected",
                )
            }
        };
        info!(member = %key, "{}", title);

        self.audit(
            &actor,
            event_type,
            format!("{}: {}", title, member.name),
            member.email.clone(),
        )
        .await;
        self.notify(Notification::new(
            *user_id,
            actor.workspace_id,
            notice,
            title,
            format!("Your request to join was {}", match decision {
                MemberDecision::Approve => "approved",
                MemberDecision::Reject => "rejected",
            }),
        ))
        .await;
        self.recount(&actor.workspace_id).await;
        Ok(())
    }

    // ───────────────────────────────────── Notifications ──────────────────────────────────

    pub async fn mark_notification_read(
        &self,
        notification_id: &NotificationId,
    ) -> Result<Notification, SyncError> {
        self.session.require()?;
        let notification: Notification = self
            .load_owned(
                Action::MarkNotificationRead,
                EntityKind::Notification,
                &(*notification_id).into(),
            )
            .await?;
        AuthorizationGate::check(
            &self.session,
            Action::MarkNotificationRead,
            Some(&notification.recipient_id),
        )?;
        if notification.is_read {
            return Ok(notification);
        }

        let read = Notification {
            is_read: true,
            ..notification
        };
        let stored: Notification = into_kind(self.remote.update(read.into()).await?)?;
        self.write_back(stored.clone().into()).await;
        Ok(stored)
    }

    /// Store the signed-in user's toggles, creating the record on first use.
    pub async fn update_settings(
        &self,
        settings: NotificationSettings,
    ) -> Result<NotificationSettings, SyncError> {
        AuthorizationGate::check(
            &self.session,
            Action::UpdateSettings,
            Some(&settings.user_id),
        )?;
        let settings = NotificationSettings {
            updated_at: Utc::now(),
            ..settings
        };

        let stored = match self.remote.update(settings.clone().into()).await {
            Err(RemoteError::NotFound) => {
                debug!("No settings record yet; creating one");
                self.remote.create(settings.into()).await?
            }
            other => other?,
        };
        let stored: NotificationSettings = into_kind(stored)?;
        self.write_back(stored.clone().into()).await;
        Ok(stored)
    }

    // ───────────────────────────────────── Helpers ────────────────────────────────────────

    async fn read<T: TryFrom<Entity>>(&self, kind: EntityKind, filter: ListFilter) -> Vec<T> {
        match self.cache.list(kind, &filter).await {
            Ok(rows) => rows.into_iter().filter_map(|e| T::try_from(e).ok()).collect(),
            Err(e) => {
                warn!(kind = %kind, "Cache read failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn cached<T: TryFrom<Entity>>(&self, kind: EntityKind, key: &EntityKey) -> Option<T> {
        match self.cache.get(kind, key).await {
            Ok(row) => row.and_then(|e| T::try_from(e).ok()),
            Err(e) => {
                warn!(kind = %kind, "Cache read failed: {}", e);
                None
            }
        }
    }

    /// Cached row, or the remote one when the cache does not have it.
    async fn load<T: TryFrom<Entity>>(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<T, SyncError> {
        if let Some(row) = self.cached(kind, key).await {
            return Ok(row);
        }
        let row = self
            .remote
            .get_by_id(kind, key)
            .await?
            .ok_or(SyncError::NotFound)?;
        into_kind(row)
    }

    /// Like [`Self::load`] for actions decided by the row's owner.
    ///
    /// The owner of an uncached row is unknown, so the remote is only asked when
    /// the actor is allowed regardless of ownership.
    async fn load_owned<T: TryFrom<Entity>>(
        &self,
        action: Action,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<T, SyncError> {
        if let Some(row) = self.cached(kind, key).await {
            return Ok(row);
        }
        AuthorizationGate::check(&self.session, action, None)?;
        self.load(kind, key).await
    }

    async fn write_back(&self, entity: Entity) {
        if let Err(e) = self
            .cache
            .upsert(entity.kind(), std::slice::from_ref(&entity))
            .await
        {
            warn!(kind = %entity.kind(), "Cache write-back failed; the next pull repairs it: {}", e);
        }
    }

    async fn audit(
        &self,
        actor: &Identity,
        event_type: AuditEventType,
        title: String,
        description: String,
    ) {
        let entry = AuditLogEntry::builder(actor.workspace_id, actor.user_id, event_type)
            .title(title)
            .description(description)
            .actor_name(actor.display_name.as_str())
            .build();
        match self.remote.create(entry.into()).await {
            Ok(stored) => self.write_back(stored).await,
            Err(e) => warn!("Failed to record audit entry: {}", e),
        }
    }

    async fn notify(&self, notification: Notification) {
        let recipient = notification.recipient_id;
        match self.remote.create(notification.into()).await {
            Ok(_) => debug!(recipient = %recipient, "notification sent"),
            Err(e) => warn!(recipient = %recipient, "Failed to send notification: {}", e),
        }
    }

    /// Approved organizers of a workspace, as the remote roster lists them.
    async fn organizers_of(&self, workspace_id: WorkspaceId) -> Vec<UserId> {
        match self
            .remote
            .pull_all(EntityKind::Employee, &PullScope::workspace(workspace_id))
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|e| Employee::try_from(e).ok())
                .filter(|m| m.role == Role::Organizer && m.is_approved())
                .map(|m| m.user_id)
                .collect(),
            Err(e) => {
                warn!(workspace = %workspace_id, "Failed to look up organizers: {}", e);
                Vec::new()
            }
        }
    }

    /// Recompute roster task counters from cached tasks.
    async fn recount(&self, workspace_id: &WorkspaceId) {
        let tasks: Vec<Task> = self
            .read(EntityKind::Task, ListFilter::workspace(*workspace_id))
            .await;
        let roster: Vec<Employee> = self
            .read(EntityKind::Employee, ListFilter::workspace(*workspace_id))
            .await;
        let counts: Vec<_> = roster
            .iter()
            .map(|m| (m.user_id, TaskCounters::tally(&tasks, &m.user_id)))
            .collect();
        if let Err(e) = self.cache.set_task_counts(workspace_id, &counts).await {
            warn!(workspace = %workspace_id, "Failed to store task counters: {}", e);
        }
    }
}

fn into_kind<T: TryFrom<Entity>>(entity: Entity) -> Result<T, SyncError> {
    let kind = entity.kind();
    T::try_from(entity).map_err(|_| SyncError::Decode(format!("unexpected {} row", kind)))
}

fn same_workspace(actor: &Identity, workspace_id: WorkspaceId) -> Result<(), SyncError> {
    if actor.workspace_id == workspace_id {
        Ok(())
    } else {
        Err(SyncError::Unauthorized(
            "resource belongs to another workspace".into(),
        ))
    }
}

fn assigned(task: &Task, assignee: UserId) -> Notification {
    Notification::new(
        assignee,
        task.workspace_id,
        NotificationType::TaskAssigned,
        "New task assigned",
        format!("You were assigned \"{}\"", task.title),
    )
    .related_to(task.id)
}

/// Completion notice for the creator, unless the creator completed it.
fn completed(task: &Task, actor_id: UserId) -> Option<Notification> {
    (task.creator_id != actor_id).then(|| {
        Notification::new(
            task.creator_id,
            task.workspace_id,
            NotificationType::TaskCompleted,
            "Task completed",
            format!("\"{}\" is done", task.title),
        )
        .related_to(task.id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_builder() {
        let assignee = UserId::new();
        let draft = NewTask::new("Launch")
            .description("ship it")
            .priority(Priority::High)
            .assignee(assignee);
        assert_eq!(draft.title, "Launch");
        assert_eq!(draft.priority, Priority::High);
        assert_eq!(draft.assignee_id, Some(assignee));
        assert!(draft.due_at.is_none());
    }

    #[test]
    fn test_completed_skips_self() {
        let creator = UserId::new();
        let task = Task {
            id: TaskId::new(),
            workspace_id: WorkspaceId::new(),
            title: "t".into(),
            description: String::new(),
            status: TaskStatus::Done,
            priority: Priority::Low,
            assignee_id: None,
            creator_id: creator,
            due_at: None,
            created_at: Utc::now(),
        };
        assert!(completed(&task, creator).is_none());
        let n = completed(&task, UserId::new()).unwrap();
        assert_eq!(n.recipient_id, creator);
        assert_eq!(n.kind, NotificationType::TaskCompleted);
    }

    #[test]
    fn test_refresh_order_puts_settings_first_and_tasks_before_roster() {
        assert_eq!(REFRESH_ORDER[0], EntityKind::Settings);
        let pos = |k| REFRESH_ORDER.iter().position(|x| *x == k).unwrap();
        assert!(pos(EntityKind::Task) < pos(EntityKind::Employee));
    }
}
