//! Role-based write authorization.
//!
//! Every mutation is checked here before it reaches the remote store.

use hive_storage::{Role, UserId};

use crate::session::{Identity, SessionContext};
use crate::SyncError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    CreateTask,
    UpdateTask,
    DeleteTask,
    UpdateTaskStatus,
    ChangeMemberStatus,
    CreateRemark,
    MarkNotificationRead,
    UpdateSettings,
    RequestJoin,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateTask => "create_task",
            Action::UpdateTask => "update_task",
            Action::DeleteTask => "delete_task",
            Action::UpdateTaskStatus => "update_task_status",
            Action::ChangeMemberStatus => "change_member_status",
            Action::CreateRemark => "create_remark",
            Action::MarkNotificationRead => "mark_notification_read",
            Action::UpdateSettings => "update_settings",
            Action::RequestJoin => "request_join",
        }
    }

    /// Actions open to any signed-in identity, approved or not.
    pub fn needs_approval(&self) -> bool {
        !matches!(self, Action::RequestJoin | Action::CreateRemark)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `actor_id` with `actor_role` may perform `action`.
///
/// `resource_owner_id` is the task assignee for status changes and the owner of
/// notifications and settings.
pub fn authorize(
    action: Action,
    actor_role: Role,
    resource_owner_id: Option<&UserId>,
    actor_id: &UserId,
) -> Decision {
    let is_owner = resource_owner_id == Some(actor_id);
    match action {
        Action::CreateTask | Action::UpdateTask | Action::DeleteTask
            if !actor_role.is_organizer() =>
        {
            Decision::Deny(format!("only organizers may {}", action.as_str()))
        }
        Action::ChangeMemberStatus if !actor_role.is_organizer() => {
            Decision::Deny("only organizers may approve or reject members".into())
        }
        Action::UpdateTaskStatus if !actor_role.is_organizer() && !is_owner => {
            Decision::Deny("only organizers or the assignee may change task status".into())
        }
        Action::MarkNotificationRead | Action::UpdateSettings if !is_owner => {
            Decision::Deny(format!("{} is restricted to its owner", action.as_str()))
        }
        _ => Decision::Allow,
    }
}

/// Evaluates [`authorize`] against the current session.
pub struct AuthorizationGate;

impl AuthorizationGate {
    /// Returns the acting identity when `action` is allowed.
    ///
    /// Members awaiting approval may only request to join and leave remarks.
    pub fn check(
        session: &SessionContext,
        action: Action,
        resource_owner_id: Option<&UserId>,
    ) -> Result<Identity, SyncError> {
        let identity = session.require()?;
        if !identity.approved && action.needs_approval() {
            return Err(SyncError::Unauthorized(
                "membership is pending approval".into(),
            ));
        }
        match authorize(action, identity.role, resource_owner_id, &identity.user_id) {
            Decision::Allow => Ok(identity),
            Decision::Deny(reason) => Err(SyncError::Unauthorized(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_storage::WorkspaceId;

    const ORGANIZER_ONLY: [Action; 4] = [
        Action::CreateTask,
        Action::UpdateTask,
        Action::DeleteTask,
        Action::ChangeMemberStatus,
    ];

    #[test]
    fn test_organizer_only_actions() {
        let actor = UserId::new();
        for action in ORGANIZER_ONLY {
            assert!(authorize(action, Role::Organizer, None, &actor).is_allowed());
            assert!(!authorize(action, Role::Member, None, &actor).is_allowed());
            // Owning the resource does not help a member here.
            assert!(!authorize(action, Role::Member, Some(&actor), &actor).is_allowed());
        }
    }

    #[test]
    fn test_status_change_allowed_for_assignee() {
        let assignee = UserId::new();
        let other = UserId::new();

        assert!(authorize(Action::UpdateTaskStatus, Role::Member, Some(&assignee), &assignee)
            .is_allowed());
        assert!(!authorize(Action::UpdateTaskStatus, Role::Member, Some(&assignee), &other)
            .is_allowed());
        assert!(!authorize(Action::UpdateTaskStatus, Role::Member, None, &other).is_allowed());
        assert!(authorize(Action::UpdateTaskStatus, Role::Organizer, Some(&assignee), &other)
            .is_allowed());
    }

    #[test]
    fn test_any_identity_may_remark_and_request_join() {
        let actor = UserId::new();
        for role in [Role::Organizer, Role::Member] {
            assert_eq!(
                authorize(Action::CreateRemark, role, None, &actor),
                Decision::Allow
            );
            assert_eq!(
                authorize(Action::RequestJoin, role, None, &actor),
                Decision::Allow
            );
        }
    }

    #[test]
    fn test_owner_only_actions() {
        let me = UserId::new();
        let someone = UserId::new();
        for action in [Action::MarkNotificationRead, Action::UpdateSettings] {
            assert!(authorize(action, Role::Member, Some(&me), &me).is_allowed());
            assert!(!authorize(action, Role::Organizer, Some(&someone), &me).is_allowed());
        }
    }

    #[test]
    fn test_gate_without_identity() {
        let session = SessionContext::new();
        assert!(matches!(
            AuthorizationGate::check(&session, Action::CreateRemark, None),
            Err(SyncError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_gate_denies_with_reason() {
        let session = SessionContext::new();
        session.login(Identity::new(UserId::new(), WorkspaceId::new(), Role::Member));

        let err = AuthorizationGate::check(&session, Action::DeleteTask, None).unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized(reason) if reason.contains("organizers")));
    }

    #[test]
    fn test_pending_member_may_only_join_and_remark() {
        let session = SessionContext::new();
        let me = UserId::new();
        session.login(Identity::new(me, WorkspaceId::new(), Role::Organizer).pending());

        assert!(AuthorizationGate::check(&session, Action::RequestJoin, None).is_ok());
        assert!(AuthorizationGate::check(&session, Action::CreateRemark, None).is_ok());
        for action in [Action::CreateTask, Action::ChangeMemberStatus] {
            assert!(matches!(
                AuthorizationGate::check(&session, action, None),
                Err(SyncError::Unauthorized(reason)) if reason.contains("pending")
            ));
        }
        assert!(matches!(
            AuthorizationGate::check(&session, Action::UpdateSettings, Some(&me)),
            Err(SyncError::Unauthorized(_))
        ));
    }
}
