mod common;

use common::{employee, member, organizer, task, Harness};
use hive_events_memory::MemoryChangeFeed;
use hive_remote::{MockRemoteStore, PullScope, RemoteSyncClient};
use hive_storage::{
    AuditEventType, CacheStore, Entity, EntityKind, MembershipStatus, NotificationCategory,
    NotificationSettings, NotificationType, Role, TaskStatus, UserId, WorkspaceId,
};
use hive_store_sqlite::SqliteCache;
use hive_sync::{Identity, MemberDecision, NewTask, SessionContext, SyncError, WorkspaceService};
use std::sync::Arc;

/// Service over a remote that fails the test on any write.
async fn guarded_service() -> (SessionContext, Arc<SqliteCache>, WorkspaceService) {
    let mut remote = MockRemoteStore::new();
    remote.expect_create().times(0);
    remote.expect_update().times(0);
    remote.expect_delete().times(0);
    remote.expect_get_by_id().times(0);

    let cache = Arc::new(SqliteCache::open_in_memory().await.unwrap());
    let session = SessionContext::new();
    let client = RemoteSyncClient::new(Arc::new(remote), Arc::new(MemoryChangeFeed::new()));
    let service = WorkspaceService::new(session.clone(), cache.clone(), client);
    (session, cache, service)
}

async fn pulled(h: &Harness, kind: EntityKind, scope: PullScope) -> Vec<Entity> {
    h.remote.client().pull_all(kind, &scope).await.unwrap()
}

#[tokio::test]
async fn writes_without_identity_are_not_authenticated() {
    let (_session, _cache, service) = guarded_service().await;

    let err = service.create_task(NewTask::new("Launch")).await.unwrap_err();
    assert!(matches!(err, SyncError::NotAuthenticated));
    let err = service
        .update_settings(NotificationSettings::all_enabled(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotAuthenticated));
}

#[tokio::test]
async fn members_cannot_manage_tasks_or_roster() {
    let (session, cache, service) = guarded_service().await;
    let ws = WorkspaceId::new();
    let me = UserId::new();
    session.login(member(ws, me));

    let existing = task(ws, "Launch", Some(me), UserId::new());
    cache
        .upsert(EntityKind::Task, &[existing.clone().into()])
        .await
        .unwrap();

    assert!(matches!(
        service.create_task(NewTask::new("mine")).await,
        Err(SyncError::Unauthorized(_))
    ));
    assert!(matches!(
        service.update_task(existing.clone()).await,
        Err(SyncError::Unauthorized(_))
    ));
    assert!(matches!(
        service.delete_task(&existing.id).await,
        Err(SyncError::Unauthorized(_))
    ));
    assert!(matches!(
        service
            .set_member_status(&UserId::new(), MemberDecision::Approve)
            .await,
        Err(SyncError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn status_change_by_someone_else_never_reaches_the_remote() {
    let (session, cache, service) = guarded_service().await;
    let ws = WorkspaceId::new();
    let assignee = UserId::new();
    let launch = task(ws, "Launch", Some(assignee), UserId::new());
    cache
        .upsert(EntityKind::Task, &[launch.clone().into()])
        .await
        .unwrap();

    session.login(member(ws, UserId::new()));
    let err = service
        .update_task_status(&launch.id, TaskStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized(_)));

    let cached = cache.get(EntityKind::Task, &launch.id.into()).await.unwrap();
    assert_eq!(cached, Some(Entity::Task(launch)));
}

#[tokio::test]
async fn owner_checks_on_uncached_rows_never_reach_the_remote() {
    let (session, _cache, service) = guarded_service().await;
    session.login(member(WorkspaceId::new(), UserId::new()));

    let err = service
        .update_task_status(&hive_storage::TaskId::new(), TaskStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized(_)));

    let err = service
        .mark_notification_read(&hive_storage::NotificationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized(_)));
}

#[tokio::test]
async fn organizer_status_change_falls_back_to_the_remote_row() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    h.session.login(organizer(ws));
    let launch = task(ws, "Launch", Some(UserId::new()), UserId::new());
    h.remote.seed([launch.clone().into()]).await;

    let moved = h
        .service
        .update_task_status(&launch.id, TaskStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(moved.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn pending_members_cannot_manage_the_workspace() {
    let (session, _cache, service) = guarded_service().await;
    let ws = WorkspaceId::new();
    session.login(Identity::new(UserId::new(), ws, Role::Organizer).pending());

    assert!(matches!(
        service.create_task(NewTask::new("too early")).await,
        Err(SyncError::Unauthorized(_))
    ));
    assert!(matches!(
        service
            .set_member_status(&UserId::new(), MemberDecision::Approve)
            .await,
        Err(SyncError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn pending_members_may_still_leave_remarks() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    h.session.login(organizer(ws));
    let launch = h
        .service
        .create_task(NewTask::new("Launch"))
        .await
        .unwrap();

    let newcomer = UserId::new();
    h.session
        .login(Identity::new(newcomer, ws, Role::Member).pending());
    let remark = h.service.add_remark(&launch.id, "hello").await.unwrap();
    assert_eq!(remark.author_id, newcomer);
    assert_eq!(remark.task_id, launch.id);
}

#[tokio::test]
async fn organizer_assigns_and_assignee_moves_the_task() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    let olive = organizer(ws);
    let u2 = UserId::new();
    let u3 = UserId::new();

    h.session.login(olive.clone());
    let launch = h
        .service
        .create_task(NewTask::new("Launch").assignee(u2))
        .await
        .unwrap();
    assert_eq!(launch.workspace_id, ws);
    assert_eq!(launch.creator_id, olive.user_id);
    assert_eq!(launch.status, TaskStatus::Todo);
    assert_eq!(h.service.task(&launch.id).await, Some(launch.clone()));

    let assigned = pulled(
        &h,
        EntityKind::Notification,
        PullScope::workspace(ws).for_recipient(u2),
    )
    .await;
    assert_eq!(assigned.len(), 1);
    let notice = assigned[0].as_notification().unwrap();
    assert_eq!(notice.kind, NotificationType::TaskAssigned);
    assert_eq!(notice.related_id, Some(launch.id.to_string()));

    h.session.login(member(ws, u2));
    let moved = h
        .service
        .update_task_status(&launch.id, TaskStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(moved.status, TaskStatus::InProgress);
    assert_eq!(
        h.remote.row(EntityKind::Task, &launch.id.into()).await,
        Some(Entity::Task(moved.clone()))
    );

    h.session.login(member(ws, u3));
    let err = h
        .service
        .update_task_status(&launch.id, TaskStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized(_)));
    assert_eq!(
        h.remote.row(EntityKind::Task, &launch.id.into()).await,
        Some(Entity::Task(moved))
    );

    let updates = pulled(
        &h,
        EntityKind::Notification,
        PullScope::workspace(ws).for_recipient(olive.user_id),
    )
    .await;
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].as_notification().unwrap().kind,
        NotificationType::TaskUpdated
    );
}

#[tokio::test]
async fn writes_leave_an_audit_trail() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    let olive = organizer(ws);
    h.session.login(olive.clone());

    let launch = h.service.create_task(NewTask::new("Launch")).await.unwrap();
    h.service
        .update_task_status(&launch.id, TaskStatus::Done)
        .await
        .unwrap();
    h.service.add_remark(&launch.id, "shipped").await.unwrap();

    let events: Vec<AuditEventType> = h
        .service
        .audit_log()
        .await
        .into_iter()
        .map(|e| {
            assert_eq!(e.actor_id, olive.user_id);
            assert_eq!(e.actor_name, "Olive");
            e.event_type
        })
        .collect();
    assert_eq!(events.len(), 3);
    for expected in [
        AuditEventType::Create,
        AuditEventType::StatusChange,
        AuditEventType::Remark,
    ] {
        assert!(events.contains(&expected), "missing {expected:?}");
    }
    assert_eq!(
        pulled(&h, EntityKind::AuditLog, PullScope::workspace(ws))
            .await
            .len(),
        3
    );
}

#[tokio::test]
async fn task_cannot_move_to_another_workspace() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    h.session.login(organizer(ws));
    let launch = h.service.create_task(NewTask::new("Launch")).await.unwrap();

    let mut moved = launch.clone();
    moved.workspace_id = WorkspaceId::new();
    let err = h.service.update_task(moved).await.unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized(_)));
    assert_eq!(
        h.remote.row(EntityKind::Task, &launch.id.into()).await,
        Some(Entity::Task(launch))
    );
}

#[tokio::test]
async fn organizer_of_another_workspace_cannot_touch_the_task() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    h.session.login(organizer(ws));
    let launch = h.service.create_task(NewTask::new("Launch")).await.unwrap();

    h.session.login(organizer(WorkspaceId::new()));
    assert!(matches!(
        h.service.delete_task(&launch.id).await,
        Err(SyncError::Unauthorized(_))
    ));
    assert!(h
        .remote
        .row(EntityKind::Task, &launch.id.into())
        .await
        .is_some());
}

#[tokio::test]
async fn reassignment_notifies_the_new_assignee() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    h.session.login(organizer(ws));
    let launch = h.service.create_task(NewTask::new("Launch")).await.unwrap();

    let u2 = UserId::new();
    let updated = h
        .service
        .update_task(hive_storage::Task {
            assignee_id: Some(u2),
            ..launch
        })
        .await
        .unwrap();
    assert_eq!(updated.assignee_id, Some(u2));

    let notices = pulled(
        &h,
        EntityKind::Notification,
        PullScope::workspace(ws).for_recipient(u2),
    )
    .await;
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0].as_notification().unwrap().kind,
        NotificationType::TaskAssigned
    );
}

#[tokio::test]
async fn deleting_a_task_removes_it_and_its_remarks() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    h.session.login(organizer(ws));
    let launch = h.service.create_task(NewTask::new("Launch")).await.unwrap();
    let remark = h.service.add_remark(&launch.id, "first").await.unwrap();

    h.service.delete_task(&launch.id).await.unwrap();
    assert!(h.service.task(&launch.id).await.is_none());
    assert!(h
        .remote
        .row(EntityKind::Remark, &remark.id.into())
        .await
        .is_none());
    assert!(matches!(
        h.service.delete_task(&launch.id).await,
        Err(SyncError::NotFound)
    ));
}

#[tokio::test]
async fn settings_are_created_on_first_update() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    let me = UserId::new();
    h.session.login(member(ws, me));
    assert!(h.service.settings().await.is_none());

    let muted = NotificationSettings::all_enabled(me).with(NotificationCategory::NewRemark, false);
    let stored = h.service.update_settings(muted).await.unwrap();
    assert!(!stored.new_remark);
    assert_eq!(h.service.settings().await, Some(stored.clone()));

    let again = h
        .service
        .update_settings(stored.with(NotificationCategory::NewRemark, true))
        .await
        .unwrap();
    assert!(again.new_remark);
    assert_eq!(
        h.remote.row(EntityKind::Settings, &me.into()).await,
        Some(Entity::Settings(again))
    );

    assert!(matches!(
        h.service
            .update_settings(NotificationSettings::all_enabled(UserId::new()))
            .await,
        Err(SyncError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn marking_a_notification_read_is_limited_to_its_recipient() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    let olive = organizer(ws);
    let u2 = UserId::new();
    h.session.login(olive.clone());
    h.service
        .create_task(NewTask::new("Launch").assignee(u2))
        .await
        .unwrap();
    let notice = pulled(
        &h,
        EntityKind::Notification,
        PullScope::workspace(ws).for_recipient(u2),
    )
    .await
    .remove(0);
    let notice_id = notice.as_notification().unwrap().id;

    assert!(matches!(
        h.service.mark_notification_read(&notice_id).await,
        Err(SyncError::Unauthorized(_))
    ));

    h.session.login(member(ws, u2));
    let read = h.service.mark_notification_read(&notice_id).await.unwrap();
    assert!(read.is_read);
    assert!(h.service.notifications(true).await.is_empty());
}

#[tokio::test]
async fn join_requests_reach_organizers_and_can_be_approved() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    let olive = organizer(ws);
    h.remote
        .seed([employee(ws, olive.user_id, "Olive", Role::Organizer).into()])
        .await;

    let newcomer = UserId::new();
    h.session
        .login(Identity::new(newcomer, WorkspaceId::new(), Role::Member).pending());
    let request = h
        .service
        .request_join(ws, "Nina", "nina@example.com")
        .await
        .unwrap();
    assert_eq!(request.status, MembershipStatus::Pending);

    let inbox = pulled(
        &h,
        EntityKind::Notification,
        PullScope::workspace(ws).for_recipient(olive.user_id),
    )
    .await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(
        inbox[0].as_notification().unwrap().kind,
        NotificationType::JoinRequest
    );

    h.session.login(olive);
    h.service
        .set_member_status(&newcomer, MemberDecision::Approve)
        .await
        .unwrap();
    let roster = pulled(&h, EntityKind::Employee, PullScope::workspace(ws)).await;
    let nina = roster
        .iter()
        .filter_map(Entity::as_employee)
        .find(|m| m.user_id == newcomer)
        .unwrap();
    assert!(nina.is_approved());

    let answer = pulled(
        &h,
        EntityKind::Notification,
        PullScope::workspace(ws).for_recipient(newcomer),
    )
    .await;
    assert_eq!(
        answer[0].as_notification().unwrap().kind,
        NotificationType::JoinApproved
    );
}

#[tokio::test]
async fn rejected_members_are_removed() {
    let h = Harness::new().await;
    let ws = WorkspaceId::new();
    let pending_user = UserId::new();
    let mut pending = employee(ws, pending_user, "Pat", Role::Member);
    pending.status = MembershipStatus::Pending;
    h.remote.seed([pending.into()]).await;

    h.session.login(organizer(ws));
    h.service
        .set_member_status(&pending_user, MemberDecision::Reject)
        .await
        .unwrap();
    assert!(pulled(&h, EntityKind::Employee, PullScope::workspace(ws))
        .await
        .is_empty());
    assert!(matches!(
        h.service
            .set_member_status(&pending_user, MemberDecision::Reject)
            .await,
        Err(SyncError::NotFound)
    ));
}

#[tokio::test]
async fn unconfigured_remote_rejects_writes_but_serves_reads() {
    let cache = Arc::new(SqliteCache::open_in_memory().await.unwrap());
    let session = SessionContext::new();
    let service =
        WorkspaceService::new(session.clone(), cache.clone(), RemoteSyncClient::unconfigured());
    let ws = WorkspaceId::new();
    let olive = organizer(ws);
    session.login(olive.clone());

    let cached = task(ws, "offline", None, olive.user_id);
    cache
        .upsert(EntityKind::Task, &[cached.clone().into()])
        .await
        .unwrap();

    let err = service.create_task(NewTask::new("Launch")).await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteUnavailable(_)));
    assert_eq!(service.tasks().await, vec![cached]);
    assert!(!service.refresh(EntityKind::Task).await.is_fresh());
}
