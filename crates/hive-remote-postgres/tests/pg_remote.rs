//! Needs a scratch PostgreSQL database:
//! `HIVE_TEST_DATABASE_URL=postgres://... cargo test -p hive-remote-postgres -- --ignored`

use chrono::Utc;
use futures::StreamExt;
use hive_events::{ChangeEvent, ChangeFeed};
use hive_remote::{PullScope, RemoteError, RemoteStore};
use hive_remote_postgres::PgRemote;
use hive_storage::{
    Entity, EntityKind, Priority, Remark, RemarkId, Task, TaskId, TaskStatus, UserId, WorkspaceId,
};
use std::time::Duration;

async fn remote() -> PgRemote {
    let url = std::env::var("HIVE_TEST_DATABASE_URL").expect("HIVE_TEST_DATABASE_URL not set");
    PgRemote::open(&url).await.unwrap()
}

fn task(ws: WorkspaceId) -> Task {
    Task {
        id: TaskId::new(),
        workspace_id: ws,
        title: "Launch".into(),
        description: "ship it".into(),
        status: TaskStatus::Todo,
        priority: Priority::High,
        assignee_id: Some(UserId::new()),
        creator_id: UserId::new(),
        due_at: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore]
async fn create_pull_update_delete() {
    let remote = remote().await;
    let ws = WorkspaceId::new();

    let created = remote.create(task(ws).into()).await.unwrap();
    let Entity::Task(mut created) = created else {
        panic!("expected a task");
    };

    let pulled = remote
        .pull_all(EntityKind::Task, &PullScope::workspace(ws))
        .await
        .unwrap();
    assert_eq!(pulled, vec![Entity::Task(created.clone())]);

    created.status = TaskStatus::InProgress;
    let updated = remote.update(created.clone().into()).await.unwrap();
    assert_eq!(updated, Entity::Task(created.clone()));

    let remark = Remark {
        id: RemarkId::new(),
        task_id: created.id,
        workspace_id: ws,
        message: "on it".into(),
        author_id: UserId::new(),
        created_at: Utc::now(),
    };
    remote.create(remark.clone().into()).await.unwrap();

    remote
        .delete(EntityKind::Task, &created.id.into())
        .await
        .unwrap();
    assert_eq!(
        remote
            .get_by_id(EntityKind::Remark, &remark.id.into())
            .await
            .unwrap(),
        None
    );
    assert!(matches!(
        remote.delete(EntityKind::Task, &created.id.into()).await,
        Err(RemoteError::NotFound)
    ));
}

#[tokio::test]
#[ignore]
async fn triggers_feed_workspace_scoped_changes() {
    let remote = remote().await;
    let ws = WorkspaceId::new();
    let mut stream = remote.subscribe(EntityKind::Task, &ws).await.unwrap();

    remote.create(task(WorkspaceId::new()).into()).await.unwrap();
    let mine = remote.create(task(ws).into()).await.unwrap();

    let raw = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended");
    assert_eq!(
        raw.decode(EntityKind::Task).unwrap(),
        ChangeEvent::Inserted(mine)
    );
}
