#![allow(dead_code)]

use chrono::Utc;
use hive_remote::MemoryRemote;
use hive_storage::{
    Employee, MembershipStatus, Priority, Role, Task, TaskCounters, TaskId, TaskStatus, UserId,
    WorkspaceId,
};
use hive_store_sqlite::SqliteCache;
use hive_sync::{
    Backoff, Identity, Reconciler, SessionContext, SubscriptionManager, WorkspaceService,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// In-memory remote, in-memory SQLite cache and a service over both.
pub struct Harness {
    pub remote: MemoryRemote,
    pub cache: Arc<SqliteCache>,
    pub session: SessionContext,
    pub service: WorkspaceService,
}

impl Harness {
    pub async fn new() -> Self {
        let remote = MemoryRemote::new();
        let cache = Arc::new(SqliteCache::open_in_memory().await.unwrap());
        let session = SessionContext::new();
        let service = WorkspaceService::new(session.clone(), cache.clone(), remote.client());
        Self {
            remote,
            cache,
            session,
            service,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.cache.clone())
    }

    pub fn manager(&self, backoff: Backoff) -> Arc<SubscriptionManager> {
        Arc::new(SubscriptionManager::new(
            self.remote.client(),
            self.reconciler(),
            backoff,
        ))
    }
}

pub fn fast_backoff(max_retries: u32) -> Backoff {
    Backoff {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(40),
        max_retries,
    }
}

pub fn task(ws: WorkspaceId, title: &str, assignee: Option<UserId>, creator: UserId) -> Task {
    Task {
        id: TaskId::new(),
        workspace_id: ws,
        title: title.to_string(),
        description: String::new(),
        status: TaskStatus::Todo,
        priority: Priority::Medium,
        assignee_id: assignee,
        creator_id: creator,
        due_at: None,
        created_at: Utc::now(),
    }
}

pub fn employee(ws: WorkspaceId, user: UserId, name: &str, role: Role) -> Employee {
    Employee {
        user_id: user,
        workspace_id: ws,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        role,
        status: MembershipStatus::Approved,
        workspace_name: "Acme".to_string(),
        task_counts: TaskCounters::default(),
    }
}

pub fn organizer(ws: WorkspaceId) -> Identity {
    Identity::new(UserId::new(), ws, Role::Organizer).named("Olive")
}

pub fn member(ws: WorkspaceId, user: UserId) -> Identity {
    Identity::new(user, ws, Role::Member)
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
