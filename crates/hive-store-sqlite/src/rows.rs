//! Row mapping and per-table SQL for the cache schema.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use hive_storage::{
    AuditLogEntry, AuditLogId, CacheChange, CacheOp, ClearScope, Employee, Entity, EntityKey,
    EntityKind, ListFilter, Notification, NotificationId, NotificationSettings, Remark, RemarkId,
    StoreError, Task, TaskCounters, TaskId, UserId, WorkspaceId,
};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

pub(crate) fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn codec(e: impl std::fmt::Display) -> StoreError {
    StoreError::Codec(e.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(codec)
}

/// Timestamps are stored as fixed-width RFC 3339 text with nanoseconds, so text
/// order is time order. That holds for years 0 through 9999 only.
fn stamp(t: &DateTime<Utc>) -> Result<String, StoreError> {
    if !(0..=9999).contains(&t.year()) {
        return Err(StoreError::Codec(format!("timestamp out of range: {}", t)));
    }
    Ok(t.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

fn time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(codec)
}

const TASK_COLS: &[&str] = &[
    "id",
    "workspace_id",
    "title",
    "description",
    "status",
    "priority",
    "assignee_id",
    "creator_id",
    "due_at",
    "created_at",
];
const REMARK_COLS: &[&str] = &[
    "id",
    "task_id",
    "workspace_id",
    "message",
    "author_id",
    "created_at",
];
const EMPLOYEE_COLS: &[&str] = &[
    "user_id",
    "workspace_id",
    "name",
    "email",
    "role",
    "status",
    "workspace_name",
];
const COUNT_COLS: &[&str] = &[
    "user_id",
    "workspace_id",
    "todo",
    "in_progress",
    "pending_completion",
    "done",
];
const NOTIFICATION_COLS: &[&str] = &[
    "id",
    "recipient_id",
    "workspace_id",
    "title",
    "message",
    "kind",
    "created_at",
    "is_read",
    "related_id",
];
const AUDIT_COLS: &[&str] = &[
    "id",
    "event_type",
    "title",
    "description",
    "actor_id",
    "actor_name",
    "created_at",
    "workspace_id",
];
const SETTINGS_COLS: &[&str] = &[
    "user_id",
    "task_assigned",
    "task_updates",
    "task_overdue",
    "new_remark",
    "updated_at",
];

/// Primary key columns of a table.
fn key_cols(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Employee => &["user_id", "workspace_id"],
        EntityKind::Settings => &["user_id"],
        _ => &["id"],
    }
}

/// `INSERT .. ON CONFLICT DO UPDATE` that only touches the row when a column differs,
/// so re-applying an identical record affects zero rows.
fn upsert_sql(table: &str, keys: &[&str], cols: &[&str]) -> String {
    let placeholders = vec!["?"; cols.len()].join(",");
    let data: Vec<&str> = cols.iter().copied().filter(|c| !keys.contains(c)).collect();
    let set = data
        .iter()
        .map(|c| format!("{c}=excluded.{c}"))
        .collect::<Vec<_>>()
        .join(",");
    let changed = data
        .iter()
        .map(|c| format!("{table}.{c} IS NOT excluded.{c}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "INSERT INTO {table}({}) VALUES({placeholders}) ON CONFLICT({}) DO UPDATE SET {set} WHERE {changed}",
        cols.join(","),
        keys.join(","),
    )
}

fn select_sql(table: &str, cols: &[&str]) -> String {
    format!("SELECT {} FROM {table}", cols.join(","))
}

fn employee_select() -> String {
    format!(
        "SELECT {}, COALESCE(c.todo,0), COALESCE(c.in_progress,0), COALESCE(c.pending_completion,0), COALESCE(c.done,0)
         FROM employees e LEFT JOIN employee_task_counts c
           ON c.user_id=e.user_id AND c.workspace_id=e.workspace_id",
        EMPLOYEE_COLS
            .iter()
            .map(|c| format!("e.{c}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

// ───────────────────────────── Row decoding ─────────────────────────────

type TaskRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
);
type RemarkRow = (String, String, String, String, String, String);
type EmployeeRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    i64,
);
type NotificationRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
);
type AuditRow = (String, String, String, String, String, String, String, String);
type SettingsRow = (String, bool, bool, bool, bool, String);

fn task_from_row(r: TaskRow) -> Result<Entity, StoreError> {
    let (id, ws, title, description, status, priority, assignee, creator, due, created) = r;
    Ok(Entity::Task(Task {
        id: TaskId(parse_uuid(&id)?),
        workspace_id: WorkspaceId(parse_uuid(&ws)?),
        title,
        description,
        status: status.parse().map_err(codec)?,
        priority: priority.parse().map_err(codec)?,
        assignee_id: assignee.as_deref().map(parse_uuid).transpose()?.map(UserId),
        creator_id: UserId(parse_uuid(&creator)?),
        due_at: due.as_deref().map(time).transpose()?,
        created_at: time(&created)?,
    }))
}

fn remark_from_row(r: RemarkRow) -> Result<Entity, StoreError> {
    let (id, task_id, ws, message, author, created) = r;
    Ok(Entity::Remark(Remark {
        id: RemarkId(parse_uuid(&id)?),
        task_id: TaskId(parse_uuid(&task_id)?),
        workspace_id: WorkspaceId(parse_uuid(&ws)?),
        message,
        author_id: UserId(parse_uuid(&author)?),
        created_at: time(&created)?,
    }))
}

fn employee_from_row(r: EmployeeRow) -> Result<Entity, StoreError> {
    let (user, ws, name, email, role, status, ws_name, todo, in_progress, pending, done) = r;
    Ok(Entity::Employee(Employee {
        user_id: UserId(parse_uuid(&user)?),
        workspace_id: WorkspaceId(parse_uuid(&ws)?),
        name,
        email,
        role: role.parse().map_err(codec)?,
        status: status.parse().map_err(codec)?,
        workspace_name: ws_name,
        task_counts: TaskCounters {
            todo: todo as u32,
            in_progress: in_progress as u32,
            pending_completion: pending as u32,
            done: done as u32,
        },
    }))
}

fn notification_from_row(r: NotificationRow) -> Result<Entity, StoreError> {
    let (id, recipient, ws, title, message, kind, created, is_read, related_id) = r;
    Ok(Entity::Notification(Notification {
        id: NotificationId(parse_uuid(&id)?),
        recipient_id: UserId(parse_uuid(&recipient)?),
        workspace_id: WorkspaceId(parse_uuid(&ws)?),
        title,
        message,
        kind: kind.parse().map_err(codec)?,
        created_at: time(&created)?,
        is_read,
        related_id,
    }))
}

fn audit_from_row(r: AuditRow) -> Result<Entity, StoreError> {
    let (id, event_type, title, description, actor, actor_name, created, ws) = r;
    Ok(Entity::AuditLog(AuditLogEntry {
        id: AuditLogId(parse_uuid(&id)?),
        event_type: event_type.parse().map_err(codec)?,
        title,
        description,
        actor_id: UserId(parse_uuid(&actor)?),
        actor_name,
        created_at: time(&created)?,
        workspace_id: WorkspaceId(parse_uuid(&ws)?),
    }))
}

fn settings_from_row(r: SettingsRow) -> Result<Entity, StoreError> {
    let (user, task_assigned, task_updates, task_overdue, new_remark, updated) = r;
    Ok(Entity::Settings(NotificationSettings {
        user_id: UserId(parse_uuid(&user)?),
        task_assigned,
        task_updates,
        task_overdue,
        new_remark,
        updated_at: time(&updated)?,
    }))
}

// ───────────────────────────── Reads ─────────────────────────────

pub(crate) async fn get(
    pool: &SqlitePool,
    kind: EntityKind,
    key: &EntityKey,
) -> Result<Option<Entity>, StoreError> {
    let (a, b) = match key {
        EntityKey::Id(id) => (id.to_string(), None),
        EntityKey::Member {
            user_id,
            workspace_id,
        } => (user_id.to_string(), Some(workspace_id.to_string())),
    };

    match (kind, b) {
        (EntityKind::Employee, Some(ws)) => {
            let sql = format!("{} WHERE e.user_id=? AND e.workspace_id=?", employee_select());
            sqlx::query_as::<_, EmployeeRow>(&sql)
                .bind(a)
                .bind(ws)
                .fetch_optional(pool)
                .await
                .map_err(backend)?
                .map(employee_from_row)
                .transpose()
        }
        // Roster rows need the composite key; other kinds need a single id.
        (EntityKind::Employee, None) | (_, Some(_)) => Ok(None),
        (EntityKind::Task, None) => {
            let sql = format!("{} WHERE id=?", select_sql("tasks", TASK_COLS));
            sqlx::query_as::<_, TaskRow>(&sql)
                .bind(a)
                .fetch_optional(pool)
                .await
                .map_err(backend)?
                .map(task_from_row)
                .transpose()
        }
        (EntityKind::Remark, None) => {
            let sql = format!("{} WHERE id=?", select_sql("remarks", REMARK_COLS));
            sqlx::query_as::<_, RemarkRow>(&sql)
                .bind(a)
                .fetch_optional(pool)
                .await
                .map_err(backend)?
                .map(remark_from_row)
                .transpose()
        }
        (EntityKind::Notification, None) => {
            let sql = format!(
                "{} WHERE id=?",
                select_sql("notifications", NOTIFICATION_COLS)
            );
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(a)
                .fetch_optional(pool)
                .await
                .map_err(backend)?
                .map(notification_from_row)
                .transpose()
        }
        (EntityKind::AuditLog, None) => {
            let sql = format!("{} WHERE id=?", select_sql("audit_logs", AUDIT_COLS));
            sqlx::query_as::<_, AuditRow>(&sql)
                .bind(a)
                .fetch_optional(pool)
                .await
                .map_err(backend)?
                .map(audit_from_row)
                .transpose()
        }
        (EntityKind::Settings, None) => {
            let sql = format!(
                "{} WHERE user_id=?",
                select_sql("notification_settings", SETTINGS_COLS)
            );
            sqlx::query_as::<_, SettingsRow>(&sql)
                .bind(a)
                .fetch_optional(pool)
                .await
                .map_err(backend)?
                .map(settings_from_row)
                .transpose()
        }
    }
}

pub(crate) async fn list(
    pool: &SqlitePool,
    kind: EntityKind,
    filter: &ListFilter,
) -> Result<Vec<Entity>, StoreError> {
    let ws = filter.workspace_id.map(|w| w.to_string());
    let limit = filter.limit.map(i64::from).unwrap_or(-1);

    match kind {
        EntityKind::Task => {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR workspace_id=?1) AND (?2 IS NULL OR assignee_id=?2)
                 ORDER BY created_at ASC, id ASC LIMIT ?3",
                select_sql("tasks", TASK_COLS)
            );
            sqlx::query_as::<_, TaskRow>(&sql)
                .bind(ws)
                .bind(filter.assignee_id.map(|u| u.to_string()))
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_err(backend)?
                .into_iter()
                .map(task_from_row)
                .collect()
        }
        EntityKind::Remark => {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR workspace_id=?1) AND (?2 IS NULL OR task_id=?2)
                 ORDER BY created_at DESC, id DESC LIMIT ?3",
                select_sql("remarks", REMARK_COLS)
            );
            sqlx::query_as::<_, RemarkRow>(&sql)
                .bind(ws)
                .bind(filter.task_id.map(|t| t.to_string()))
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_err(backend)?
                .into_iter()
                .map(remark_from_row)
                .collect()
        }
        EntityKind::Employee => {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR e.workspace_id=?1) ORDER BY e.name ASC, e.user_id ASC LIMIT ?2",
                employee_select()
            );
            sqlx::query_as::<_, EmployeeRow>(&sql)
                .bind(ws)
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_err(backend)?
                .into_iter()
                .map(employee_from_row)
                .collect()
        }
        EntityKind::Notification => {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR workspace_id=?1) AND (?2 IS NULL OR recipient_id=?2)
                   AND (?3 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, id DESC LIMIT ?4",
                select_sql("notifications", NOTIFICATION_COLS)
            );
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(ws)
                .bind(filter.recipient_id.map(|u| u.to_string()))
                .bind(filter.unread_only)
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_err(backend)?
                .into_iter()
                .map(notification_from_row)
                .collect()
        }
        EntityKind::AuditLog => {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR workspace_id=?1) ORDER BY created_at DESC, id DESC LIMIT ?2",
                select_sql("audit_logs", AUDIT_COLS)
            );
            sqlx::query_as::<_, AuditRow>(&sql)
                .bind(ws)
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_err(backend)?
                .into_iter()
                .map(audit_from_row)
                .collect()
        }
        EntityKind::Settings => {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR user_id=?1) ORDER BY user_id LIMIT ?2",
                select_sql("notification_settings", SETTINGS_COLS)
            );
            sqlx::query_as::<_, SettingsRow>(&sql)
                .bind(filter.recipient_id.map(|u| u.to_string()))
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_err(backend)?
                .into_iter()
                .map(settings_from_row)
                .collect()
        }
    }
}

// ───────────────────────────── Writes ─────────────────────────────

/// Insert or update one row; returns whether the stored row changed.
pub(crate) async fn upsert_one(
    conn: &mut SqliteConnection,
    entity: &Entity,
) -> Result<bool, StoreError> {
    let kind = entity.kind();
    let keys = key_cols(kind);

    let result = match entity {
        Entity::Task(t) => {
            sqlx::query(&upsert_sql("tasks", keys, TASK_COLS))
                .bind(t.id.to_string())
                .bind(t.workspace_id.to_string())
                .bind(&t.title)
                .bind(&t.description)
                .bind(t.status.as_str())
                .bind(t.priority.as_str())
                .bind(t.assignee_id.map(|u| u.to_string()))
                .bind(t.creator_id.to_string())
                .bind(t.due_at.as_ref().map(stamp).transpose()?)
                .bind(stamp(&t.created_at)?)
                .execute(&mut *conn)
                .await
        }
        Entity::Remark(r) => {
            sqlx::query(&upsert_sql("remarks", keys, REMARK_COLS))
                .bind(r.id.to_string())
                .bind(r.task_id.to_string())
                .bind(r.workspace_id.to_string())
                .bind(&r.message)
                .bind(r.author_id.to_string())
                .bind(stamp(&r.created_at)?)
                .execute(&mut *conn)
                .await
        }
        // Counters live in their own table and are written by `set_counts`.
        Entity::Employee(e) => {
            sqlx::query(&upsert_sql("employees", keys, EMPLOYEE_COLS))
                .bind(e.user_id.to_string())
                .bind(e.workspace_id.to_string())
                .bind(&e.name)
                .bind(&e.email)
                .bind(e.role.as_str())
                .bind(e.status.as_str())
                .bind(&e.workspace_name)
                .execute(&mut *conn)
                .await
        }
        Entity::Notification(n) => {
            sqlx::query(&upsert_sql("notifications", keys, NOTIFICATION_COLS))
                .bind(n.id.to_string())
                .bind(n.recipient_id.to_string())
                .bind(n.workspace_id.to_string())
                .bind(&n.title)
                .bind(&n.message)
                .bind(n.kind.as_str())
                .bind(stamp(&n.created_at)?)
                .bind(n.is_read)
                .bind(n.related_id.as_deref())
                .execute(&mut *conn)
                .await
        }
        Entity::AuditLog(a) => {
            sqlx::query(&upsert_sql("audit_logs", keys, AUDIT_COLS))
                .bind(a.id.to_string())
                .bind(a.event_type.as_str())
                .bind(&a.title)
                .bind(&a.description)
                .bind(a.actor_id.to_string())
                .bind(&a.actor_name)
                .bind(stamp(&a.created_at)?)
                .bind(a.workspace_id.to_string())
                .execute(&mut *conn)
                .await
        }
        Entity::Settings(s) => {
            sqlx::query(&upsert_sql("notification_settings", keys, SETTINGS_COLS))
                .bind(s.user_id.to_string())
                .bind(s.task_assigned)
                .bind(s.task_updates)
                .bind(s.task_overdue)
                .bind(s.new_remark)
                .bind(stamp(&s.updated_at)?)
                .execute(&mut *conn)
                .await
        }
    };

    Ok(result.map_err(backend)?.rows_affected() > 0)
}

/// Write one member's counters; returns whether they changed.
pub(crate) async fn set_counts(
    conn: &mut SqliteConnection,
    workspace_id: &WorkspaceId,
    user_id: &UserId,
    counts: &TaskCounters,
) -> Result<bool, StoreError> {
    let result = sqlx::query(&upsert_sql(
        "employee_task_counts",
        &["user_id", "workspace_id"],
        COUNT_COLS,
    ))
    .bind(user_id.to_string())
    .bind(workspace_id.to_string())
    .bind(i64::from(counts.todo))
    .bind(i64::from(counts.in_progress))
    .bind(i64::from(counts.pending_completion))
    .bind(i64::from(counts.done))
    .execute(&mut *conn)
    .await
    .map_err(backend)?;
    Ok(result.rows_affected() > 0)
}

/// WHERE clause and bind values selecting the rows of `kind` inside `scope`.
fn scope_clause(kind: EntityKind, scope: &ClearScope) -> (&'static str, Vec<String>) {
    match (kind, scope) {
        (_, ClearScope::All) => ("1=1", vec![]),
        (EntityKind::Settings, ClearScope::Recipient(user))
        | (EntityKind::Settings, ClearScope::Inbox { recipient_id: user, .. }) => {
            ("user_id=?", vec![user.to_string()])
        }
        (EntityKind::Settings, ClearScope::Workspace(_)) => ("0=1", vec![]),
        (_, ClearScope::Workspace(ws)) => ("workspace_id=?", vec![ws.to_string()]),
        (EntityKind::Notification, ClearScope::Recipient(user)) => {
            ("recipient_id=?", vec![user.to_string()])
        }
        (
            EntityKind::Notification,
            ClearScope::Inbox {
                recipient_id,
                workspace_id,
            },
        ) => (
            "recipient_id=? AND workspace_id=?",
            vec![recipient_id.to_string(), workspace_id.to_string()],
        ),
        // Rows of other kinds are not addressed to a recipient.
        (_, ClearScope::Recipient(_)) => ("0=1", vec![]),
        (_, ClearScope::Inbox { workspace_id, .. }) => {
            ("workspace_id=?", vec![workspace_id.to_string()])
        }
    }
}

/// Keys of the rows of `kind` inside `scope`.
pub(crate) async fn keys_in_scope(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    scope: &ClearScope,
) -> Result<Vec<EntityKey>, StoreError> {
    let (clause, binds) = scope_clause(kind, scope);
    let cols = match kind {
        EntityKind::Employee => "user_id, workspace_id",
        EntityKind::Settings => "user_id, NULL",
        _ => "id, NULL",
    };
    let sql = format!("SELECT {cols} FROM {} WHERE {clause}", kind.as_str());

    let mut query = sqlx::query_as::<_, (String, Option<String>)>(&sql);
    for value in &binds {
        query = query.bind(value.as_str());
    }
    let rows = query.fetch_all(&mut *conn).await.map_err(backend)?;

    rows.into_iter()
        .map(|(a, b)| {
            let a = parse_uuid(&a)?;
            Ok(match b {
                Some(ws) => EntityKey::Member {
                    user_id: UserId(a),
                    workspace_id: WorkspaceId(parse_uuid(&ws)?),
                },
                None => EntityKey::Id(a),
            })
        })
        .collect()
}

/// Delete one row (and dependent rows). Returns the change records of every
/// row removed; empty if nothing existed.
pub(crate) async fn delete_one(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    key: &EntityKey,
) -> Result<Vec<CacheChange>, StoreError> {
    let deleted = |kind, key| CacheChange {
        kind,
        key,
        op: CacheOp::Deleted,
    };
    let mut changes = Vec::new();

    match (kind, key) {
        (
            EntityKind::Employee,
            EntityKey::Member {
                user_id,
                workspace_id,
            },
        ) => {
            sqlx::query("DELETE FROM employee_task_counts WHERE user_id=? AND workspace_id=?")
                .bind(user_id.to_string())
                .bind(workspace_id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(backend)?;
            let result = sqlx::query("DELETE FROM employees WHERE user_id=? AND workspace_id=?")
                .bind(user_id.to_string())
                .bind(workspace_id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(backend)?;
            if result.rows_affected() > 0 {
                changes.push(deleted(kind, *key));
            }
        }
        (EntityKind::Employee, EntityKey::Id(_)) | (_, EntityKey::Member { .. }) => {}
        (EntityKind::Task, EntityKey::Id(id)) => {
            let result = sqlx::query("DELETE FROM tasks WHERE id=?")
                .bind(id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(backend)?;
            if result.rows_affected() > 0 {
                changes.push(deleted(kind, *key));
            }

            let remark_ids =
                sqlx::query_as::<_, (String,)>("SELECT id FROM remarks WHERE task_id=?")
                    .bind(id.to_string())
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(backend)?;
            sqlx::query("DELETE FROM remarks WHERE task_id=?")
                .bind(id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(backend)?;
            for (remark_id,) in remark_ids {
                changes.push(deleted(
                    EntityKind::Remark,
                    EntityKey::Id(parse_uuid(&remark_id)?),
                ));
            }
        }
        (_, EntityKey::Id(id)) => {
            let pk = key_cols(kind)[0];
            let sql = format!("DELETE FROM {} WHERE {pk}=?", kind.as_str());
            let result = sqlx::query(&sql)
                .bind(id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(backend)?;
            if result.rows_affected() > 0 {
                changes.push(deleted(kind, *key));
            }
        }
    }

    Ok(changes)
}
