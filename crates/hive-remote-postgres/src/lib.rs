//! PostgreSQL remote store and LISTEN/NOTIFY change feed.
//!
//! Rows travel as JSON documents (`row_to_json` on the way out,
//! `json_populate_record` on the way in) so the remote shares one serde codec
//! with the change feed payloads emitted by the `hive_notify_change` trigger.

use async_trait::async_trait;
use futures::StreamExt;
use hive_events::{ChangeFeed, ChangeStream, FeedError, RawChange};
use hive_remote::{PullScope, RemoteError, RemoteStore};
use hive_storage::{Entity, EntityKey, EntityKind, WorkspaceId};
use serde_json::Value;
use sqlx::{
    postgres::{PgListener, PgPoolOptions},
    PgPool,
};
use tracing::{debug, warn};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Notification channel of one table.
pub fn channel_name(kind: EntityKind) -> String {
    format!("hive_{}", kind.as_str())
}

/// Writable columns per table, key columns first.
fn columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Task => &[
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
        ],
        EntityKind::Remark => &[
            "id",
            "task_id",
            "workspace_id",
            "message",
            "author_id",
            "created_at",
        ],
        EntityKind::Employee => &[
            "user_id",
            "workspace_id",
            "name",
            "email",
            "role",
            "status",
            "workspace_name",
        ],
        EntityKind::Notification => &[
            "id",
            "recipient_id",
            "workspace_id",
            "title",
            "message",
            "kind",
            "created_at",
            "is_read",
            "related_id",
        ],
        EntityKind::AuditLog => &[
            "id",
            "event_type",
            "title",
            "description",
            "actor_id",
            "actor_name",
            "created_at",
            "workspace_id",
        ],
        EntityKind::Settings => &[
            "user_id",
            "task_assigned",
            "task_updates",
            "task_overdue",
            "new_remark",
            "updated_at",
        ],
    }
}

fn key_columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Employee => &["user_id", "workspace_id"],
        EntityKind::Settings => &["user_id"],
        _ => &["id"],
    }
}

/// `WHERE` clause matching a key, with parameters starting at `$first`.
fn key_clause(kind: EntityKind, alias: &str, first: usize) -> String {
    key_columns(kind)
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{alias}.{col} = ${}", first + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn key_values(key: &EntityKey) -> Vec<Uuid> {
    match key {
        EntityKey::Id(id) => vec![*id],
        EntityKey::Member {
            user_id,
            workspace_id,
        } => vec![user_id.0, workspace_id.0],
    }
}

fn insert_sql(kind: EntityKind) -> String {
    let table = kind.as_str();
    let cols = columns(kind).join(",");
    format!(
        "INSERT INTO {table}({cols}) SELECT {cols} FROM json_populate_record(NULL::{table}, $1::json)
         RETURNING row_to_json({table}.*)"
    )
}

fn update_sql(kind: EntityKind) -> String {
    let table = kind.as_str();
    let keys = key_columns(kind);
    let set = columns(kind)
        .iter()
        .filter(|c| !keys.contains(c))
        .map(|c| format!("{c} = r.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let matches = keys
        .iter()
        .map(|c| format!("t.{c} = r.{c}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "UPDATE {table} AS t SET {set} FROM json_populate_record(NULL::{table}, $1::json) AS r
         WHERE {matches} RETURNING row_to_json(t.*)"
    )
}

fn remote_err(e: sqlx::Error) -> RemoteError {
    match e {
        sqlx::Error::RowNotFound => RemoteError::NotFound,
        sqlx::Error::Database(db) => RemoteError::Rejected(db.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RemoteError::Decode(e.to_string())
        }
        other => RemoteError::Unavailable(other.to_string()),
    }
}

fn decode(kind: EntityKind, row: Value) -> Result<Entity, RemoteError> {
    Entity::from_json(kind, row).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Parse one notification payload; `None` if it is malformed or belongs to
/// another workspace.
pub fn parse_payload(payload: &str, workspace_id: &WorkspaceId) -> Option<RawChange> {
    match serde_json::from_str::<RawChange>(payload) {
        Ok(change) if change.workspace_id.as_ref() == Some(workspace_id) => Some(change),
        Ok(_) => None,
        Err(e) => {
            warn!("Skipping unparseable change payload: {}", e);
            None
        }
    }
}

pub struct PgRemote {
    pool: PgPool,
}

impl PgRemote {
    pub async fn open(url: &str) -> Result<Self, RemoteError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(remote_err)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RemoteStore for PgRemote {
    async fn pull_all(
        &self,
        kind: EntityKind,
        scope: &PullScope,
    ) -> Result<Vec<Entity>, RemoteError> {
        let table = kind.as_str();
        let recipient = scope.recipient_id.map(|u| u.0);
        let rows: Vec<(Value,)> = match kind {
            EntityKind::Settings => {
                let sql = format!(
                    "SELECT row_to_json(t.*) FROM {table} t WHERE ($1::uuid IS NULL OR t.user_id = $1)"
                );
                sqlx::query_as::<_, (Value,)>(&sql)
                    .bind(recipient)
                    .fetch_all(&self.pool)
                    .await
            }
            EntityKind::Notification => {
                let sql = format!(
                    "SELECT row_to_json(t.*) FROM {table} t
                     WHERE t.workspace_id = $1 AND ($2::uuid IS NULL OR t.recipient_id = $2)
                     ORDER BY t.created_at DESC"
                );
                sqlx::query_as::<_, (Value,)>(&sql)
                    .bind(scope.workspace_id.0)
                    .bind(recipient)
                    .fetch_all(&self.pool)
                    .await
            }
            _ => {
                let sql = format!("SELECT row_to_json(t.*) FROM {table} t WHERE t.workspace_id = $1");
                sqlx::query_as::<_, (Value,)>(&sql)
                    .bind(scope.workspace_id.0)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(remote_err)?;

        debug!(kind = %kind, rows = rows.len(), "pulled from postgres");
        rows.into_iter().map(|(row,)| decode(kind, row)).collect()
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<Option<Entity>, RemoteError> {
        let sql = format!(
            "SELECT row_to_json(t.*) FROM {} t WHERE {}",
            kind.as_str(),
            key_clause(kind, "t", 1)
        );
        let mut query = sqlx::query_as::<_, (Value,)>(&sql);
        for value in key_values(key) {
            query = query.bind(value);
        }
        let row = query.fetch_optional(&self.pool).await.map_err(remote_err)?;
        row.map(|(row,)| decode(kind, row)).transpose()
    }

    async fn create(&self, entity: Entity) -> Result<Entity, RemoteError> {
        let kind = entity.kind();
        let doc = entity
            .to_json()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let (row,): (Value,) = sqlx::query_as(&insert_sql(kind))
            .bind(doc)
            .fetch_one(&self.pool)
            .await
            .map_err(remote_err)?;
        decode(kind, row)
    }

    async fn update(&self, entity: Entity) -> Result<Entity, RemoteError> {
        let kind = entity.kind();
        let doc = entity
            .to_json()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let row: Option<(Value,)> = sqlx::query_as(&update_sql(kind))
            .bind(doc)
            .fetch_optional(&self.pool)
            .await
            .map_err(remote_err)?;
        match row {
            Some((row,)) => decode(kind, row),
            None => Err(RemoteError::NotFound),
        }
    }

    async fn delete(&self, kind: EntityKind, key: &EntityKey) -> Result<(), RemoteError> {
        let sql = format!(
            "DELETE FROM {} t WHERE {}",
            kind.as_str(),
            key_clause(kind, "t", 1)
        );
        let mut query = sqlx::query(&sql);
        for value in key_values(key) {
            query = query.bind(value);
        }
        let result = query.execute(&self.pool).await.map_err(remote_err)?;
        if result.rows_affected() == 0 {
            return Err(RemoteError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for PgRemote {
    async fn publish(&self, change: RawChange) -> Result<(), FeedError> {
        let kind: EntityKind = change
            .table
            .parse()
            .map_err(|e: hive_storage::ParseValueError| FeedError::Decode(e.to_string()))?;
        let payload =
            serde_json::to_string(&change).map_err(|e| FeedError::Decode(e.to_string()))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel_name(kind))
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| FeedError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        kind: EntityKind,
        workspace_id: &WorkspaceId,
    ) -> Result<ChangeStream, FeedError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| FeedError::Backend(e.to_string()))?;
        listener
            .listen(&channel_name(kind))
            .await
            .map_err(|e| FeedError::Backend(e.to_string()))?;

        let workspace_id = *workspace_id;
        // A connection error ends the stream; the subscriber reconnects and resyncs.
        let stream = listener
            .into_stream()
            .take_while(|item| {
                if let Err(e) = item {
                    warn!("Change feed connection lost: {}", e);
                }
                futures::future::ready(item.is_ok())
            })
            .filter_map(move |item| {
                let change = item
                    .ok()
                    .and_then(|n| parse_payload(n.payload(), &workspace_id));
                futures::future::ready(change)
            });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hive_storage::{Priority, Task, TaskId, TaskStatus, UserId};

    #[test]
    fn test_channel_names() {
        assert_eq!(channel_name(EntityKind::Task), "hive_tasks");
        assert_eq!(
            channel_name(EntityKind::Settings),
            "hive_notification_settings"
        );
    }

    #[test]
    fn test_key_clause_for_roster() {
        assert_eq!(
            key_clause(EntityKind::Employee, "t", 1),
            "t.user_id = $1 AND t.workspace_id = $2"
        );
        assert_eq!(key_clause(EntityKind::Task, "t", 1), "t.id = $1");
    }

    #[test]
    fn test_update_sql_does_not_rewrite_keys() {
        let sql = update_sql(EntityKind::Employee);
        assert!(sql.contains("name = r.name"));
        assert!(!sql.contains("user_id = r.user_id,"));
        assert!(sql.contains("t.user_id = r.user_id AND t.workspace_id = r.workspace_id"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            remote_err(sqlx::Error::RowNotFound),
            RemoteError::NotFound
        ));
        assert!(matches!(
            remote_err(sqlx::Error::PoolTimedOut),
            RemoteError::Unavailable(_)
        ));
    }

    #[test]
    fn test_parse_payload_filters_workspace() {
        let ws = WorkspaceId::new();
        let task = Task {
            id: TaskId::new(),
            workspace_id: ws,
            title: "Launch".into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::High,
            assignee_id: None,
            creator_id: UserId::new(),
            due_at: None,
            created_at: Utc::now(),
        };
        let payload = serde_json::to_string(&RawChange::inserted(&task.into()).unwrap()).unwrap();

        assert!(parse_payload(&payload, &ws).is_some());
        assert!(parse_payload(&payload, &WorkspaceId::new()).is_none());
        assert!(parse_payload("{not json", &ws).is_none());
    }

    #[test]
    fn test_parse_trigger_shaped_payload() {
        let ws = WorkspaceId::new();
        let id = Uuid::new_v4();
        // Shape produced by hive_notify_change() for a delete.
        let payload = serde_json::json!({
            "table": "remarks",
            "type": "DELETE",
            "workspace_id": ws,
            "record": null,
            "old_record": {
                "id": id,
                "task_id": Uuid::new_v4(),
                "workspace_id": ws,
                "message": "bye",
                "author_id": Uuid::new_v4(),
                "created_at": "2024-05-01T10:00:00.123456+00:00"
            }
        })
        .to_string();

        let change = parse_payload(&payload, &ws).unwrap();
        assert_eq!(
            change.decode(EntityKind::Remark).unwrap(),
            hive_events::ChangeEvent::Deleted(EntityKey::Id(id))
        );
    }
}
