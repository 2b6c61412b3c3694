use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_opt_uuid, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{AuditLogRepo, truncate_to_millis},
    },
    models::{AuditLog, CreateAuditLog},
};

const AUDIT_COLUMNS: &str = "id, timestamp, actor_type, actor_id, actor_name, action, \
     entity_type, entity_id, metadata, ip_address, user_agent";

pub struct SqliteAuditLogRepo {
    pool: SqlitePool,
}

impl SqliteAuditLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Insert an audit entry through any SQLite executor (pool or open transaction).
pub(super) async fn insert_audit_log<'e, E>(executor: E, input: &CreateAuditLog) -> DbResult<AuditLog>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4();
    let now = truncate_to_millis(chrono::Utc::now());
    let metadata_json = serde_json::to_string(&input.metadata)?;

    sqlx::query(
        r#"
        INSERT INTO audit_log (
            id, timestamp, actor_type, actor_id, actor_name, action,
            entity_type, entity_id, metadata, ip_address, user_agent
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(now)
    .bind(input.actor_type.to_string())
    .bind(input.actor_id.map(|id| id.to_string()))
    .bind(&input.actor_name)
    .bind(input.action.as_str())
    .bind(&input.entity_type)
    .bind(input.entity_id.to_string())
    .bind(&metadata_json)
    .bind(&input.ip_address)
    .bind(&input.user_agent)
    .execute(executor)
    .await?;

    Ok(AuditLog {
        id,
        timestamp: now,
        actor_type: input.actor_type,
        actor_id: input.actor_id,
        actor_name: input.actor_name.clone(),
        action: input.action,
        entity_type: input.entity_type.clone(),
        entity_id: input.entity_id,
        metadata: input.metadata.clone(),
        ip_address: input.ip_address.clone(),
        user_agent: input.user_agent.clone(),
    })
}

fn audit_log_from_row(row: &SqliteRow) -> DbResult<AuditLog> {
    let metadata: String = row.get("metadata");
    Ok(AuditLog {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        timestamp: row.get("timestamp"),
        actor_type: row
            .get::<String, _>("actor_type")
            .parse()
            .map_err(DbError::Internal)?,
        actor_id: parse_opt_uuid(row.get("actor_id"))?,
        actor_name: row.get("actor_name"),
        action: row
            .get::<String, _>("action")
            .parse()
            .map_err(DbError::Internal)?,
        entity_type: row.get("entity_type"),
        entity_id: parse_uuid(&row.get::<String, _>("entity_id"))?,
        metadata: serde_json::from_str(&metadata)?,
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
    })
}

#[async_trait]
impl AuditLogRepo for SqliteAuditLogRepo {
    async fn create(&self, input: CreateAuditLog) -> DbResult<AuditLog> {
        insert_audit_log(&self.pool, &input).await
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<AuditLog>> {
        let row = sqlx::query(&format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(audit_log_from_row).transpose()
    }

    async fn list_for_entity(&self, entity_type: &str, entity_id: Uuid) -> DbResult<Vec<AuditLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE entity_type = ? AND entity_id = ? \
             ORDER BY timestamp DESC, id DESC"
        ))
        .bind(entity_type)
        .bind(entity_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(audit_log_from_row).collect()
    }

    async fn list_by_actor(&self, actor_id: Uuid, limit: i64) -> DbResult<Vec<AuditLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE actor_id = ? \
             ORDER BY timestamp DESC, id DESC \
             LIMIT ?"
        ))
        .bind(actor_id.to_string())
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(audit_log_from_row).collect()
    }

    async fn count_for_entity(&self, entity_type: &str, entity_id: Uuid) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity_type)
        .bind(entity_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
