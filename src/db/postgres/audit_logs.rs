use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{AuditLogRepo, truncate_to_millis},
    },
    models::{AuditLog, CreateAuditLog},
};

const AUDIT_COLUMNS: &str = "id, timestamp, actor_type, actor_id, actor_name, action, \
     entity_type, entity_id, metadata, ip_address, user_agent";

pub struct PostgresAuditLogRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresAuditLogRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }
}

/// Insert an audit entry through any Postgres executor (pool or open transaction).
pub(super) async fn insert_audit_log<'e, E>(executor: E, input: &CreateAuditLog) -> DbResult<AuditLog>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let id = Uuid::new_v4();
    let now = truncate_to_millis(chrono::Utc::now());

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO audit_log (
            id, timestamp, actor_type, actor_id, actor_name, action,
            entity_type, entity_id, metadata, ip_address, user_agent
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {AUDIT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(now)
    .bind(input.actor_type.to_string())
    .bind(input.actor_id)
    .bind(&input.actor_name)
    .bind(input.action.as_str())
    .bind(&input.entity_type)
    .bind(input.entity_id)
    .bind(&input.metadata)
    .bind(&input.ip_address)
    .bind(&input.user_agent)
    .fetch_one(executor)
    .await?;

    audit_log_from_row(&row)
}

fn audit_log_from_row(row: &PgRow) -> DbResult<AuditLog> {
    Ok(AuditLog {
        id: row.get("id"),
        timestamp: row.get("timestamp"),
        actor_type: row
            .get::<String, _>("actor_type")
            .parse()
            .map_err(DbError::Internal)?,
        actor_id: row.get("actor_id"),
        actor_name: row.get("actor_name"),
        action: row
            .get::<String, _>("action")
            .parse()
            .map_err(DbError::Internal)?,
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        metadata: row.get("metadata"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
    })
}

#[async_trait]
impl AuditLogRepo for PostgresAuditLogRepo {
    async fn create(&self, input: CreateAuditLog) -> DbResult<AuditLog> {
        insert_audit_log(&self.write_pool, &input).await
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<AuditLog>> {
        let row = sqlx::query(&format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await?;

        row.as_ref().map(audit_log_from_row).transpose()
    }

    async fn list_for_entity(&self, entity_type: &str, entity_id: Uuid) -> DbResult<Vec<AuditLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY timestamp DESC, id DESC"
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.read_pool)
        .await?;

        rows.iter().map(audit_log_from_row).collect()
    }

    async fn list_by_actor(&self, actor_id: Uuid, limit: i64) -> DbResult<Vec<AuditLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE actor_id = $1 \
             ORDER BY timestamp DESC, id DESC \
             LIMIT $2"
        ))
        .bind(actor_id)
        .bind(limit.max(1))
        .fetch_all(&self.read_pool)
        .await?;

        rows.iter().map(audit_log_from_row).collect()
    }

    async fn count_for_entity(&self, entity_type: &str, entity_id: Uuid) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(&self.read_pool)
        .await?;

        Ok(count)
    }
}
