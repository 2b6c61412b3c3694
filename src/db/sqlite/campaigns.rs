use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction, sqlite::SqliteRow};
use uuid::Uuid;

use super::{
    audit_logs::insert_audit_log,
    common::{parse_opt_uuid, parse_uuid},
};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{
            CampaignLifecycleTx, CampaignRepo, CascadeStep, TrashPage, clamp_page,
            savepoint_statement, truncate_to_millis,
        },
    },
    models::{
        AuditLog, Campaign, CampaignChildCounts, CampaignStatus, CreateAuditLog,
        CreateCalendarEvent, CreateCampaign, CreateCampaignEvent, CreateCampaignResult,
        TargetGroup,
    },
};

const CAMPAIGN_COLUMNS: &str = "id, user_id, name, campaign_type, status, created_at, \
     deleted_at, deleted_by, restored_at, restored_by, status_before_delete, \
     delete_reason, version";

/// Case-folded name used for the active-name uniqueness check.
fn name_key(name: &str) -> String {
    name.to_lowercase()
}

fn parse_status(s: &str) -> DbResult<CampaignStatus> {
    s.parse().map_err(DbError::Internal)
}

fn campaign_from_row(row: &SqliteRow) -> DbResult<Campaign> {
    let status_before: Option<String> = row.get("status_before_delete");
    Ok(Campaign {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        name: row.get("name"),
        campaign_type: row.get("campaign_type"),
        status: parse_status(&row.get::<String, _>("status"))?,
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
        deleted_by: parse_opt_uuid(row.get("deleted_by"))?,
        restored_at: row.get("restored_at"),
        restored_by: parse_opt_uuid(row.get("restored_by"))?,
        status_before_delete: status_before.as_deref().map(parse_status).transpose()?,
        delete_reason: row.get("delete_reason"),
        version: row.get("version"),
    })
}

pub struct SqliteCampaignRepo {
    pool: SqlitePool,
}

impl SqliteCampaignRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepo for SqliteCampaignRepo {
    fn supports_row_locks(&self) -> bool {
        false
    }

    async fn begin_lifecycle(&self) -> DbResult<Box<dyn CampaignLifecycleTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteLifecycleTx { tx }))
    }

    async fn create(&self, input: CreateCampaign) -> DbResult<Campaign> {
        let id = Uuid::new_v4();
        let now = truncate_to_millis(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO campaigns (id, user_id, name, name_key, campaign_type, status, created_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(id.to_string())
        .bind(input.user_id.to_string())
        .bind(&input.name)
        .bind(name_key(&input.name))
        .bind(&input.campaign_type)
        .bind(input.status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_write(e, || {
                format!("Campaign named '{}' already exists", input.name)
            })
        })?;

        Ok(Campaign {
            id,
            user_id: input.user_id,
            name: input.name,
            campaign_type: input.campaign_type,
            status: input.status,
            created_at: now,
            deleted_at: None,
            deleted_by: None,
            restored_at: None,
            restored_by: None,
            status_before_delete: None,
            delete_reason: None,
            version: 0,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Campaign>> {
        let row = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(campaign_from_row).transpose()
    }

    async fn list_active(&self, user_id: Uuid, offset: i64, limit: i64) -> DbResult<Vec<Campaign>> {
        let (offset, limit) = clamp_page(offset, limit);
        let rows = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
             WHERE user_id = ? AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC \
             LIMIT ? OFFSET ?"
        ))
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(campaign_from_row).collect()
    }

    async fn list_trashed(&self, user_id: Uuid, offset: i64, limit: i64) -> DbResult<TrashPage> {
        let (offset, limit) = clamp_page(offset, limit);
        let rows = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
             WHERE user_id = ? AND deleted_at IS NOT NULL \
             ORDER BY deleted_at DESC, id DESC \
             LIMIT ? OFFSET ?"
        ))
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM campaigns WHERE user_id = ? AND deleted_at IS NOT NULL",
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(TrashPage {
            items: rows.iter().map(campaign_from_row).collect::<DbResult<_>>()?,
            total,
        })
    }

    async fn list_purge_candidates(&self, cutoff: DateTime<Utc>, limit: i64) -> DbResult<Vec<Uuid>> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM campaigns
            WHERE deleted_at IS NOT NULL AND deleted_at < ?
            ORDER BY deleted_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(truncate_to_millis(cutoff))
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|s| parse_uuid(s)).collect()
    }

    async fn create_group(&self, user_id: Uuid, name: &str) -> DbResult<TargetGroup> {
        let id = Uuid::new_v4();
        let now = truncate_to_millis(Utc::now());

        sqlx::query("INSERT INTO target_groups (id, user_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(TargetGroup {
            id,
            user_id,
            name: name.to_string(),
            created_at: now,
        })
    }

    async fn attach_group(&self, campaign_id: Uuid, group_id: Uuid) -> DbResult<()> {
        sqlx::query("INSERT INTO campaign_groups (campaign_id, group_id) VALUES (?, ?)")
            .bind(campaign_id.to_string())
            .bind(group_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from_write(e, || "Group already attached".to_string()))?;
        Ok(())
    }

    async fn add_result(&self, input: CreateCampaignResult) -> DbResult<Uuid> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO results (id, campaign_id, user_id, r_id, email, status, modified_at)
            SELECT ?, id, user_id, ?, ?, ?, ? FROM campaigns WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .bind(id.simple().to_string())
        .bind(&input.email)
        .bind(&input.status)
        .bind(truncate_to_millis(Utc::now()))
        .bind(input.campaign_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(id)
    }

    async fn add_event(&self, input: CreateCampaignEvent) -> DbResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO events (id, campaign_id, email, message, details, time) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(input.campaign_id.to_string())
        .bind(&input.email)
        .bind(&input.message)
        .bind(&input.details)
        .bind(truncate_to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn add_calendar_event(&self, input: CreateCalendarEvent) -> DbResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO calendar_events (id, result_id, event_type, timestamp, ip, user_agent, details)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.result_id.to_string())
        .bind(&input.event_type)
        .bind(truncate_to_millis(Utc::now()))
        .bind(&input.ip)
        .bind(&input.user_agent)
        .bind(&input.details)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn count_children(&self, campaign_id: Uuid) -> DbResult<CampaignChildCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM results WHERE campaign_id = ?1) AS results,
                (SELECT COUNT(*) FROM events WHERE campaign_id = ?1) AS events,
                (SELECT COUNT(*) FROM calendar_events
                    WHERE result_id IN (SELECT id FROM results WHERE campaign_id = ?1)) AS calendar_events,
                (SELECT COUNT(*) FROM campaign_groups WHERE campaign_id = ?1) AS group_links
            "#,
        )
        .bind(campaign_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(CampaignChildCounts {
            results: row.get("results"),
            events: row.get("events"),
            calendar_events: row.get("calendar_events"),
            groups: row.get("group_links"),
        })
    }
}

/// Lifecycle transaction on SQLite.
///
/// SQLite has no row locks; the first statement of `lock_campaign` is a
/// write so the transaction takes the database writer lock before it reads.
/// Dropping the transaction without committing rolls it back.
pub struct SqliteLifecycleTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl CampaignLifecycleTx for SqliteLifecycleTx {
    async fn lock_campaign(&mut self, id: Uuid) -> DbResult<Option<Campaign>> {
        sqlx::query("UPDATE campaigns SET version = version WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(campaign_from_row).transpose()
    }

    async fn active_name_taken(
        &mut self,
        user_id: Uuid,
        name: &str,
        exclude_id: Uuid,
    ) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM campaigns
            WHERE user_id = ? AND name_key = ? AND id != ? AND deleted_at IS NULL
            "#,
        )
        .bind(user_id.to_string())
        .bind(name_key(name))
        .bind(exclude_id.to_string())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count > 0)
    }

    async fn save_lifecycle(&mut self, campaign: &Campaign, expected_version: i64) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                name = ?,
                name_key = ?,
                status = ?,
                deleted_at = ?,
                deleted_by = ?,
                restored_at = ?,
                restored_by = ?,
                status_before_delete = ?,
                delete_reason = ?,
                version = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&campaign.name)
        .bind(name_key(&campaign.name))
        .bind(campaign.status.as_str())
        .bind(campaign.deleted_at.map(truncate_to_millis))
        .bind(campaign.deleted_by.map(|id| id.to_string()))
        .bind(campaign.restored_at.map(truncate_to_millis))
        .bind(campaign.restored_by.map(|id| id.to_string()))
        .bind(campaign.status_before_delete.map(|s| s.as_str()))
        .bind(&campaign.delete_reason)
        .bind(campaign.version)
        .bind(campaign.id.to_string())
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            DbError::from_write(e, || {
                format!("Campaign named '{}' already exists", campaign.name)
            })
        })?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "Campaign {} changed since version {}",
                campaign.id, expected_version
            )));
        }
        Ok(())
    }

    async fn insert_audit(&mut self, input: &CreateAuditLog) -> DbResult<AuditLog> {
        insert_audit_log(&mut *self.tx, input).await
    }

    async fn delete_step(&mut self, step: CascadeStep, campaign_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query(&step.delete_sql("?"))
            .bind(campaign_id.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        sqlx::query(&savepoint_statement("SAVEPOINT", name)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        sqlx::query(&savepoint_statement("RELEASE SAVEPOINT", name)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        sqlx::query(&savepoint_statement("ROLLBACK TO SAVEPOINT", name)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
