//! End-to-end tests for campaign trash lifecycle operations
//!
//! These run the lifecycle service and the retention job against a real
//! database, so transaction, lock, and savepoint behavior is exercised on
//! each backend.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::TrashRetentionConfig,
    db::{DbPool, DbPoolRef},
    models::{
        Actor, AuditAction, AuditActorType, CAMPAIGN_ENTITY_TYPE, Campaign, CampaignStatus,
        CreateCalendarEvent, CreateCampaign, CreateCampaignEvent, CreateCampaignResult,
        TRASH_TTL_ACTOR_NAME,
    },
    retention::TrashRetentionJob,
    retention::RetentionError,
    services::{
        CampaignLifecycleService, LifecycleError, SoftDeleteOutcome, SystemPurgeOutcome,
        rename_candidates,
    },
};

/// Test context holding the pool and the service under test
pub struct LifecycleTestContext {
    pub db: Arc<DbPool>,
    pub service: CampaignLifecycleService,
}

impl LifecycleTestContext {
    pub fn new(db: DbPool) -> Self {
        let db = Arc::new(db);
        Self {
            service: CampaignLifecycleService::new(Arc::clone(&db)),
            db,
        }
    }

    async fn create(&self, user_id: Uuid, name: &str, status: CampaignStatus) -> Campaign {
        self.db
            .campaigns()
            .create(CreateCampaign {
                user_id,
                name: name.to_string(),
                campaign_type: "email".to_string(),
                status,
            })
            .await
            .expect("Failed to create campaign")
    }

    /// Create a campaign with one row in every child table.
    async fn create_with_children(&self, user_id: Uuid, name: &str) -> Campaign {
        let repo = self.db.campaigns();
        let campaign = self.create(user_id, name, CampaignStatus::InProgress).await;

        let group = repo
            .create_group(user_id, &format!("{name} targets"))
            .await
            .expect("Failed to create group");
        repo.attach_group(campaign.id, group.id)
            .await
            .expect("Failed to attach group");
        let result_id = repo
            .add_result(CreateCampaignResult {
                campaign_id: campaign.id,
                email: "alice@example.com".to_string(),
                status: "Email Sent".to_string(),
            })
            .await
            .expect("Failed to add result");
        repo.add_event(CreateCampaignEvent {
            campaign_id: campaign.id,
            email: "alice@example.com".to_string(),
            message: "Clicked Link".to_string(),
            details: Some(r#"{"browser":"firefox"}"#.to_string()),
        })
        .await
        .expect("Failed to add event");
        repo.add_calendar_event(CreateCalendarEvent {
            result_id,
            event_type: "link_opened".to_string(),
            ip: Some("198.51.100.4".to_string()),
            user_agent: Some("Outlook".to_string()),
            details: None,
        })
        .await
        .expect("Failed to add calendar event");

        campaign
    }

    /// Trash a campaign as if it had been deleted at `deleted_at`.
    async fn trash_at(&self, id: Uuid, deleted_at: DateTime<Utc>) {
        let mut tx = self
            .db
            .campaigns()
            .begin_lifecycle()
            .await
            .expect("Failed to begin");
        let mut campaign = tx
            .lock_campaign(id)
            .await
            .expect("Failed to lock")
            .expect("Campaign should exist");
        let expected = campaign.version;
        campaign.mark_deleted(campaign.user_id, "backdated", deleted_at);
        tx.save_lifecycle(&campaign, expected)
            .await
            .expect("Failed to save");
        tx.commit().await.expect("Failed to commit");
    }

    async fn get(&self, id: Uuid) -> Option<Campaign> {
        self.db
            .campaigns()
            .get_by_id(id)
            .await
            .expect("Failed to get campaign")
    }

    async fn audit_count(&self, id: Uuid) -> i64 {
        self.db
            .audit_logs()
            .count_for_entity(CAMPAIGN_ENTITY_TYPE, id)
            .await
            .expect("Failed to count audit entries")
    }

    fn retention_job(&self, batch_size: i64, dry_run: bool) -> TrashRetentionJob {
        TrashRetentionJob::new(
            self.service.clone(),
            &TrashRetentionConfig {
                enabled: true,
                retention_days: 90,
                batch_size,
                dry_run,
                ..Default::default()
            },
        )
    }

    /// Run backend-specific DDL against the test database.
    #[allow(unused_variables)]
    async fn exec_ddl(&self, sqlite_sql: &str, postgres_sql: &str) {
        match self.db.pool() {
            #[cfg(feature = "database-sqlite")]
            DbPoolRef::Sqlite(pool) => {
                sqlx::raw_sql(sqlite_sql)
                    .execute(pool)
                    .await
                    .expect("Failed to run SQLite DDL");
            }
            #[cfg(feature = "database-postgres")]
            DbPoolRef::Postgres(pair) => {
                sqlx::raw_sql(postgres_sql)
                    .execute(pair.write_pool())
                    .await
                    .expect("Failed to run PostgreSQL DDL");
            }
        }
    }

    /// Make every delete from `results` fail.
    async fn block_result_deletes(&self) {
        self.exec_ddl(
            "CREATE TRIGGER block_result_delete BEFORE DELETE ON results \
             BEGIN SELECT RAISE(ABORT, 'results are read-only'); END;",
            "CREATE FUNCTION block_write() RETURNS trigger AS $$ \
             BEGIN RAISE EXCEPTION 'results are read-only'; END; $$ LANGUAGE plpgsql; \
             CREATE TRIGGER block_result_delete BEFORE DELETE ON results \
             FOR EACH ROW EXECUTE FUNCTION block_write();",
        )
        .await;
    }

    /// Make every audit ledger insert fail.
    async fn block_audit_inserts(&self) {
        self.exec_ddl(
            "CREATE TRIGGER block_audit_insert BEFORE INSERT ON audit_log \
             BEGIN SELECT RAISE(ABORT, 'audit ledger unavailable'); END;",
            "CREATE FUNCTION block_audit() RETURNS trigger AS $$ \
             BEGIN RAISE EXCEPTION 'audit ledger unavailable'; END; $$ LANGUAGE plpgsql; \
             CREATE TRIGGER block_audit_insert BEFORE INSERT ON audit_log \
             FOR EACH ROW EXECUTE FUNCTION block_audit();",
        )
        .await;
    }
}

// ============================================================================
// Soft Delete Tests
// ============================================================================

pub async fn test_soft_delete_is_idempotent(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let campaign = ctx.create(owner, "Q4 Drive", CampaignStatus::Created).await;
    let actor = Actor::user(owner);

    let first = ctx
        .service
        .soft_delete(campaign.id, &actor, "duplicate")
        .await
        .expect("First soft delete failed");
    let deleted = match first {
        SoftDeleteOutcome::Deleted(c) => c,
        SoftDeleteOutcome::AlreadyDeleted => panic!("Expected Deleted"),
    };
    assert_eq!(deleted.version, campaign.version + 1);

    let second = ctx
        .service
        .soft_delete(campaign.id, &actor, "again")
        .await
        .expect("Second soft delete failed");
    assert!(matches!(second, SoftDeleteOutcome::AlreadyDeleted));

    let stored = ctx.get(campaign.id).await.expect("Campaign should exist");
    assert_eq!(stored, deleted);
    assert_eq!(stored.delete_reason.as_deref(), Some("duplicate"));
    assert_eq!(ctx.audit_count(campaign.id).await, 1);
}

pub async fn test_soft_delete_stops_running_campaign(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let campaign = ctx
        .create(owner, "Live phish", CampaignStatus::InProgress)
        .await;

    ctx.service
        .soft_delete(campaign.id, &Actor::user(owner), "")
        .await
        .expect("Soft delete failed");

    let stored = ctx.get(campaign.id).await.expect("Campaign should exist");
    assert_eq!(stored.status, CampaignStatus::Complete);
    assert_eq!(stored.status_before_delete, Some(CampaignStatus::InProgress));
    assert_eq!(stored.deleted_by, Some(owner));

    let logs = ctx
        .db
        .audit_logs()
        .list_for_entity(CAMPAIGN_ENTITY_TYPE, campaign.id)
        .await
        .expect("Failed to list audit entries");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, AuditAction::CampaignSoftDeleted);
    assert_eq!(logs[0].actor_id, Some(owner));
    assert_eq!(logs[0].metadata["status_before"], "in_progress");
    assert_eq!(logs[0].metadata["name"], "Live phish");
}

pub async fn test_concurrent_soft_deletes_record_once(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let campaign = ctx.create(owner, "Raced", CampaignStatus::Created).await;
    let actor = Actor::user(owner);

    let (a, b) = tokio::join!(
        ctx.service.soft_delete(campaign.id, &actor, "a"),
        ctx.service.soft_delete(campaign.id, &actor, "b"),
    );
    let outcomes = [a.expect("soft delete a"), b.expect("soft delete b")];
    let deleted = outcomes
        .iter()
        .filter(|o| matches!(o, SoftDeleteOutcome::Deleted(_)))
        .count();

    assert_eq!(deleted, 1);
    assert_eq!(ctx.audit_count(campaign.id).await, 1);
    let stored = ctx.get(campaign.id).await.expect("Campaign should exist");
    assert_eq!(stored.version, campaign.version + 1);
}

pub async fn test_non_owner_cannot_change_campaign(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let intruder = Actor::user(Uuid::new_v4());
    let campaign = ctx.create(owner, "Mine", CampaignStatus::Queued).await;

    let result = ctx.service.soft_delete(campaign.id, &intruder, "").await;
    assert!(matches!(result, Err(LifecycleError::PermissionDenied)));
    assert_eq!(ctx.get(campaign.id).await, Some(campaign.clone()));

    ctx.service
        .soft_delete(campaign.id, &Actor::user(owner), "")
        .await
        .expect("Owner soft delete failed");
    let trashed = ctx.get(campaign.id).await.expect("Campaign should exist");

    let result = ctx.service.restore(campaign.id, &intruder).await;
    assert!(matches!(result, Err(LifecycleError::PermissionDenied)));
    let result = ctx.service.purge(campaign.id, &intruder, true).await;
    assert!(matches!(result, Err(LifecycleError::PermissionDenied)));

    assert_eq!(ctx.get(campaign.id).await, Some(trashed));
    assert_eq!(ctx.audit_count(campaign.id).await, 1);
}

pub async fn test_missing_campaign_is_not_found(ctx: &LifecycleTestContext) {
    let actor = Actor::user(Uuid::new_v4());
    let id = Uuid::new_v4();

    assert!(matches!(
        ctx.service.soft_delete(id, &actor, "").await,
        Err(LifecycleError::NotFound)
    ));
    assert!(matches!(
        ctx.service.restore(id, &actor).await,
        Err(LifecycleError::NotFound)
    ));
    assert!(matches!(
        ctx.service.purge(id, &actor, true).await,
        Err(LifecycleError::NotFound)
    ));
}

// ============================================================================
// Restore Tests
// ============================================================================

pub async fn test_restore_round_trip(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let campaign = ctx
        .create(owner, "Round trip", CampaignStatus::InProgress)
        .await;

    ctx.service
        .soft_delete(campaign.id, &actor, "pause")
        .await
        .expect("Soft delete failed");
    let outcome = ctx
        .service
        .restore(campaign.id, &actor)
        .await
        .expect("Restore failed");

    assert!(!outcome.name_changed);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.old_name, "Round trip");
    assert_eq!(outcome.new_name, "Round trip");

    let stored = ctx.get(campaign.id).await.expect("Campaign should exist");
    assert_eq!(stored, outcome.campaign);
    assert_eq!(stored.version, campaign.version + 2);
    assert_eq!(stored.status, CampaignStatus::Created);
    assert_eq!(stored.deleted_at, None);
    assert_eq!(stored.deleted_by, None);
    assert_eq!(stored.restored_by, Some(owner));
    assert!(stored.restored_at.is_some());
    assert_eq!(ctx.audit_count(campaign.id).await, 2);
}

pub async fn test_restore_renames_on_conflict(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let original = ctx.create(owner, "Q4 Drive", CampaignStatus::Created).await;

    ctx.service
        .soft_delete(original.id, &actor, "")
        .await
        .expect("Soft delete failed");
    let replacement = ctx.create(owner, "q4 drive", CampaignStatus::Created).await;

    let outcome = ctx
        .service
        .restore(original.id, &actor)
        .await
        .expect("Restore failed");

    assert!(outcome.name_changed);
    assert_eq!(outcome.old_name, "Q4 Drive");
    assert!(outcome.new_name.starts_with("Q4 Drive (Restored "));
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.campaign.name, outcome.new_name);

    let stored = ctx.get(original.id).await.expect("Campaign should exist");
    assert_eq!(stored.name, outcome.new_name);
    assert!(!stored.is_deleted());
    assert_eq!(ctx.get(replacement.id).await, Some(replacement));

    let logs = ctx
        .db
        .audit_logs()
        .list_for_entity(CAMPAIGN_ENTITY_TYPE, original.id)
        .await
        .expect("Failed to list audit entries");
    assert_eq!(logs[0].action, AuditAction::CampaignRestored);
    assert_eq!(logs[0].metadata["name_changed"], true);
    assert_eq!(logs[0].metadata["original_name"], "Q4 Drive");
}

pub async fn test_restore_tries_numbered_names(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let original = ctx.create(owner, "Phish Week", CampaignStatus::Created).await;
    ctx.service
        .soft_delete(original.id, &actor, "")
        .await
        .expect("Soft delete failed");

    // Occupy the original name and the timestamped name, including the next
    // minute's in case the clock rolls over before the restore runs.
    ctx.create(owner, "Phish Week", CampaignStatus::Created).await;
    let now = Utc::now();
    for at in [now, now + Duration::minutes(1)] {
        let timestamped = rename_candidates("Phish Week", at)
            .into_iter()
            .next()
            .expect("At least one candidate");
        ctx.create(owner, &timestamped, CampaignStatus::Created).await;
    }

    let outcome = ctx
        .service
        .restore(original.id, &actor)
        .await
        .expect("Restore failed");

    assert!(outcome.name_changed);
    assert!(outcome.new_name.starts_with("Phish Week (Restored "));
    assert!(outcome.new_name.ends_with("-1)"), "got {}", outcome.new_name);
    let stored = ctx.get(original.id).await.expect("Campaign should exist");
    assert_eq!(stored.name, outcome.new_name);
}

pub async fn test_restore_active_campaign_fails(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let campaign = ctx.create(owner, "Active", CampaignStatus::Created).await;

    let result = ctx.service.restore(campaign.id, &Actor::user(owner)).await;
    assert!(matches!(result, Err(LifecycleError::NotDeleted)));
    assert_eq!(ctx.get(campaign.id).await, Some(campaign));
}

// ============================================================================
// Purge Tests
// ============================================================================

pub async fn test_purge_removes_campaign_and_children(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let campaign = ctx.create_with_children(owner, "Purge me").await;

    ctx.service
        .soft_delete(campaign.id, &actor, "")
        .await
        .expect("Soft delete failed");
    let report = ctx
        .service
        .purge(campaign.id, &actor, true)
        .await
        .expect("Purge failed");

    assert_eq!(report.campaigns, 1);
    assert_eq!(report.calendar_events, 1);
    assert_eq!(report.results, 1);
    assert_eq!(report.events, 1);
    assert_eq!(report.campaign_groups, 1);
    assert!(report.skipped_steps.is_empty());

    assert!(ctx.get(campaign.id).await.is_none());
    let counts = ctx
        .db
        .campaigns()
        .count_children(campaign.id)
        .await
        .expect("Failed to count");
    assert_eq!(counts.total(), 0);

    let logs = ctx
        .db
        .audit_logs()
        .list_for_entity(CAMPAIGN_ENTITY_TYPE, campaign.id)
        .await
        .expect("Failed to list audit entries");
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action, AuditAction::CampaignPurged);
    assert_eq!(logs[0].metadata["name"], "Purge me");
    assert_eq!(logs[0].metadata["user_id"], owner.to_string());
    assert!(logs[0].metadata.get("purge_type").is_none());
}

pub async fn test_purge_requires_admin(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let campaign = ctx.create(owner, "Not yours to purge", CampaignStatus::Created).await;
    ctx.service
        .soft_delete(campaign.id, &actor, "")
        .await
        .expect("Soft delete failed");

    let result = ctx.service.purge(campaign.id, &actor, false).await;
    assert!(matches!(result, Err(LifecycleError::PermissionDenied)));
    assert!(ctx.get(campaign.id).await.is_some());
}

pub async fn test_purge_active_campaign_fails(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let campaign = ctx.create(owner, "Still active", CampaignStatus::Created).await;

    let result = ctx.service.purge(campaign.id, &Actor::user(owner), true).await;
    assert!(matches!(result, Err(LifecycleError::NotDeleted)));
    assert_eq!(ctx.get(campaign.id).await, Some(campaign));
}

pub async fn test_failed_cascade_rolls_back(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let campaign = ctx.create_with_children(owner, "Half purged").await;
    ctx.service
        .soft_delete(campaign.id, &actor, "")
        .await
        .expect("Soft delete failed");
    let before = ctx
        .db
        .campaigns()
        .count_children(campaign.id)
        .await
        .expect("Failed to count");

    ctx.block_result_deletes().await;
    let result = ctx.service.purge(campaign.id, &actor, true).await;
    assert!(matches!(result, Err(LifecycleError::Storage(_))));

    let stored = ctx.get(campaign.id).await.expect("Campaign should survive");
    assert!(stored.is_deleted());
    let after = ctx
        .db
        .campaigns()
        .count_children(campaign.id)
        .await
        .expect("Failed to count");
    assert_eq!(after, before);
    // The purge entry is rolled back with the cascade
    assert_eq!(ctx.audit_count(campaign.id).await, 1);
}

pub async fn test_missing_calendar_table_is_skipped(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let campaign = ctx.create(owner, "Legacy install", CampaignStatus::Created).await;
    ctx.db
        .campaigns()
        .add_result(CreateCampaignResult {
            campaign_id: campaign.id,
            email: "dave@example.com".to_string(),
            status: "Email Sent".to_string(),
        })
        .await
        .expect("Failed to add result");
    ctx.service
        .soft_delete(campaign.id, &actor, "")
        .await
        .expect("Soft delete failed");

    ctx.exec_ddl("DROP TABLE calendar_events;", "DROP TABLE calendar_events;")
        .await;

    let report = ctx
        .service
        .purge(campaign.id, &actor, true)
        .await
        .expect("Purge should skip the calendar step");
    assert_eq!(report.skipped_steps, vec!["calendar_events"]);
    assert_eq!(report.results, 1);
    assert_eq!(report.campaigns, 1);
    assert!(ctx.get(campaign.id).await.is_none());
}

pub async fn test_audit_failure_policies(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let actor = Actor::user(owner);
    let trashed = ctx.create(owner, "Trashed", CampaignStatus::Created).await;
    let active = ctx.create(owner, "Active", CampaignStatus::Created).await;
    ctx.service
        .soft_delete(trashed.id, &actor, "")
        .await
        .expect("Soft delete failed");

    ctx.block_audit_inserts().await;

    // Purge cannot proceed without its audit entry
    let result = ctx.service.purge(trashed.id, &actor, true).await;
    assert!(matches!(result, Err(LifecycleError::AuditWriteFailed(_))));
    let stored = ctx.get(trashed.id).await.expect("Campaign should survive");
    assert!(stored.is_deleted());

    // Soft delete goes through without one
    let outcome = ctx
        .service
        .soft_delete(active.id, &actor, "")
        .await
        .expect("Soft delete should tolerate audit failure");
    assert!(matches!(outcome, SoftDeleteOutcome::Deleted(_)));
    let stored = ctx.get(active.id).await.expect("Campaign should exist");
    assert!(stored.is_deleted());
    assert_eq!(ctx.audit_count(active.id).await, 0);
}

pub async fn test_system_purge_outcomes(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let active = ctx.create(owner, "Restored meanwhile", CampaignStatus::Created).await;

    assert_eq!(
        ctx.service
            .system_purge(Uuid::new_v4())
            .await
            .expect("System purge failed"),
        SystemPurgeOutcome::AlreadyPurged
    );
    assert_eq!(
        ctx.service
            .system_purge(active.id)
            .await
            .expect("System purge failed"),
        SystemPurgeOutcome::Restored
    );
    assert_eq!(ctx.get(active.id).await, Some(active.clone()));

    ctx.trash_at(active.id, Utc::now() - Duration::days(120)).await;
    assert_eq!(
        ctx.service
            .system_purge(active.id)
            .await
            .expect("System purge failed"),
        SystemPurgeOutcome::Purged
    );
    assert!(ctx.get(active.id).await.is_none());

    let logs = ctx
        .db
        .audit_logs()
        .list_for_entity(CAMPAIGN_ENTITY_TYPE, active.id)
        .await
        .expect("Failed to list audit entries");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].actor_type, AuditActorType::System);
    assert_eq!(logs[0].actor_name.as_deref(), Some(TRASH_TTL_ACTOR_NAME));
    assert_eq!(logs[0].metadata["purge_type"], "ttl_job");
}

// ============================================================================
// Retention Job Tests
// ============================================================================

pub async fn test_retention_purges_expired_oldest_first(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let now = Utc::now();
    let mut ids = Vec::new();
    for (name, days_ago) in [("Recent", 10), ("Expired", 91), ("Ancient", 100)] {
        let c = ctx.create(owner, name, CampaignStatus::Created).await;
        ctx.trash_at(c.id, now - Duration::days(days_ago)).await;
        ids.push(c.id);
    }
    let (recent, expired, ancient) = (ids[0], ids[1], ids[2]);

    let job = ctx.retention_job(100, false);
    let candidates = ctx
        .service
        .list_purge_candidates(job.cutoff(Utc::now()).expect("Cutoff in range"), 100)
        .await
        .expect("Failed to list candidates");
    assert_eq!(candidates, vec![ancient, expired]);

    let report = job
        .run_once(&CancellationToken::new())
        .await
        .expect("Retention cycle failed");
    assert_eq!(report.candidates, 2);
    assert_eq!(report.purged, 2);
    assert_eq!(report.failed, 0);

    assert!(ctx.get(ancient).await.is_none());
    assert!(ctx.get(expired).await.is_none());
    assert!(ctx.get(recent).await.is_some());
    assert_eq!(ctx.audit_count(ancient).await, 1);
}

pub async fn test_retention_respects_batch_size(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let now = Utc::now();
    let mut ids = Vec::new();
    for days_ago in [96, 97, 98, 99, 100] {
        let c = ctx
            .create(owner, &format!("Batch {days_ago}"), CampaignStatus::Created)
            .await;
        ctx.trash_at(c.id, now - Duration::days(days_ago)).await;
        ids.push(c.id);
    }

    let report = ctx
        .retention_job(2, false)
        .run_once(&CancellationToken::new())
        .await
        .expect("Retention cycle failed");
    assert_eq!(report.candidates, 2);
    assert_eq!(report.purged, 2);

    // Only the two oldest (100 and 99 days) are gone
    assert!(ctx.get(ids[4]).await.is_none());
    assert!(ctx.get(ids[3]).await.is_none());
    for id in &ids[..3] {
        assert!(ctx.get(*id).await.is_some());
    }
}

pub async fn test_retention_dry_run_keeps_campaigns(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let c = ctx.create(owner, "Dry run", CampaignStatus::Created).await;
    ctx.trash_at(c.id, Utc::now() - Duration::days(200)).await;

    let report = ctx
        .retention_job(100, true)
        .run_once(&CancellationToken::new())
        .await
        .expect("Retention cycle failed");
    assert_eq!(report.would_purge, 1);
    assert_eq!(report.purged, 0);
    assert!(ctx.get(c.id).await.is_some());
}

pub async fn test_retention_cancelled_before_work(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let c = ctx.create(owner, "Cancelled", CampaignStatus::Created).await;
    ctx.trash_at(c.id, Utc::now() - Duration::days(200)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = ctx.retention_job(100, false).run_once(&cancel).await;

    assert!(matches!(
        result,
        Err(crate::retention::RetentionError::Cancelled {
            processed: 0,
            total: 1
        })
    ));
    assert!(ctx.get(c.id).await.is_some());
}

pub async fn test_retention_all_failed(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let now = Utc::now();
    let mut ids = Vec::new();
    for days_ago in [120, 150] {
        let c = ctx
            .create(owner, &format!("Unpurgeable {days_ago}"), CampaignStatus::Created)
            .await;
        ctx.trash_at(c.id, now - Duration::days(days_ago)).await;
        ids.push(c.id);
    }

    ctx.block_audit_inserts().await;
    let result = ctx
        .retention_job(100, false)
        .run_once(&CancellationToken::new())
        .await;

    assert!(matches!(result, Err(RetentionError::AllFailed { failed: 2 })));
    for id in ids {
        let stored = ctx.get(id).await.expect("Campaign should survive");
        assert!(stored.is_deleted());
    }
}

pub async fn test_retention_partial_failure(ctx: &LifecycleTestContext) {
    let owner = Uuid::new_v4();
    let now = Utc::now();

    // Only the campaign with a result row trips the delete trigger
    let blocked = ctx.create_with_children(owner, "Has results").await;
    ctx.trash_at(blocked.id, now - Duration::days(150)).await;
    let plain = ctx.create(owner, "No results", CampaignStatus::Created).await;
    ctx.trash_at(plain.id, now - Duration::days(120)).await;

    ctx.block_result_deletes().await;
    let report = ctx
        .retention_job(100, false)
        .run_once(&CancellationToken::new())
        .await
        .expect("Partial failure is not a cycle error");

    assert_eq!(report.candidates, 2);
    assert_eq!(report.purged, 1);
    assert_eq!(report.failed, 1);
    assert!(ctx.get(plain.id).await.is_none());
    assert!(ctx.get(blocked.id).await.is_some());
}

pub async fn test_health_check(ctx: &LifecycleTestContext) {
    ctx.db.health_check().await.expect("Health check failed");
}

// ============================================================================
// SQLite Tests
// ============================================================================

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use super::LifecycleTestContext;
    use crate::db::{
        DbPool,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    async fn create_context() -> LifecycleTestContext {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        LifecycleTestContext::new(DbPool::from_sqlite(pool))
    }

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let ctx = create_context().await;
                super::$name(&ctx).await;
            }
        };
    }

    sqlite_test!(test_soft_delete_is_idempotent);
    sqlite_test!(test_soft_delete_stops_running_campaign);
    sqlite_test!(test_concurrent_soft_deletes_record_once);
    sqlite_test!(test_non_owner_cannot_change_campaign);
    sqlite_test!(test_missing_campaign_is_not_found);
    sqlite_test!(test_restore_round_trip);
    sqlite_test!(test_restore_renames_on_conflict);
    sqlite_test!(test_restore_tries_numbered_names);
    sqlite_test!(test_restore_active_campaign_fails);
    sqlite_test!(test_purge_removes_campaign_and_children);
    sqlite_test!(test_purge_requires_admin);
    sqlite_test!(test_purge_active_campaign_fails);
    sqlite_test!(test_failed_cascade_rolls_back);
    sqlite_test!(test_missing_calendar_table_is_skipped);
    sqlite_test!(test_audit_failure_policies);
    sqlite_test!(test_system_purge_outcomes);
    sqlite_test!(test_retention_purges_expired_oldest_first);
    sqlite_test!(test_retention_respects_batch_size);
    sqlite_test!(test_retention_dry_run_keeps_campaigns);
    sqlite_test!(test_retention_cancelled_before_work);
    sqlite_test!(test_retention_all_failed);
    sqlite_test!(test_retention_partial_failure);
    sqlite_test!(test_health_check);
}

// ============================================================================
// PostgreSQL Tests
// ============================================================================

#[cfg(feature = "database-postgres")]
mod postgres_tests {
    use super::LifecycleTestContext;
    use crate::db::{
        DbPool,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let ctx = LifecycleTestContext::new(DbPool::from_postgres(pool, None));
                super::$name(&ctx).await;
            }
        };
    }

    postgres_test!(test_soft_delete_is_idempotent);
    postgres_test!(test_soft_delete_stops_running_campaign);
    postgres_test!(test_concurrent_soft_deletes_record_once);
    postgres_test!(test_non_owner_cannot_change_campaign);
    postgres_test!(test_missing_campaign_is_not_found);
    postgres_test!(test_restore_round_trip);
    postgres_test!(test_restore_renames_on_conflict);
    postgres_test!(test_restore_tries_numbered_names);
    postgres_test!(test_restore_active_campaign_fails);
    postgres_test!(test_purge_removes_campaign_and_children);
    postgres_test!(test_purge_requires_admin);
    postgres_test!(test_purge_active_campaign_fails);
    postgres_test!(test_failed_cascade_rolls_back);
    postgres_test!(test_missing_calendar_table_is_skipped);
    postgres_test!(test_audit_failure_policies);
    postgres_test!(test_system_purge_outcomes);
    postgres_test!(test_retention_purges_expired_oldest_first);
    postgres_test!(test_retention_respects_batch_size);
    postgres_test!(test_retention_dry_run_keeps_campaigns);
    postgres_test!(test_retention_cancelled_before_work);
    postgres_test!(test_retention_all_failed);
    postgres_test!(test_retention_partial_failure);
    postgres_test!(test_health_check);
}
