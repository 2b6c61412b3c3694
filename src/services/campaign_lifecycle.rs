//! Trash lifecycle of a campaign: soft delete, restore and purge.
//!
//! Every mutation runs in one lifecycle transaction that starts by locking
//! the campaign. The state machine below is backend-agnostic; only
//! [`CampaignLifecycleTx::lock_campaign`] differs between storage engines.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::{CampaignLifecycleTx, DbError, DbPool, DbResult, TrashPage, truncate_to_millis},
    models::{Actor, AuditAction, Campaign, CreateAuditLog, TRASH_TTL_ACTOR_NAME},
    observability::metrics,
    services::{AuditLedger, AuditPolicy, CascadeDeleter, CascadeReport, LifecycleError},
};

/// Confirmation token accepted for any purge, besides the campaign's exact name.
pub const PURGE_CONFIRMATION_LITERAL: &str = "DELETE";

/// Rename attempts after the first timestamped candidate.
const MAX_NUMBERED_RENAMES: u32 = 9;

/// Result of a successful soft delete.
#[derive(Debug, Clone, PartialEq)]
pub enum SoftDeleteOutcome {
    /// The campaign moved into the trash.
    Deleted(Campaign),
    /// The campaign was already trashed; nothing changed.
    AlreadyDeleted,
}

/// Result of a successful restore.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub campaign: Campaign,
    /// Whether the campaign had to be renamed to avoid an active duplicate
    pub name_changed: bool,
    pub old_name: String,
    /// Name after restore; equal to `old_name` unless `name_changed`
    pub new_name: String,
    pub warnings: Vec<String>,
}

/// Result of a purge performed by the retention job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPurgeOutcome {
    Purged,
    /// The campaign no longer exists.
    AlreadyPurged,
    /// The campaign was restored after it was selected for purging.
    Restored,
}

impl SystemPurgeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemPurgeOutcome::Purged => "purged",
            SystemPurgeOutcome::AlreadyPurged => "already_purged",
            SystemPurgeOutcome::Restored => "restored",
        }
    }
}

/// Whether `token` authorizes purging a campaign named `campaign_name`.
///
/// The token must equal the campaign's exact name or the literal `DELETE`.
/// The API layer checks this before calling [`CampaignLifecycleService::purge`].
pub fn verify_purge_confirmation(campaign_name: &str, token: &str) -> bool {
    token == campaign_name || token == PURGE_CONFIRMATION_LITERAL
}

/// Names tried, in order, when a restored campaign collides with an active one.
///
/// The first candidate carries the restore minute; the rest carry the
/// restore date and a counter.
pub fn rename_candidates(name: &str, now: DateTime<Utc>) -> Vec<String> {
    let mut candidates = Vec::with_capacity(1 + MAX_NUMBERED_RENAMES as usize);
    candidates.push(format!(
        "{} (Restored {})",
        name,
        now.format("%Y-%m-%d %H:%M")
    ));
    let date = now.format("%Y-%m-%d");
    for n in 1..=MAX_NUMBERED_RENAMES {
        candidates.push(format!("{} (Restored {}-{})", name, date, n));
    }
    candidates
}

/// Service layer for campaign trash operations
#[derive(Clone)]
pub struct CampaignLifecycleService {
    db: Arc<DbPool>,
}

impl CampaignLifecycleService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Move a campaign into the trash.
    ///
    /// Soft-deleting a campaign that is already trashed succeeds without
    /// changing it. A missing audit entry does not fail the operation.
    pub async fn soft_delete(
        &self,
        campaign_id: Uuid,
        actor: &Actor,
        reason: &str,
    ) -> Result<SoftDeleteOutcome, LifecycleError> {
        let mut tx = self.begin().await?;
        let result = soft_delete_locked(tx.as_mut(), campaign_id, actor, reason).await;
        let result = finish(tx, result).await;

        match &result {
            Ok(SoftDeleteOutcome::Deleted(campaign)) => {
                tracing::info!(
                    campaign_id = %campaign_id,
                    user_id = %campaign.user_id,
                    version = campaign.version,
                    "Campaign moved to trash"
                );
                metrics::record_lifecycle_transition("soft_delete", "success");
            }
            Ok(SoftDeleteOutcome::AlreadyDeleted) => {
                tracing::debug!(campaign_id = %campaign_id, "Campaign already in trash");
                metrics::record_lifecycle_transition("soft_delete", "noop");
            }
            Err(e) => record_failure("soft_delete", campaign_id, e),
        }
        result
    }

    /// Bring a trashed campaign back, renaming it if an active campaign of the
    /// same owner already uses its name.
    pub async fn restore(
        &self,
        campaign_id: Uuid,
        actor: &Actor,
    ) -> Result<RestoreOutcome, LifecycleError> {
        let mut tx = self.begin().await?;
        let result = restore_locked(tx.as_mut(), campaign_id, actor).await;
        let result = finish(tx, result).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    campaign_id = %campaign_id,
                    name_changed = outcome.name_changed,
                    warnings = outcome.warnings.len(),
                    "Campaign restored"
                );
                metrics::record_lifecycle_transition("restore", "success");
            }
            Err(e) => record_failure("restore", campaign_id, e),
        }
        result
    }

    /// Permanently delete a trashed campaign and everything it owns.
    ///
    /// Requires an admin who owns the campaign. The audit entry is written
    /// before any row is deleted; if it cannot be written nothing is deleted.
    pub async fn purge(
        &self,
        campaign_id: Uuid,
        actor: &Actor,
        is_admin: bool,
    ) -> Result<CascadeReport, LifecycleError> {
        if !is_admin {
            let err = LifecycleError::PermissionDenied;
            record_failure("purge", campaign_id, &err);
            return Err(err);
        }

        let mut tx = self.begin().await?;
        let result = purge_locked(tx.as_mut(), campaign_id, actor).await;
        let result = finish(tx, result).await;

        match &result {
            Ok(report) => {
                tracing::info!(
                    campaign_id = %campaign_id,
                    child_rows = report.child_rows(),
                    "Campaign purged"
                );
                metrics::record_lifecycle_transition("purge", "success");
            }
            Err(e) => record_failure("purge", campaign_id, e),
        }
        result
    }

    /// Purge on behalf of the retention job.
    ///
    /// Ownership is not checked. A campaign that is gone or back in use is
    /// reported through the outcome instead of an error, since both are the
    /// expected result of racing an interactive purge or restore.
    pub async fn system_purge(
        &self,
        campaign_id: Uuid,
    ) -> Result<SystemPurgeOutcome, LifecycleError> {
        let mut tx = self.begin().await?;
        let result = system_purge_locked(tx.as_mut(), campaign_id).await;
        let result = finish(tx, result).await;

        match &result {
            Ok(SystemPurgeOutcome::Purged) => {
                tracing::info!(campaign_id = %campaign_id, "Campaign purged by retention job");
                metrics::record_lifecycle_transition("system_purge", "success");
            }
            Ok(outcome) => {
                tracing::warn!(
                    campaign_id = %campaign_id,
                    outcome = outcome.as_str(),
                    "Skipped system purge"
                );
                metrics::record_lifecycle_transition("system_purge", "noop");
            }
            Err(e) => record_failure("system_purge", campaign_id, e),
        }
        result
    }

    /// Trashed campaigns of one owner, most recently deleted first.
    pub async fn list_trashed(&self, user_id: Uuid, offset: i64, limit: i64) -> DbResult<TrashPage> {
        self.db
            .campaigns()
            .list_trashed(user_id, offset, limit)
            .await
    }

    /// Ids of campaigns trashed before `cutoff`, oldest first.
    pub async fn list_purge_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<Uuid>> {
        self.db
            .campaigns()
            .list_purge_candidates(cutoff, limit)
            .await
    }

    async fn begin(&self) -> Result<Box<dyn CampaignLifecycleTx>, LifecycleError> {
        let repo = self.db.campaigns();
        tracing::trace!(
            row_locks = repo.supports_row_locks(),
            "Opening lifecycle transaction"
        );
        Ok(repo.begin_lifecycle().await?)
    }
}

/// Commit on success, roll back on failure.
async fn finish<T>(
    tx: Box<dyn CampaignLifecycleTx>,
    result: Result<T, LifecycleError>,
) -> Result<T, LifecycleError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to roll back lifecycle transaction");
            }
            Err(e)
        }
    }
}

fn record_failure(action: &str, campaign_id: Uuid, err: &LifecycleError) {
    match err {
        LifecycleError::Storage(_) | LifecycleError::AuditWriteFailed(_) => {
            tracing::error!(campaign_id = %campaign_id, action, error = %err, "Lifecycle operation failed");
        }
        _ => {
            tracing::warn!(campaign_id = %campaign_id, action, error = %err, "Lifecycle operation rejected");
        }
    }
    metrics::record_lifecycle_transition(action, err.kind());
}

/// The acting user's id, if they own `campaign`.
fn owning_actor(actor: &Actor, campaign: &Campaign) -> Result<Uuid, LifecycleError> {
    match actor.id {
        Some(id) if actor.owns(campaign.user_id) => Ok(id),
        _ => Err(LifecycleError::PermissionDenied),
    }
}

/// A version mismatch or unique-index hit on save means another
/// transaction got there first.
fn save_error(err: DbError) -> LifecycleError {
    match err {
        DbError::Conflict(msg) => LifecycleError::ConcurrentModification(msg),
        other => LifecycleError::Storage(other),
    }
}

async fn lock(
    tx: &mut dyn CampaignLifecycleTx,
    campaign_id: Uuid,
) -> Result<Campaign, LifecycleError> {
    tx.lock_campaign(campaign_id)
        .await?
        .ok_or(LifecycleError::NotFound)
}

async fn soft_delete_locked(
    tx: &mut dyn CampaignLifecycleTx,
    campaign_id: Uuid,
    actor: &Actor,
    reason: &str,
) -> Result<SoftDeleteOutcome, LifecycleError> {
    let mut campaign = lock(tx, campaign_id).await?;
    let actor_id = owning_actor(actor, &campaign)?;

    if campaign.is_deleted() {
        return Ok(SoftDeleteOutcome::AlreadyDeleted);
    }

    let expected_version = campaign.version;
    campaign.mark_deleted(actor_id, reason, truncate_to_millis(Utc::now()));
    tx.save_lifecycle(&campaign, expected_version)
        .await
        .map_err(save_error)?;

    let entry = CreateAuditLog::for_campaign(
        actor,
        AuditAction::CampaignSoftDeleted,
        campaign_id,
        json!({
            "name": campaign.name,
            "status_before": campaign.status_before_delete,
            "reason": reason,
            "campaign_type": campaign.campaign_type,
        }),
    );
    AuditLedger::record(tx, &entry, AuditPolicy::BestEffort).await?;

    Ok(SoftDeleteOutcome::Deleted(campaign))
}

async fn restore_locked(
    tx: &mut dyn CampaignLifecycleTx,
    campaign_id: Uuid,
    actor: &Actor,
) -> Result<RestoreOutcome, LifecycleError> {
    let mut campaign = lock(tx, campaign_id).await?;
    let actor_id = owning_actor(actor, &campaign)?;

    if !campaign.is_deleted() {
        return Err(LifecycleError::NotDeleted);
    }

    let now = truncate_to_millis(Utc::now());
    let old_name = campaign.name.clone();
    let mut warnings = Vec::new();

    if tx
        .active_name_taken(campaign.user_id, &old_name, campaign_id)
        .await?
    {
        let mut free_name = None;
        for candidate in rename_candidates(&old_name, now) {
            if !tx
                .active_name_taken(campaign.user_id, &candidate, campaign_id)
                .await?
            {
                free_name = Some(candidate);
                break;
            }
        }
        let new_name = free_name.ok_or_else(|| LifecycleError::NameConflict(old_name.clone()))?;

        tracing::info!(
            campaign_id = %campaign_id,
            old_name = %old_name,
            new_name = %new_name,
            "Renaming campaign during restore"
        );
        warnings.push(format!(
            "Campaign renamed from '{}' to '{}' due to name conflict",
            old_name, new_name
        ));
        campaign.name = new_name;
    }

    let name_changed = campaign.name != old_name;
    let expected_version = campaign.version;
    campaign.mark_restored(actor_id, now);
    tx.save_lifecycle(&campaign, expected_version)
        .await
        .map_err(save_error)?;

    let entry = CreateAuditLog::for_campaign(
        actor,
        AuditAction::CampaignRestored,
        campaign_id,
        json!({
            "name": campaign.name,
            "original_name": old_name,
            "name_changed": name_changed,
            "warnings": warnings,
        }),
    );
    AuditLedger::record(tx, &entry, AuditPolicy::BestEffort).await?;

    Ok(RestoreOutcome {
        new_name: campaign.name.clone(),
        campaign,
        name_changed,
        old_name,
        warnings,
    })
}

async fn purge_locked(
    tx: &mut dyn CampaignLifecycleTx,
    campaign_id: Uuid,
    actor: &Actor,
) -> Result<CascadeReport, LifecycleError> {
    let campaign = lock(tx, campaign_id).await?;
    owning_actor(actor, &campaign)?;

    if !campaign.is_deleted() {
        return Err(LifecycleError::NotDeleted);
    }

    purge_trashed(tx, &campaign, actor, None).await
}

async fn system_purge_locked(
    tx: &mut dyn CampaignLifecycleTx,
    campaign_id: Uuid,
) -> Result<SystemPurgeOutcome, LifecycleError> {
    let Some(campaign) = tx.lock_campaign(campaign_id).await? else {
        return Ok(SystemPurgeOutcome::AlreadyPurged);
    };
    if !campaign.is_deleted() {
        return Ok(SystemPurgeOutcome::Restored);
    }

    let actor = Actor::system(TRASH_TTL_ACTOR_NAME);
    purge_trashed(tx, &campaign, &actor, Some("ttl_job")).await?;
    Ok(SystemPurgeOutcome::Purged)
}

/// Write the required audit entry, then cascade. `campaign` must be trashed
/// and locked by `tx`.
async fn purge_trashed(
    tx: &mut dyn CampaignLifecycleTx,
    campaign: &Campaign,
    actor: &Actor,
    purge_type: Option<&str>,
) -> Result<CascadeReport, LifecycleError> {
    let mut metadata = json!({
        "name": campaign.name,
        "deleted_at": campaign.deleted_at,
        "user_id": campaign.user_id,
    });
    if let Some(purge_type) = purge_type {
        metadata["purge_type"] = json!(purge_type);
    }

    let entry =
        CreateAuditLog::for_campaign(actor, AuditAction::CampaignPurged, campaign.id, metadata);
    AuditLedger::record(tx, &entry, AuditPolicy::Required).await?;

    Ok(CascadeDeleter::run(tx, campaign.id).await?)
}
