use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::{DbError, DbResult},
    models::{
        AuditLog, Campaign, CampaignChildCounts, CreateAuditLog, CreateCalendarEvent,
        CreateCampaign, CreateCampaignEvent, CreateCampaignResult, TargetGroup,
    },
};

/// One page of trashed campaigns plus the owner's total trash size.
#[derive(Debug, Clone)]
pub struct TrashPage {
    pub items: Vec<Campaign>,
    pub total: i64,
}

/// A single table-level deletion performed while purging a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    /// Calendar tracking events joined through the campaign's results
    CalendarEvents,
    Events,
    Results,
    CampaignGroups,
    /// The campaign row itself
    Campaign,
}

impl CascadeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStep::CalendarEvents => "calendar_events",
            CascadeStep::Events => "events",
            CascadeStep::Results => "results",
            CascadeStep::CampaignGroups => "campaign_groups",
            CascadeStep::Campaign => "campaign",
        }
    }

    /// Build the DELETE statement for this step. `param` is the backend's
    /// placeholder for the campaign id (`?` or `$1`).
    pub fn delete_sql(&self, param: &str) -> String {
        match self {
            CascadeStep::CalendarEvents => format!(
                "DELETE FROM calendar_events WHERE result_id IN \
                 (SELECT id FROM results WHERE campaign_id = {param})"
            ),
            CascadeStep::Events => format!("DELETE FROM events WHERE campaign_id = {param}"),
            CascadeStep::Results => format!("DELETE FROM results WHERE campaign_id = {param}"),
            CascadeStep::CampaignGroups => {
                format!("DELETE FROM campaign_groups WHERE campaign_id = {param}")
            }
            CascadeStep::Campaign => format!("DELETE FROM campaigns WHERE id = {param}"),
        }
    }
}

/// Build a savepoint statement such as `SAVEPOINT audit_entry`.
///
/// Savepoint names cannot be bound as parameters, so only plain
/// identifiers are accepted.
pub(crate) fn savepoint_statement(verb: &str, name: &str) -> DbResult<String> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DbError::Validation(format!(
            "Invalid savepoint name: {:?}",
            name
        )));
    }
    Ok(format!("{verb} {name}"))
}

#[async_trait]
pub trait CampaignRepo: Send + Sync {
    /// Whether the backend supports explicit exclusive row locks.
    ///
    /// Backends without them serialize writers at the database level and
    /// take that lock when a lifecycle transaction locks its campaign.
    fn supports_row_locks(&self) -> bool;

    /// Open a transaction for a lifecycle mutation.
    async fn begin_lifecycle(&self) -> DbResult<Box<dyn CampaignLifecycleTx>>;

    /// Create an active campaign. Fails with `Conflict` if the owner already
    /// has an active campaign with the same name (case-insensitive).
    async fn create(&self, input: CreateCampaign) -> DbResult<Campaign>;

    /// Fetch a campaign whether active or trashed.
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Campaign>>;

    /// Active campaigns of one owner, newest first.
    async fn list_active(&self, user_id: Uuid, offset: i64, limit: i64) -> DbResult<Vec<Campaign>>;

    /// Trashed campaigns of one owner, most recently deleted first.
    async fn list_trashed(&self, user_id: Uuid, offset: i64, limit: i64) -> DbResult<TrashPage>;

    /// Ids of trashed campaigns deleted strictly before `cutoff`, oldest first.
    async fn list_purge_candidates(&self, cutoff: DateTime<Utc>, limit: i64) -> DbResult<Vec<Uuid>>;

    // ==================== Child records ====================

    async fn create_group(&self, user_id: Uuid, name: &str) -> DbResult<TargetGroup>;

    async fn attach_group(&self, campaign_id: Uuid, group_id: Uuid) -> DbResult<()>;

    async fn add_result(&self, input: CreateCampaignResult) -> DbResult<Uuid>;

    async fn add_event(&self, input: CreateCampaignEvent) -> DbResult<Uuid>;

    async fn add_calendar_event(&self, input: CreateCalendarEvent) -> DbResult<Uuid>;

    /// Count the rows a campaign owns in each child table.
    async fn count_children(&self, campaign_id: Uuid) -> DbResult<CampaignChildCounts>;
}

/// A single open lifecycle transaction.
///
/// Dropping the value without calling `commit` discards all changes.
#[async_trait]
pub trait CampaignLifecycleTx: Send {
    /// Lock the campaign for the rest of the transaction and return it,
    /// including trashed rows. Returns `None` if the campaign does not exist.
    async fn lock_campaign(&mut self, id: Uuid) -> DbResult<Option<Campaign>>;

    /// Whether another active campaign of `user_id` is named `name`, ignoring case.
    async fn active_name_taken(&mut self, user_id: Uuid, name: &str, exclude_id: Uuid)
    -> DbResult<bool>;

    /// Persist the lifecycle fields of `campaign`.
    ///
    /// The row must still carry `expected_version`; otherwise the update
    /// fails with `Conflict`. Trashed rows are not filtered out.
    async fn save_lifecycle(&mut self, campaign: &Campaign, expected_version: i64) -> DbResult<()>;

    /// Append an audit entry inside this transaction.
    async fn insert_audit(&mut self, input: &CreateAuditLog) -> DbResult<AuditLog>;

    /// Run one cascade deletion for `campaign_id`, returning rows removed.
    async fn delete_step(&mut self, step: CascadeStep, campaign_id: Uuid) -> DbResult<u64>;

    async fn savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;
}
