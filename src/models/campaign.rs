use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Created but never launched
    Created,
    /// Scheduled for launch
    Queued,
    /// Sending or awaiting interactions
    InProgress,
    /// Finished; no further outbound activity
    Complete,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Created => "created",
            CampaignStatus::Queued => "queued",
            CampaignStatus::InProgress => "in_progress",
            CampaignStatus::Complete => "complete",
        }
    }

    /// Whether the campaign may still trigger outbound activity.
    pub fn is_sending(&self) -> bool {
        matches!(self, CampaignStatus::Queued | CampaignStatus::InProgress)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(CampaignStatus::Created),
            "queued" => Ok(CampaignStatus::Queued),
            "in_progress" => Ok(CampaignStatus::InProgress),
            "complete" => Ok(CampaignStatus::Complete),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// A phishing-simulation campaign, including its trash lifecycle fields.
///
/// A campaign is *active* while `deleted_at` is `None` and *trashed*
/// otherwise. Purged campaigns no longer exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name, unique per owner among active campaigns (case-insensitive)
    pub name: String,
    /// Campaign kind (e.g. "email", "calendar")
    pub campaign_type: String,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_by: Option<Uuid>,
    /// Status snapshot taken when the campaign was trashed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_before_delete: Option<CampaignStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_reason: Option<String>,
    /// Incremented on every lifecycle mutation
    pub version: i64,
}

impl Campaign {
    /// Returns true if the campaign is in the trash.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Move the campaign into the trash.
    ///
    /// A queued or running campaign is forced to `Complete` so nothing keeps
    /// sending on its behalf; the prior status is kept in
    /// `status_before_delete`.
    pub fn mark_deleted(&mut self, actor_id: Uuid, reason: &str, now: DateTime<Utc>) {
        self.status_before_delete = Some(self.status);
        if self.status.is_sending() {
            self.status = CampaignStatus::Complete;
        }
        self.deleted_at = Some(now);
        self.deleted_by = Some(actor_id);
        self.delete_reason = Some(reason.to_string());
        self.version += 1;
    }

    /// Bring the campaign back out of the trash in the inert `Created` state.
    pub fn mark_restored(&mut self, actor_id: Uuid, now: DateTime<Utc>) {
        self.deleted_at = None;
        self.deleted_by = None;
        self.restored_at = Some(now);
        self.restored_by = Some(actor_id);
        self.status = CampaignStatus::Created;
        self.version += 1;
    }
}

/// Input for creating a new campaign
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    pub user_id: Uuid,
    pub name: String,
    pub campaign_type: String,
    pub status: CampaignStatus,
}

/// A recipient group a campaign can target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetGroup {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a delivery result for one recipient
#[derive(Debug, Clone)]
pub struct CreateCampaignResult {
    pub campaign_id: Uuid,
    pub email: String,
    pub status: String,
}

/// Input for recording a tracking event
#[derive(Debug, Clone)]
pub struct CreateCampaignEvent {
    pub campaign_id: Uuid,
    pub email: String,
    pub message: String,
    pub details: Option<String>,
}

/// Input for recording a calendar-invite tracking event against a result
#[derive(Debug, Clone)]
pub struct CreateCalendarEvent {
    pub result_id: Uuid,
    /// One of `ics_sent`, `link_opened`, `credentials_submitted`, `reported`
    pub event_type: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<String>,
}

/// Number of rows owned by a campaign in each child table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignChildCounts {
    pub results: i64,
    pub events: i64,
    pub calendar_events: i64,
    pub groups: i64,
}

impl CampaignChildCounts {
    pub fn total(&self) -> i64 {
        self.results + self.events + self.calendar_events + self.groups
    }
}
