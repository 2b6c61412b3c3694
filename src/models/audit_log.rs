use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Entity type recorded for campaign lifecycle entries
pub const CAMPAIGN_ENTITY_TYPE: &str = "campaign";

/// Display name of the actor used by the retention job
pub const TRASH_TTL_ACTOR_NAME: &str = "system:trash-ttl";

/// Type of actor that performed an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActorType {
    /// A user performed the action
    User,
    /// The system performed the action automatically
    System,
}

impl std::fmt::Display for AuditActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditActorType::User => write!(f, "user"),
            AuditActorType::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for AuditActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(AuditActorType::User),
            "system" => Ok(AuditActorType::System),
            _ => Err(format!("Invalid actor type: {}", s)),
        }
    }
}

/// Lifecycle transition recorded in the audit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "campaign.soft_deleted")]
    CampaignSoftDeleted,
    #[serde(rename = "campaign.restored")]
    CampaignRestored,
    #[serde(rename = "campaign.purged")]
    CampaignPurged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CampaignSoftDeleted => "campaign.soft_deleted",
            AuditAction::CampaignRestored => "campaign.restored",
            AuditAction::CampaignPurged => "campaign.purged",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "campaign.soft_deleted" => Ok(AuditAction::CampaignSoftDeleted),
            "campaign.restored" => Ok(AuditAction::CampaignRestored),
            "campaign.purged" => Ok(AuditAction::CampaignPurged),
            _ => Err(format!("Invalid audit action: {}", s)),
        }
    }
}

/// The identity performing a lifecycle operation.
///
/// Users are identified by id and may only act on campaigns they own. The
/// system actor carries only a display name and bypasses ownership checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_type: AuditActorType,
    pub id: Option<Uuid>,
    pub name: Option<String>,
    /// Client IP address of the originating request
    pub ip_address: Option<String>,
    /// Client user agent of the originating request
    pub user_agent: Option<String>,
}

impl Actor {
    pub fn user(id: Uuid) -> Self {
        Self {
            actor_type: AuditActorType::User,
            id: Some(id),
            name: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self {
            actor_type: AuditActorType::System,
            id: None,
            name: Some(name.into()),
            ip_address: None,
            user_agent: None,
        }
    }

    /// Attach request metadata recorded alongside audit entries.
    pub fn with_request(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn is_system(&self) -> bool {
        self.actor_type == AuditActorType::System
    }

    /// Whether this actor owns a record belonging to `owner_id`.
    pub fn owns(&self, owner_id: Uuid) -> bool {
        self.id == Some(owner_id)
    }
}

/// An audit log entry recording a campaign lifecycle transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    /// Unique identifier for this audit log entry
    pub id: Uuid,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
    /// Type of actor that performed the action
    pub actor_type: AuditActorType,
    /// ID of the acting user (None for system)
    pub actor_id: Option<Uuid>,
    /// Display name of the actor, set for system actors
    pub actor_name: Option<String>,
    /// The transition performed
    pub action: AuditAction,
    /// Type of entity affected (e.g., "campaign")
    pub entity_type: String,
    /// ID of the affected entity
    pub entity_id: Uuid,
    /// Action-specific details
    pub metadata: JsonValue,
    /// Client IP address
    pub ip_address: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
}

/// Input for creating a new audit log entry
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub actor_type: AuditActorType,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub metadata: JsonValue,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl CreateAuditLog {
    /// Build an entry for a campaign transition performed by `actor`.
    pub fn for_campaign(
        actor: &Actor,
        action: AuditAction,
        campaign_id: Uuid,
        metadata: JsonValue,
    ) -> Self {
        Self {
            actor_type: actor.actor_type,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            action,
            entity_type: CAMPAIGN_ENTITY_TYPE.to_string(),
            entity_id: campaign_id,
            metadata,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
        }
    }
}
