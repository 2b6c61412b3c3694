use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{AuditLog, CreateAuditLog},
};

/// Read and append access to the audit ledger outside a lifecycle transaction.
///
/// Entries are never updated or deleted; purging a campaign leaves its
/// history in place.
#[async_trait]
pub trait AuditLogRepo: Send + Sync {
    /// Append a new audit log entry
    async fn create(&self, input: CreateAuditLog) -> DbResult<AuditLog>;

    /// Get an audit log entry by ID
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<AuditLog>>;

    /// All entries for one entity, newest first
    async fn list_for_entity(&self, entity_type: &str, entity_id: Uuid) -> DbResult<Vec<AuditLog>>;

    /// Most recent entries recorded for a user actor, newest first
    async fn list_by_actor(&self, actor_id: Uuid, limit: i64) -> DbResult<Vec<AuditLog>>;

    /// Count entries for one entity
    async fn count_for_entity(&self, entity_type: &str, entity_id: Uuid) -> DbResult<i64>;
}
