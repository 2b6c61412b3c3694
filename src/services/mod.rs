mod audit_ledger;
mod campaign_lifecycle;
mod cascade;

pub use audit_ledger::{AuditLedger, AuditPolicy};
pub use campaign_lifecycle::{
    CampaignLifecycleService, PURGE_CONFIRMATION_LITERAL, RestoreOutcome, SoftDeleteOutcome,
    SystemPurgeOutcome, rename_candidates, verify_purge_confirmation,
};
pub use cascade::{CASCADE_ORDER, CascadeDeleter, CascadeReport};
use http::StatusCode;

use crate::db::DbError;

/// Errors returned by campaign lifecycle operations.
///
/// Every variant is raised before the transaction commits, so an error
/// always means nothing was changed.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Campaign is not in the trash")]
    NotDeleted,

    #[error("No free name found for restored campaign '{0}'")]
    NameConflict(String),

    #[error("Campaign was modified concurrently: {0}")]
    ConcurrentModification(String),

    #[error("Audit entry could not be written: {0}")]
    AuditWriteFailed(DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

impl LifecycleError {
    /// HTTP status the API layer should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            LifecycleError::NotFound => StatusCode::NOT_FOUND,
            LifecycleError::PermissionDenied => StatusCode::FORBIDDEN,
            LifecycleError::NotDeleted => StatusCode::BAD_REQUEST,
            LifecycleError::NameConflict(_) | LifecycleError::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            LifecycleError::AuditWriteFailed(_) | LifecycleError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label used for the `outcome` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::NotFound => "not_found",
            LifecycleError::PermissionDenied => "permission_denied",
            LifecycleError::NotDeleted => "not_deleted",
            LifecycleError::NameConflict(_) => "name_conflict",
            LifecycleError::ConcurrentModification(_) => "concurrent_modification",
            LifecycleError::AuditWriteFailed(_) => "audit_write_failed",
            LifecycleError::Storage(_) => "storage",
        }
    }
}
