//! Policy-driven writes to the audit ledger inside a lifecycle transaction.

use crate::{
    db::CampaignLifecycleTx,
    models::{AuditLog, CreateAuditLog},
    observability::metrics,
    services::LifecycleError,
};

const AUDIT_SAVEPOINT: &str = "audit_entry";

/// How a failed audit write affects the surrounding transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPolicy {
    /// Log the failure and let the transition commit without its entry.
    BestEffort,
    /// Abort the transition.
    Required,
}

impl AuditPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditPolicy::BestEffort => "best_effort",
            AuditPolicy::Required => "required",
        }
    }
}

/// Appends audit entries on behalf of lifecycle operations.
///
/// The ledger has no opinion on which transitions need a durable record;
/// each caller passes its own [`AuditPolicy`].
pub struct AuditLedger;

impl AuditLedger {
    /// Append `entry` inside `tx`.
    ///
    /// Under [`AuditPolicy::BestEffort`] the insert runs inside a savepoint, so
    /// a failed write is rolled back on its own and leaves the transaction
    /// usable; `Ok(None)` is returned. Under [`AuditPolicy::Required`] a failed
    /// write is returned as [`LifecycleError::AuditWriteFailed`].
    pub async fn record(
        tx: &mut dyn CampaignLifecycleTx,
        entry: &CreateAuditLog,
        policy: AuditPolicy,
    ) -> Result<Option<AuditLog>, LifecycleError> {
        match policy {
            AuditPolicy::Required => match tx.insert_audit(entry).await {
                Ok(log) => Ok(Some(log)),
                Err(e) => {
                    tracing::error!(
                        action = %entry.action,
                        entity_id = %entry.entity_id,
                        error = %e,
                        "Required audit entry could not be written"
                    );
                    metrics::record_audit_write_failure(entry.action.as_str(), policy.as_str());
                    Err(LifecycleError::AuditWriteFailed(e))
                }
            },
            AuditPolicy::BestEffort => {
                tx.savepoint(AUDIT_SAVEPOINT).await?;
                match tx.insert_audit(entry).await {
                    Ok(log) => {
                        tx.release_savepoint(AUDIT_SAVEPOINT).await?;
                        Ok(Some(log))
                    }
                    Err(e) => {
                        tx.rollback_to_savepoint(AUDIT_SAVEPOINT).await?;
                        tx.release_savepoint(AUDIT_SAVEPOINT).await?;
                        tracing::warn!(
                            action = %entry.action,
                            entity_id = %entry.entity_id,
                            error = %e,
                            "Failed to write audit entry (non-blocking)"
                        );
                        metrics::record_audit_write_failure(
                            entry.action.as_str(),
                            policy.as_str(),
                        );
                        Ok(None)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_labels() {
        assert_eq!(AuditPolicy::BestEffort.as_str(), "best_effort");
        assert_eq!(AuditPolicy::Required.as_str(), "required");
    }
}
