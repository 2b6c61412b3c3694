//! Automatic purging of campaigns that stayed in the trash past the
//! retention window.
//!
//! [`TrashRetentionJob`] runs one purge cycle at startup and then one per
//! interval until it is stopped or its cancellation token fires. Each cycle:
//! 1. Computes the cutoff `now - retention_days`
//! 2. Lists up to `batch_size` campaigns trashed before the cutoff, oldest first
//! 3. System-purges them one by one, checking for cancellation in between
//!
//! A failed purge is logged and counted without stopping the batch.

mod scheduler;

use std::time::Duration;

pub use scheduler::{CycleReport, JobMetrics, TrashRetentionJob};

use crate::db::DbError;

/// Errors from a single retention cycle.
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("Failed to list purge candidates: {0}")]
    ListCandidates(DbError),

    #[error("Retention window of {retention_days} days is out of range")]
    CutoffOutOfRange { retention_days: i64 },

    #[error("All {failed} purge operations failed")]
    AllFailed { failed: usize },

    #[error("Retention cycle cancelled after {processed}/{total} campaigns")]
    Cancelled { processed: usize, total: usize },

    #[error("Retention cycle exceeded its {0:?} timeout")]
    TimedOut(Duration),
}

impl RetentionError {
    /// Label used for the cycle `status` metric dimension.
    pub fn status(&self) -> &'static str {
        match self {
            RetentionError::ListCandidates(_)
            | RetentionError::CutoffOutOfRange { .. }
            | RetentionError::AllFailed { .. } => "failed",
            RetentionError::Cancelled { .. } => "cancelled",
            RetentionError::TimedOut(_) => "timed_out",
        }
    }
}
