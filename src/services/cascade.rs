//! Removal of everything a campaign owns, in dependency order.

use uuid::Uuid;

use crate::db::{CampaignLifecycleTx, CascadeStep, DbError, DbResult};

/// Order in which a purge deletes a campaign's rows.
///
/// Calendar events reference results, so they go first; the campaign row
/// goes last.
pub const CASCADE_ORDER: [CascadeStep; 5] = [
    CascadeStep::CalendarEvents,
    CascadeStep::Events,
    CascadeStep::Results,
    CascadeStep::CampaignGroups,
    CascadeStep::Campaign,
];

const OPTIONAL_STEP_SAVEPOINT: &str = "cascade_optional_step";

/// Rows removed by one cascade run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub calendar_events: u64,
    pub events: u64,
    pub results: u64,
    pub campaign_groups: u64,
    pub campaigns: u64,
    /// Optional steps that failed and were skipped
    pub skipped_steps: Vec<&'static str>,
}

impl CascadeReport {
    fn record(&mut self, step: CascadeStep, rows: u64) {
        match step {
            CascadeStep::CalendarEvents => self.calendar_events = rows,
            CascadeStep::Events => self.events = rows,
            CascadeStep::Results => self.results = rows,
            CascadeStep::CampaignGroups => self.campaign_groups = rows,
            CascadeStep::Campaign => self.campaigns = rows,
        }
    }

    /// Child rows removed, not counting the campaign itself.
    pub fn child_rows(&self) -> u64 {
        self.calendar_events + self.events + self.results + self.campaign_groups
    }
}

/// Deletes a campaign and its children inside an open lifecycle transaction.
pub struct CascadeDeleter;

impl CascadeDeleter {
    /// Whether a failure of `step` may be skipped.
    ///
    /// The calendar tracking table is missing from older installations.
    pub fn is_optional(step: CascadeStep) -> bool {
        matches!(step, CascadeStep::CalendarEvents)
    }

    /// Run every step of [`CASCADE_ORDER`] for `campaign_id`.
    ///
    /// A failed required step is returned as-is; the caller must roll the
    /// transaction back. Optional steps run inside a savepoint and are
    /// skipped on failure.
    pub async fn run(
        tx: &mut dyn CampaignLifecycleTx,
        campaign_id: Uuid,
    ) -> DbResult<CascadeReport> {
        let mut report = CascadeReport::default();

        for step in CASCADE_ORDER {
            if Self::is_optional(step) {
                tx.savepoint(OPTIONAL_STEP_SAVEPOINT).await?;
                match tx.delete_step(step, campaign_id).await {
                    Ok(rows) => {
                        tx.release_savepoint(OPTIONAL_STEP_SAVEPOINT).await?;
                        report.record(step, rows);
                    }
                    Err(e) => {
                        tx.rollback_to_savepoint(OPTIONAL_STEP_SAVEPOINT).await?;
                        tx.release_savepoint(OPTIONAL_STEP_SAVEPOINT).await?;
                        tracing::warn!(
                            campaign_id = %campaign_id,
                            step = step.as_str(),
                            error = %e,
                            "Skipping optional cascade step"
                        );
                        report.skipped_steps.push(step.as_str());
                    }
                }
                continue;
            }

            let rows = tx.delete_step(step, campaign_id).await.map_err(|e| {
                tracing::error!(
                    campaign_id = %campaign_id,
                    step = step.as_str(),
                    error = %e,
                    "Cascade step failed"
                );
                e
            })?;
            tracing::debug!(
                campaign_id = %campaign_id,
                step = step.as_str(),
                rows,
                "Cascade step complete"
            );
            report.record(step, rows);
        }

        if report.campaigns == 0 {
            return Err(DbError::NotFound);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_row_is_deleted_last() {
        assert_eq!(CASCADE_ORDER.last(), Some(&CascadeStep::Campaign));
        let calendar = CASCADE_ORDER
            .iter()
            .position(|s| *s == CascadeStep::CalendarEvents);
        let results = CASCADE_ORDER
            .iter()
            .position(|s| *s == CascadeStep::Results);
        assert!(calendar < results);
    }

    #[test]
    fn test_only_calendar_events_are_optional() {
        let optional: Vec<_> = CASCADE_ORDER
            .into_iter()
            .filter(|s| CascadeDeleter::is_optional(*s))
            .collect();
        assert_eq!(optional, vec![CascadeStep::CalendarEvents]);
    }

    #[test]
    fn test_report_child_rows() {
        let mut report = CascadeReport::default();
        report.record(CascadeStep::Results, 4);
        report.record(CascadeStep::Events, 7);
        report.record(CascadeStep::Campaign, 1);
        assert_eq!(report.child_rows(), 11);
        assert_eq!(report.campaigns, 1);
    }
}
