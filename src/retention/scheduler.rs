use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::RetentionError;
use crate::{
    config::TrashRetentionConfig,
    observability::metrics,
    services::{CampaignLifecycleService, LifecycleError, SystemPurgeOutcome},
};

/// Aggregate counts from one retention cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cutoff: DateTime<Utc>,
    /// Candidates returned for this cycle
    pub candidates: usize,
    pub purged: usize,
    /// Candidates that were already gone or had been restored
    pub skipped: usize,
    pub failed: usize,
    /// Candidates logged but left alone because of `dry_run`
    pub would_purge: usize,
    pub duration: Duration,
}

impl CycleReport {
    fn new(cutoff: DateTime<Utc>, candidates: usize) -> Self {
        Self {
            cutoff,
            candidates,
            purged: 0,
            skipped: 0,
            failed: 0,
            would_purge: 0,
            duration: Duration::ZERO,
        }
    }

    fn status(&self) -> &'static str {
        if self.failed > 0 { "partial" } else { "success" }
    }
}

/// Effective settings of a retention job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobMetrics {
    pub retention_days: i64,
    pub interval: Duration,
    pub batch_size: i64,
    pub enabled: bool,
    pub dry_run: bool,
}

/// Background job that purges campaigns left in the trash too long.
///
/// Lifecycle: idle until [`start`](Self::start), running until
/// [`stop`](Self::stop) or the caller's cancellation token fires, then
/// stopped for good.
pub struct TrashRetentionJob {
    service: CampaignLifecycleService,
    config: TrashRetentionConfig,
    stop: CancellationToken,
    started: AtomicBool,
}

impl TrashRetentionJob {
    /// Create a job. Zero or negative settings fall back to their defaults.
    pub fn new(service: CampaignLifecycleService, config: &TrashRetentionConfig) -> Self {
        Self {
            service,
            config: config.normalized(),
            stop: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Start the job as a background task.
    ///
    /// Returns `None` without doing any work if the job is disabled, already
    /// started, or already stopped. Otherwise runs one cycle right away and
    /// then one per interval until `cancel` fires or [`stop`](Self::stop) is
    /// called.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::info!("Trash retention job disabled by configuration");
            return None;
        }
        if self.stop.is_cancelled() {
            tracing::warn!("Trash retention job was stopped; not starting");
            return None;
        }
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("Trash retention job already started");
            return None;
        }

        let dry_run_msg = if self.config.dry_run { " (DRY RUN)" } else { "" };
        tracing::info!(
            retention_days = self.config.retention_days,
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            dry_run = self.config.dry_run,
            "Starting trash retention job{}",
            dry_run_msg
        );

        let job = Arc::clone(self);
        Some(tokio::spawn(async move {
            job.run_logged(&cancel).await;

            let interval = job.config.interval();
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("Trash retention job stopped (cancelled)");
                        break;
                    }
                    _ = job.stop.cancelled() => {
                        tracing::info!("Trash retention job stopped (stop requested)");
                        break;
                    }
                    _ = ticker.tick() => {
                        job.run_logged(&cancel).await;
                    }
                }
            }
        }))
    }

    /// Ask the background task to exit.
    ///
    /// Safe to call any number of times, before `start`, or after the task
    /// has already exited. A stopped job cannot be started again.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            tracing::info!("Stopping trash retention job");
        }
        self.stop.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Effective configuration after defaults were applied.
    pub fn metrics(&self) -> JobMetrics {
        JobMetrics {
            retention_days: self.config.retention_days,
            interval: self.config.interval(),
            batch_size: self.config.batch_size,
            enabled: self.config.enabled,
            dry_run: self.config.dry_run,
        }
    }

    /// Cutoff for a cycle running at `now`: campaigns trashed strictly
    /// before it are purged.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, RetentionError> {
        let retention_days = self.config.retention_days;
        chrono::Duration::try_days(retention_days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or(RetentionError::CutoffOutOfRange { retention_days })
    }

    /// Run a single purge cycle, bounded by the configured cycle timeout.
    ///
    /// Works whether or not the job is enabled or started, so it can be used
    /// for manual triggers.
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, RetentionError> {
        let started = Instant::now();
        let timeout = self.config.cycle_timeout();

        let result = match tokio::time::timeout(timeout, self.run_cycle(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(RetentionError::TimedOut(timeout)),
        };

        let elapsed = started.elapsed();
        let status = match &result {
            Ok(report) => report.status(),
            Err(e) => e.status(),
        };
        metrics::record_retention_cycle(status, elapsed.as_secs_f64());

        result.map(|mut report| {
            report.duration = elapsed;
            report
        })
    }

    async fn run_logged(&self, cancel: &CancellationToken) {
        match self.run_once(cancel).await {
            Ok(report) if report.candidates == 0 => {
                tracing::debug!("Trash retention: no campaigns to purge");
            }
            Ok(report) => {
                tracing::info!(
                    candidates = report.candidates,
                    purged = report.purged,
                    skipped = report.skipped,
                    failed = report.failed,
                    would_purge = report.would_purge,
                    duration_ms = report.duration.as_millis() as u64,
                    "Trash retention cycle complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Trash retention cycle failed");
            }
        }
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, RetentionError> {
        let cutoff = self.cutoff(Utc::now())?;
        tracing::debug!(cutoff = %cutoff, "Trash retention: looking for purge candidates");

        let candidates = self
            .service
            .list_purge_candidates(cutoff, self.config.batch_size)
            .await
            .map_err(RetentionError::ListCandidates)?;

        let mut report = CycleReport::new(cutoff, candidates.len());
        if candidates.is_empty() {
            return Ok(report);
        }

        tracing::info!(count = candidates.len(), "Trash retention: found campaigns to purge");

        let service = &self.service;
        let result = self
            .purge_batch(&mut report, candidates, cancel, move |id| {
                service.system_purge(id)
            })
            .await;
        record_outcomes(&report);
        result?;

        if report.failed > 0 && report.purged == 0 && report.skipped == 0 {
            return Err(RetentionError::AllFailed {
                failed: report.failed,
            });
        }

        Ok(report)
    }

    /// Purge `candidates` one at a time, checking for cancellation before each.
    async fn purge_batch<F, Fut>(
        &self,
        report: &mut CycleReport,
        candidates: Vec<Uuid>,
        cancel: &CancellationToken,
        mut purge: F,
    ) -> Result<(), RetentionError>
    where
        F: FnMut(Uuid) -> Fut,
        Fut: Future<Output = Result<SystemPurgeOutcome, LifecycleError>>,
    {
        let total = candidates.len();

        for (processed, campaign_id) in candidates.into_iter().enumerate() {
            if cancel.is_cancelled() || self.stop.is_cancelled() {
                tracing::warn!(processed, total, "Trash retention cycle cancelled");
                return Err(RetentionError::Cancelled { processed, total });
            }

            if self.config.dry_run {
                tracing::info!(campaign_id = %campaign_id, "DRY RUN: Would purge campaign");
                report.would_purge += 1;
                continue;
            }

            match purge(campaign_id).await {
                Ok(SystemPurgeOutcome::Purged) => report.purged += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        campaign_id = %campaign_id,
                        error = %e,
                        "Trash retention: failed to purge campaign"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(())
    }
}

fn record_outcomes(report: &CycleReport) {
    for (outcome, count) in [
        ("purged", report.purged),
        ("skipped", report.skipped),
        ("failed", report.failed),
        ("would_purge", report.would_purge),
    ] {
        if count > 0 {
            metrics::record_retention_purge(outcome, count as u64);
        }
    }
}
