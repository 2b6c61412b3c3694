//! Prometheus metrics for the campaign lifecycle.
//!
//! Provides metrics for:
//! - Lifecycle transitions (soft delete, restore, purge) and their outcomes
//! - Audit ledger write failures by tolerance policy
//! - Retention scheduler cycles and per-campaign purge outcomes

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
///
/// With `listen_address` set, a scrape endpoint is spawned on the current
/// Tokio runtime. Otherwise the recorder is installed and metrics can be
/// rendered on demand with [`render_metrics`].
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &seconds_from_ms(&config.duration_buckets_ms),
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = match config.listen_address {
        Some(addr) => {
            builder = builder.with_http_listener(addr);
            let (recorder, exporter) = builder.build()?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| MetricsError::Setup(e.to_string()))?;
            tokio::spawn(async move {
                if exporter.await.is_err() {
                    tracing::error!("Prometheus scrape endpoint stopped");
                }
            });
            tracing::info!(address = %addr, "Prometheus scrape endpoint listening");
            handle
        }
        None => builder.install_recorder()?,
    };

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Convert millisecond buckets to seconds.
#[cfg(feature = "prometheus")]
fn seconds_from_ms(ms_buckets: &[f64]) -> Vec<f64> {
    ms_buckets.iter().map(|ms| ms / 1000.0).collect()
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render the current metrics in Prometheus text format.
///
/// Returns `None` when no recorder is installed.
pub fn render_metrics() -> Option<String> {
    #[cfg(feature = "prometheus")]
    {
        get_prometheus_handle().map(|handle| handle.render())
    }
    #[cfg(not(feature = "prometheus"))]
    {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record a lifecycle transition attempt.
///
/// # Arguments
/// * `action` - "soft_delete", "restore", "purge" or "system_purge"
/// * `outcome` - "success", "noop" or an error kind such as "not_found"
pub fn record_lifecycle_transition(action: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "campaign_lifecycle_transitions_total",
            "action" => action.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (action, outcome);
    }
}

/// Record an audit entry that could not be written.
pub fn record_audit_write_failure(action: &str, policy: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "campaign_audit_write_failures_total",
            "action" => action.to_string(),
            "policy" => policy.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (action, policy);
    }
}

/// Record per-campaign outcomes from a retention cycle.
///
/// # Arguments
/// * `outcome` - "purged", "already_purged", "restored", "failed" or "would_purge"
/// * `count` - Number of campaigns with that outcome
pub fn record_retention_purge(outcome: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "campaign_retention_purges_total",
            "outcome" => outcome.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (outcome, count);
    }
}

/// Record a completed retention cycle.
///
/// # Arguments
/// * `status` - "success", "partial", "failed", "timed_out" or "cancelled"
/// * `duration_secs` - Wall time of the cycle
pub fn record_retention_cycle(status: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "campaign_retention_cycles_total",
            "status" => status.to_string()
        )
        .increment(1);

        histogram!("campaign_retention_cycle_duration_seconds").record(duration_secs);

        gauge!("campaign_retention_last_cycle_timestamp_seconds")
            .set(chrono::Utc::now().timestamp() as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (status, duration_secs);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
