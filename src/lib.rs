//! Trash lifecycle for phishing-simulation campaigns.
//!
//! - [`services::CampaignLifecycleService`] soft-deletes, restores and purges
//!   campaigns inside locked transactions, writing to the audit ledger.
//! - [`retention::TrashRetentionJob`] purges campaigns that stayed in the
//!   trash past the retention window.

pub mod config;
pub mod db;
pub mod models;
pub mod observability;
pub mod retention;
pub mod services;
