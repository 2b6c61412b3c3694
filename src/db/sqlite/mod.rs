mod audit_logs;
mod campaigns;
mod common;

pub use audit_logs::SqliteAuditLogRepo;
pub use campaigns::{SqliteCampaignRepo, SqliteLifecycleTx};
