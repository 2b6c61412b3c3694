mod audit_logs;
mod campaigns;

pub use audit_logs::PostgresAuditLogRepo;
pub use campaigns::{PostgresCampaignRepo, PostgresLifecycleTx};
