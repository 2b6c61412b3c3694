mod audit_logs;
mod campaigns;

pub use audit_logs::*;
pub use campaigns::*;
use chrono::{DateTime, Utc};

/// Truncate a DateTime to millisecond precision.
///
/// SQLite stores timestamps as TEXT and compares them as strings, and
/// Postgres keeps microseconds. Truncating before every write keeps
/// values read back from either backend equal to the values written and
/// keeps range comparisons such as `deleted_at < cutoff` consistent.
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// Clamp caller-supplied pagination to sane bounds.
pub(crate) fn clamp_page(offset: i64, limit: i64) -> (i64, i64) {
    (offset.max(0), limit.clamp(1, 1000))
}
