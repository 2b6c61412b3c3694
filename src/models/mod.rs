mod audit_log;
mod campaign;

pub use audit_log::*;
pub use campaign::*;
