//! Persisted sync state for archive-sync

mod connection;
mod exception_log;
mod identity_map;
mod migrations;
mod watermark;

pub use connection::Database;
pub use exception_log::LibSqlExceptionLog;
pub use identity_map::{IdentityMap, LibSqlIdentityMap};
pub use watermark::{LibSqlWatermarkStore, WatermarkStore};
