//! Per-archiver sweep watermarks

use chrono::{DateTime, Utc};
use libsql::Connection;

use crate::error::Result;
use crate::util::{from_unix_ms, to_unix_ms};

/// Watermark persistence (async)
#[allow(async_fn_in_trait)]
pub trait WatermarkStore {
    /// Timestamp of the last completed sweep, if any
    async fn get(&self, archiver_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Store the watermark for an archiver
    async fn set(&self, archiver_id: &str, value: DateTime<Utc>) -> Result<()>;
}

/// libSQL implementation of `WatermarkStore`
pub struct LibSqlWatermarkStore<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlWatermarkStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl WatermarkStore for LibSqlWatermarkStore<'_> {
    async fn get(&self, archiver_id: &str) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_run_at FROM watermarks WHERE archiver_id = ?",
                [archiver_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(from_unix_ms(row.get::<i64>(0)?))),
            None => Ok(None),
        }
    }

    async fn set(&self, archiver_id: &str, value: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO watermarks (archiver_id, last_run_at) VALUES (?, ?)
                 ON CONFLICT (archiver_id) DO UPDATE SET last_run_at = excluded.last_run_at",
                libsql::params![archiver_id.to_string(), to_unix_ms(value)],
            )
            .await?;
        tracing::debug!(archiver = archiver_id, watermark = %value, "Stored watermark");
        Ok(())
    }
}
