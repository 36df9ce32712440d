//! Durable failure audit log

use libsql::{Connection, Row};

use crate::error::{Error, Result};
use crate::models::{ExceptionLogEntry, ExceptionLogId};
use crate::util::{from_unix_ms, to_unix_ms};

/// libSQL-backed exception log
pub struct LibSqlExceptionLog<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlExceptionLog<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist one entry
    pub async fn record(&self, entry: &ExceptionLogEntry) -> Result<()> {
        let context = serde_json::to_string(&entry.context)?;
        self.conn
            .execute(
                "INSERT INTO exception_log_entries (id, archiver_id, created_at, message, context, trace)
                 VALUES (?, ?, ?, ?, ?, ?)",
                libsql::params![
                    entry.id.to_string(),
                    entry.archiver_id.clone(),
                    to_unix_ms(entry.created_at),
                    entry.message.clone(),
                    context,
                    entry.trace.clone()
                ],
            )
            .await?;
        Ok(())
    }

    /// Most recent entries first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ExceptionLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, archiver_id, created_at, message, context, trace
                 FROM exception_log_entries
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?",
                [limit],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    fn parse_entry(row: &Row) -> Result<ExceptionLogEntry> {
        let id: String = row.get(0)?;
        let id = id
            .parse::<ExceptionLogId>()
            .map_err(|e| Error::Database(format!("Invalid exception log id '{id}': {e}")))?;
        let context: String = row.get(4)?;

        Ok(ExceptionLogEntry {
            id,
            archiver_id: row.get(1)?,
            created_at: from_unix_ms(row.get::<i64>(2)?),
            message: row.get(3)?,
            context: serde_json::from_str(&context)?,
            trace: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_list_recent() {
        let db = Database::open_in_memory().await.unwrap();
        let log = LibSqlExceptionLog::new(db.connection());

        let mut first = ExceptionLogEntry::new(
            Some("a1".to_string()),
            "Archive API error: locked",
            json!({"item": {"id": "fo-1"}}),
            "Archive API error: locked",
        );
        first.created_at = first.created_at - chrono::Duration::minutes(5);
        let second = ExceptionLogEntry::new(None, "Connectivity error", json!({}), "trace");

        log.record(&first).await.unwrap();
        log.record(&second).await.unwrap();

        let entries = log.list_recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, second.id);
        assert_eq!(entries[1].context, json!({"item": {"id": "fo-1"}}));
        assert_eq!(entries[1].archiver_id.as_deref(), Some("a1"));

        assert_eq!(log.list_recent(1).await.unwrap().len(), 1);
    }
}
