//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;
    if version >= CURRENT_VERSION {
        return Ok(());
    }

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Apply a list of statements atomically
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [i64::from(version)],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: identity map and watermarks
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS sync_records (
                archiver_id TEXT NOT NULL,
                remote_item_id TEXT NOT NULL,
                document_identifier TEXT NOT NULL,
                version_identifier TEXT NOT NULL,
                case_file_id TEXT NOT NULL,
                archive_document_id TEXT NOT NULL,
                archive_version_id TEXT NOT NULL,
                last_synced_at INTEGER NOT NULL,
                PRIMARY KEY (archiver_id, document_identifier, version_identifier)
            )",
            "CREATE TABLE IF NOT EXISTS case_file_records (
                archiver_id TEXT NOT NULL,
                remote_item_id TEXT NOT NULL,
                case_file_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (archiver_id, remote_item_id)
            )",
            "CREATE TABLE IF NOT EXISTS watermarks (
                archiver_id TEXT PRIMARY KEY,
                last_run_at INTEGER NOT NULL
            )",
        ],
    )
    .await
}

/// Migration to version 2: durable failure audit log
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS exception_log_entries (
                id TEXT PRIMARY KEY,
                archiver_id TEXT,
                created_at INTEGER NOT NULL,
                message TEXT NOT NULL,
                context TEXT NOT NULL,
                trace TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_exception_log_created
                ON exception_log_entries(created_at DESC)",
        ],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_create_state_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in [
            "sync_records",
            "case_file_records",
            "watermarks",
            "exception_log_entries",
        ] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }
}
