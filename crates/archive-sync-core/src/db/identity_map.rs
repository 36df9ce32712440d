//! Identity map between remote items and archive documents

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use libsql::{Connection, Row};

use crate::error::{Error, Result};
use crate::models::{ArchiveDocument, CaseFileRecord, SyncRecord, VersionKey};
use crate::util::{from_unix_ms, to_unix_ms};

/// Persisted identity lookups used by the reconciliation engine (async)
///
/// Lookups return `Ok(None)` for "not synced yet"; errors are reserved for
/// storage failures.
#[allow(async_fn_in_trait)]
pub trait IdentityMap {
    /// Find the record for one document version
    async fn find(
        &self,
        archiver_id: &str,
        document_identifier: &str,
        version_identifier: &str,
    ) -> Result<Option<SyncRecord>>;

    /// Persist a record after a successful archive create
    async fn record_created(
        &self,
        archiver_id: &str,
        key: &VersionKey,
        document: &ArchiveDocument,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncRecord>;

    /// Refresh a record after a successful archive update
    async fn record_updated(
        &self,
        archiver_id: &str,
        key: &VersionKey,
        document: &ArchiveDocument,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncRecord>;

    /// Records of a document whose version is not in `current_version_ids`
    async fn list_stale(
        &self,
        archiver_id: &str,
        document_identifier: &str,
        current_version_ids: &HashSet<String>,
    ) -> Result<Vec<SyncRecord>>;

    /// Remove a record once its archive document is gone
    async fn remove(&self, record: &SyncRecord) -> Result<()>;

    /// Find the case file correlated with a remote root item
    async fn find_case_file(
        &self,
        archiver_id: &str,
        remote_item_id: &str,
    ) -> Result<Option<CaseFileRecord>>;

    /// Persist the case file correlated with a remote root item
    async fn record_case_file(
        &self,
        archiver_id: &str,
        remote_item_id: &str,
        case_file_id: &str,
    ) -> Result<CaseFileRecord>;
}

/// libSQL implementation of `IdentityMap`
pub struct LibSqlIdentityMap<'a> {
    conn: &'a Connection,
}

const RECORD_COLUMNS: &str = "archiver_id, remote_item_id, document_identifier, version_identifier,
     case_file_id, archive_document_id, archive_version_id, last_synced_at";

impl<'a> LibSqlIdentityMap<'a> {
    /// Create a new identity map with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Every record of a logical document, oldest first
    pub async fn list_document(
        &self,
        archiver_id: &str,
        document_identifier: &str,
    ) -> Result<Vec<SyncRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sync_records
                     WHERE archiver_id = ? AND document_identifier = ?
                     ORDER BY last_synced_at ASC, version_identifier ASC"
                ),
                [archiver_id, document_identifier],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    fn parse_record(row: &Row) -> Result<SyncRecord> {
        Ok(SyncRecord {
            archiver_id: row.get(0)?,
            remote_item_id: row.get(1)?,
            document_identifier: row.get(2)?,
            version_identifier: row.get(3)?,
            case_file_id: row.get(4)?,
            archive_document_id: row.get(5)?,
            archive_version_id: row.get(6)?,
            last_synced_at: from_unix_ms(row.get::<i64>(7)?),
        })
    }

    fn build_record(
        archiver_id: &str,
        key: &VersionKey,
        document: &ArchiveDocument,
        synced_at: DateTime<Utc>,
    ) -> SyncRecord {
        SyncRecord {
            archiver_id: archiver_id.to_string(),
            remote_item_id: key.remote_item_id.clone(),
            document_identifier: key.document_identifier.clone(),
            version_identifier: key.version_identifier.clone(),
            case_file_id: document.case_file_id.clone(),
            archive_document_id: document.id.clone(),
            archive_version_id: document.version_id.clone(),
            last_synced_at: synced_at,
        }
    }
}

impl IdentityMap for LibSqlIdentityMap<'_> {
    async fn find(
        &self,
        archiver_id: &str,
        document_identifier: &str,
        version_identifier: &str,
    ) -> Result<Option<SyncRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sync_records
                     WHERE archiver_id = ? AND document_identifier = ? AND version_identifier = ?"
                ),
                [archiver_id, document_identifier, version_identifier],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn record_created(
        &self,
        archiver_id: &str,
        key: &VersionKey,
        document: &ArchiveDocument,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncRecord> {
        let record = Self::build_record(archiver_id, key, document, synced_at);

        // A rerun after a crash between archive create and this insert lands here again
        self.conn
            .execute(
                "INSERT INTO sync_records (
                    archiver_id, remote_item_id, document_identifier, version_identifier,
                    case_file_id, archive_document_id, archive_version_id, last_synced_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (archiver_id, document_identifier, version_identifier) DO UPDATE SET
                    remote_item_id = excluded.remote_item_id,
                    case_file_id = excluded.case_file_id,
                    archive_document_id = excluded.archive_document_id,
                    archive_version_id = excluded.archive_version_id,
                    last_synced_at = excluded.last_synced_at",
                libsql::params![
                    record.archiver_id.clone(),
                    record.remote_item_id.clone(),
                    record.document_identifier.clone(),
                    record.version_identifier.clone(),
                    record.case_file_id.clone(),
                    record.archive_document_id.clone(),
                    record.archive_version_id.clone(),
                    to_unix_ms(record.last_synced_at)
                ],
            )
            .await?;

        tracing::debug!(
            archiver = archiver_id,
            document = %record.document_identifier,
            version = %record.version_identifier,
            archive_document = %record.archive_document_id,
            "Recorded created document"
        );
        Ok(record)
    }

    async fn record_updated(
        &self,
        archiver_id: &str,
        key: &VersionKey,
        document: &ArchiveDocument,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncRecord> {
        let record = Self::build_record(archiver_id, key, document, synced_at);

        let rows = self
            .conn
            .execute(
                "UPDATE sync_records
                 SET remote_item_id = ?, case_file_id = ?, archive_document_id = ?,
                     archive_version_id = ?, last_synced_at = ?
                 WHERE archiver_id = ? AND document_identifier = ? AND version_identifier = ?",
                libsql::params![
                    record.remote_item_id.clone(),
                    record.case_file_id.clone(),
                    record.archive_document_id.clone(),
                    record.archive_version_id.clone(),
                    to_unix_ms(record.last_synced_at),
                    record.archiver_id.clone(),
                    record.document_identifier.clone(),
                    record.version_identifier.clone()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!(
                "sync record {}/{} for archiver {archiver_id}",
                record.document_identifier, record.version_identifier
            )));
        }

        Ok(record)
    }

    async fn list_stale(
        &self,
        archiver_id: &str,
        document_identifier: &str,
        current_version_ids: &HashSet<String>,
    ) -> Result<Vec<SyncRecord>> {
        let records = self.list_document(archiver_id, document_identifier).await?;
        Ok(records
            .into_iter()
            .filter(|record| !current_version_ids.contains(&record.version_identifier))
            .collect())
    }

    async fn remove(&self, record: &SyncRecord) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_records
                 WHERE archiver_id = ? AND document_identifier = ? AND version_identifier = ?",
                [
                    record.archiver_id.as_str(),
                    record.document_identifier.as_str(),
                    record.version_identifier.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_case_file(
        &self,
        archiver_id: &str,
        remote_item_id: &str,
    ) -> Result<Option<CaseFileRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT archiver_id, remote_item_id, case_file_id, created_at
                 FROM case_file_records
                 WHERE archiver_id = ? AND remote_item_id = ?",
                [archiver_id, remote_item_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(CaseFileRecord {
                archiver_id: row.get(0)?,
                remote_item_id: row.get(1)?,
                case_file_id: row.get(2)?,
                created_at: from_unix_ms(row.get::<i64>(3)?),
            })),
            None => Ok(None),
        }
    }

    async fn record_case_file(
        &self,
        archiver_id: &str,
        remote_item_id: &str,
        case_file_id: &str,
    ) -> Result<CaseFileRecord> {
        let created_at = Utc::now();
        self.conn
            .execute(
                "INSERT OR REPLACE INTO case_file_records
                    (archiver_id, remote_item_id, case_file_id, created_at)
                 VALUES (?, ?, ?, ?)",
                libsql::params![
                    archiver_id.to_string(),
                    remote_item_id.to_string(),
                    case_file_id.to_string(),
                    to_unix_ms(created_at)
                ],
            )
            .await?;

        Ok(CaseFileRecord {
            archiver_id: archiver_id.to_string(),
            remote_item_id: remote_item_id.to_string(),
            case_file_id: case_file_id.to_string(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn document(id: &str, version: &str) -> ArchiveDocument {
        ArchiveDocument {
            id: id.to_string(),
            case_file_id: "cf-1".to_string(),
            version_id: version.to_string(),
            title: "Response".to_string(),
            status_code: 6,
        }
    }

    fn key(document: &str, version: &str) -> VersionKey {
        VersionKey {
            remote_item_id: format!("item-{version}"),
            document_identifier: document.to_string(),
            version_identifier: version.to_string(),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_find_absent_returns_none() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());
        assert!(map.find("a1", "doc", "v1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_created_and_find() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        let created = map
            .record_created("a1", &key("doc", "v1"), &document("ad-1", "av-1"), at(8))
            .await
            .unwrap();
        let found = map.find("a1", "doc", "v1").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.last_synced_at, at(8));

        // Archiver scoping
        assert!(map.find("a2", "doc", "v1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_created_twice_keeps_single_record() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        map.record_created("a1", &key("doc", "v1"), &document("ad-1", "av-1"), at(8))
            .await
            .unwrap();
        map.record_created("a1", &key("doc", "v1"), &document("ad-2", "av-2"), at(9))
            .await
            .unwrap();

        let records = map.list_document("a1", "doc").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].archive_document_id, "ad-2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_updated_refreshes_version_and_timestamp() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        map.record_created("a1", &key("doc", "v1"), &document("ad-1", "av-1"), at(8))
            .await
            .unwrap();
        map.record_updated("a1", &key("doc", "v1"), &document("ad-1", "av-2"), at(10))
            .await
            .unwrap();

        let found = map.find("a1", "doc", "v1").await.unwrap().unwrap();
        assert_eq!(found.archive_version_id, "av-2");
        assert_eq!(found.last_synced_at, at(10));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_updated_without_record_is_not_found() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        let error = map
            .record_updated("a1", &key("doc", "v1"), &document("ad-1", "av-1"), at(8))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_stale_excludes_current_versions() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        for version in ["v1", "v2"] {
            map.record_created(
                "a1",
                &key("doc", version),
                &document(&format!("ad-{version}"), "av"),
                at(8),
            )
            .await
            .unwrap();
        }
        map.record_created("a1", &key("other", "v9"), &document("ad-x", "av"), at(8))
            .await
            .unwrap();

        let current: HashSet<String> = ["v2".to_string(), "v3".to_string()].into();
        let stale = map.list_stale("a1", "doc", &current).await.unwrap();
        let stale_versions = stale
            .iter()
            .map(|record| record.version_identifier.as_str())
            .collect::<Vec<_>>();
        assert_eq!(stale_versions, vec!["v1"]);

        map.remove(&stale[0]).await.unwrap();
        assert!(map.find("a1", "doc", "v1").await.unwrap().is_none());
        assert!(map.find("a1", "doc", "v2").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_case_file_records() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        assert!(map.find_case_file("a1", "fo-h1").await.unwrap().is_none());
        map.record_case_file("a1", "fo-h1", "cf-7").await.unwrap();

        let found = map.find_case_file("a1", "fo-h1").await.unwrap().unwrap();
        assert_eq!(found.case_file_id, "cf-7");
    }
}
