//! Sync identity records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ArchiveDocument;

/// Persisted mapping from a remote item version to its archive document.
///
/// Unique per `(archiver_id, document_identifier, version_identifier)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Archiver that owns the record
    pub archiver_id: String,
    /// Remote item the archive document was produced from
    pub remote_item_id: String,
    /// Logical document identifier (shared by a primary file and its attachments)
    pub document_identifier: String,
    /// Version identifier within the logical document
    pub version_identifier: String,
    /// Archive case file holding the document
    pub case_file_id: String,
    /// Archive document identifier
    pub archive_document_id: String,
    /// Archive document version identifier
    pub archive_version_id: String,
    /// Start of the sweep that last created or updated the version
    pub last_synced_at: DateTime<Utc>,
}

impl SyncRecord {
    /// Rebuild the archive document handle this record points at.
    #[must_use]
    pub fn archive_document(&self, title: impl Into<String>, status_code: i64) -> ArchiveDocument {
        ArchiveDocument {
            id: self.archive_document_id.clone(),
            case_file_id: self.case_file_id.clone(),
            version_id: self.archive_version_id.clone(),
            title: title.into(),
            status_code,
        }
    }

    /// Whether a remote change at `changed_at` is strictly newer than this record.
    #[must_use]
    pub fn is_outdated_by(&self, changed_at: DateTime<Utc>) -> bool {
        changed_at > self.last_synced_at
    }
}

/// Identity of a remote document version being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey {
    pub remote_item_id: String,
    pub document_identifier: String,
    pub version_identifier: String,
}

impl VersionKey {
    /// Key for a remote item that is its own single-version document.
    #[must_use]
    pub fn single(remote_item_id: impl Into<String>) -> Self {
        let remote_item_id = remote_item_id.into();
        Self {
            document_identifier: remote_item_id.clone(),
            version_identifier: remote_item_id.clone(),
            remote_item_id,
        }
    }
}

/// Persisted mapping from a remote root item to its archive case file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFileRecord {
    pub archiver_id: String,
    pub remote_item_id: String,
    pub case_file_id: String,
    pub created_at: DateTime<Utc>,
}
