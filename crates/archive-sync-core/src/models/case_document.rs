//! Case documents read from the property/case-management system

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A case in the property/case-management system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCase {
    /// Case sequence number shared with the archive
    pub sequence_number: String,
    /// Case title
    pub title: String,
    /// Whether the case is completed
    #[serde(default)]
    pub completed: bool,
    /// Property reference (e.g. portal guid), when known
    #[serde(default)]
    pub property_reference: Option<String>,
}

/// A document (primary or attachment) on a source case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Stable document identifier
    pub document_identifier: String,
    /// Document number (e.g. `22-000123-4`)
    pub document_number: String,
    /// Document title, usually a file name
    pub title: String,
    /// Raw status code; drafts are never synced
    pub status_code: i64,
    /// Current version; absent when the document has no files
    #[serde(default)]
    pub version_identifier: Option<String>,
    /// Document date as declared by the source
    #[serde(default)]
    pub document_date: Option<DateTime<Utc>>,
    /// Last change time
    pub last_changed_at: DateTime<Utc>,
}

impl SourceDocument {
    /// Snapshot for failure context.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "document_identifier": self.document_identifier,
            "document_number": self.document_number,
            "title": self.title,
            "status_code": self.status_code,
            "version_identifier": self.version_identifier,
        })
    }

    /// Trailing act number of the document number (`…-4` → 4), defaulting to 1.
    #[must_use]
    pub fn act_number(&self) -> u32 {
        self.document_number
            .rsplit_once('-')
            .and_then(|(_, tail)| tail.parse().ok())
            .unwrap_or(1)
    }
}

/// A document version with its binary content
#[derive(Clone, PartialEq, Eq)]
pub struct SourceVersion {
    pub version_identifier: String,
    /// Declared archive format code or mime type, if any
    pub declared_type: Option<String>,
    /// File extension of the stored content, if any
    pub file_extension: Option<String>,
    pub contents: Vec<u8>,
}

impl fmt::Debug for SourceVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SourceVersion")
            .field("version_identifier", &self.version_identifier)
            .field("declared_type", &self.declared_type)
            .field("file_extension", &self.file_extension)
            .field("contents", &format_args!("[{} bytes]", self.contents.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn document(number: &str) -> SourceDocument {
        SourceDocument {
            document_identifier: "d-1".to_string(),
            document_number: number.to_string(),
            title: "plan.pdf".to_string(),
            status_code: 6,
            version_identifier: Some("v-1".to_string()),
            document_date: None,
            last_changed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn act_number_reads_trailing_counter() {
        assert_eq!(document("22-000123-4").act_number(), 4);
        assert_eq!(document("22-000123-x").act_number(), 1);
        assert_eq!(document("plain").act_number(), 1);
    }
}
