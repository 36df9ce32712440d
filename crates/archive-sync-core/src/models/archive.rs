//! Archive entity models

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Case file owned by the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCaseFile {
    /// Archive case file identifier
    pub id: String,
    /// Case title
    pub title: String,
    /// Human-facing case sequence number (e.g. `22-000123`)
    pub sequence_number: String,
    /// Owning organisation reference, when set
    pub organisation_reference: Option<String>,
}

/// Document (and its current version) owned by the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDocument {
    /// Archive document identifier
    pub id: String,
    /// Case file the document belongs to
    pub case_file_id: String,
    /// Current document version identifier
    pub version_id: String,
    /// Document title
    pub title: String,
    /// Raw archive status code (see [`DocumentStatus`])
    pub status_code: i64,
}

/// Named document states.
///
/// The numeric codes are archive-specific and come from configuration
/// (see [`StatusCodes`]); a document must be [`DocumentStatus::Draft`] while
/// its binary content is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Final,
}

/// Mapping between [`DocumentStatus`] and archive codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusCodes {
    /// Status code for drafts ("Kladde")
    #[serde(default = "default_draft_code")]
    pub draft: i64,
    /// Status code for final documents ("Endelig")
    #[serde(rename = "final", default = "default_final_code")]
    pub final_code: i64,
    /// Document type reference applied while in draft ("Notat")
    #[serde(default = "default_draft_type_reference")]
    pub draft_type_reference: i64,
    /// Document type reference applied when finalised ("Indgående dokument")
    #[serde(default = "default_final_type_reference")]
    pub final_type_reference: i64,
}

const fn default_draft_code() -> i64 {
    1
}

const fn default_final_code() -> i64 {
    6
}

const fn default_draft_type_reference() -> i64 {
    60005
}

const fn default_final_type_reference() -> i64 {
    110
}

impl Default for StatusCodes {
    fn default() -> Self {
        Self {
            draft: default_draft_code(),
            final_code: default_final_code(),
            draft_type_reference: default_draft_type_reference(),
            final_type_reference: default_final_type_reference(),
        }
    }
}

impl StatusCodes {
    /// Archive code for a status.
    #[must_use]
    pub const fn code(&self, status: DocumentStatus) -> i64 {
        match status {
            DocumentStatus::Draft => self.draft,
            DocumentStatus::Final => self.final_code,
        }
    }

    /// Document type reference applied together with a status.
    #[must_use]
    pub const fn type_reference(&self, status: DocumentStatus) -> i64 {
        match status {
            DocumentStatus::Draft => self.draft_type_reference,
            DocumentStatus::Final => self.final_type_reference,
        }
    }

    /// Named status for a raw code; unknown codes yield `None`.
    #[must_use]
    pub const fn status(&self, code: i64) -> Option<DocumentStatus> {
        if code == self.draft {
            Some(DocumentStatus::Draft)
        } else if code == self.final_code {
            Some(DocumentStatus::Final)
        } else {
            None
        }
    }

    /// Whether a raw code denotes a draft.
    #[must_use]
    pub const fn is_draft(&self, code: i64) -> bool {
        matches!(self.status(code), Some(DocumentStatus::Draft))
    }
}

/// Archive format known to the archive (code plus matching mime type / extension)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFormat {
    pub code: String,
    pub mime_type: Option<String>,
    pub file_extension: Option<String>,
}

/// Content and descriptive fields for a new document version.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentPayload {
    /// Rendered document title
    pub title: String,
    /// Archive format code for the binary content
    pub archive_format_code: String,
    /// Binary content
    pub contents: Vec<u8>,
    /// Organisation reference applied on create
    pub organisation_reference: Option<String>,
}

impl DocumentPayload {
    /// Snapshot for logs and failure context; binary content is reduced to its size.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "title": self.title,
            "archive_format_code": self.archive_format_code,
            "content_bytes": self.contents.len(),
            "organisation_reference": self.organisation_reference,
        })
    }
}

impl fmt::Debug for DocumentPayload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DocumentPayload")
            .field("title", &self.title)
            .field("archive_format_code", &self.archive_format_code)
            .field("contents", &format_args!("[{} bytes]", self.contents.len()))
            .field("organisation_reference", &self.organisation_reference)
            .finish()
    }
}

/// Identity and template data for a case file to resolve or create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFileRequest {
    /// Remote identity the case file is correlated with
    pub remote_item_id: String,
    /// Rendered case file title
    pub title: String,
    /// Organisation reference applied on create
    pub organisation_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_default_mapping() {
        let codes = StatusCodes::default();
        assert_eq!(codes.code(DocumentStatus::Draft), 1);
        assert_eq!(codes.code(DocumentStatus::Final), 6);
        assert_eq!(codes.status(6), Some(DocumentStatus::Final));
        assert_eq!(codes.status(3), None);
        assert!(codes.is_draft(1));
    }

    #[test]
    fn status_codes_deserialize_with_partial_overrides() {
        let codes: StatusCodes = serde_json::from_str(r#"{"final": 5}"#).unwrap();
        assert_eq!(codes.final_code, 5);
        assert_eq!(codes.draft, 1);
        assert_eq!(codes.final_type_reference, 110);
    }

    #[test]
    fn payload_debug_hides_contents() {
        let payload = DocumentPayload {
            title: "HS1".to_string(),
            archive_format_code: "PDF".to_string(),
            contents: b"secret bytes".to_vec(),
            organisation_reference: None,
        };
        let debug = format!("{payload:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[12 bytes]"));
        assert_eq!(payload.snapshot()["content_bytes"], 12);
    }
}
