//! Records-management archive access.
//!
//! [`ArchiveApi`] is the remote-procedure boundary of the archive.
//! [`ArchiveClient`] layers identity-aware case file resolution and the
//! draft/final protocol for replacing document content on top of it.

mod edoc;
mod format;
pub mod template;

use tokio::sync::OnceCell;

use crate::db::IdentityMap;
use crate::error::{Error, Result};
use crate::models::{
    ArchiveCaseFile, ArchiveDocument, ArchiveFormat, CaseFileRequest, DocumentPayload,
    DocumentStatus, StatusCodes,
};

pub use edoc::EdocClient;
pub use format::ArchiveFormatResolver;

/// Case file search criteria; unset fields are not constrained
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFileSearch {
    pub case_file_id: Option<String>,
    pub sequence_number: Option<String>,
    pub title: Option<String>,
}

/// Document settings applied by `update_document_settings`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSettings {
    pub status_code: i64,
    pub type_reference: i64,
}

impl DocumentSettings {
    pub const fn for_status(codes: &StatusCodes, status: DocumentStatus) -> Self {
        Self {
            status_code: codes.code(status),
            type_reference: codes.type_reference(status),
        }
    }
}

/// Archive operations (async)
///
/// Non-success archive responses surface as
/// [`Error::ArchiveApi`](crate::Error::ArchiveApi).
#[allow(async_fn_in_trait)]
pub trait ArchiveApi {
    async fn search_case_files(&self, criteria: &CaseFileSearch) -> Result<Vec<ArchiveCaseFile>>;

    async fn create_case_file(&self, request: &CaseFileRequest) -> Result<ArchiveCaseFile>;

    /// Create a document with its first version
    async fn create_document_and_version(
        &self,
        case_file: &ArchiveCaseFile,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument>;

    /// Add a version to an existing document, superseding its content
    async fn create_document_version(
        &self,
        document: &ArchiveDocument,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument>;

    async fn update_document_settings(
        &self,
        document: &ArchiveDocument,
        settings: DocumentSettings,
    ) -> Result<()>;

    /// Delete a document, returning the archive's status code
    async fn delete_document(&self, document_id: &str) -> Result<u16>;

    async fn archive_formats(&self) -> Result<Vec<ArchiveFormat>>;
}

/// Identity-aware archive client
pub struct ArchiveClient<A> {
    api: A,
    status_codes: StatusCodes,
    formats: OnceCell<ArchiveFormatResolver>,
}

impl<A: ArchiveApi> ArchiveClient<A> {
    pub fn new(api: A, status_codes: StatusCodes) -> Self {
        Self {
            api,
            status_codes,
            formats: OnceCell::new(),
        }
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    pub const fn status_codes(&self) -> &StatusCodes {
        &self.status_codes
    }

    /// Archive formats, fetched once per client
    pub async fn format_resolver(&self) -> Result<&ArchiveFormatResolver> {
        self.formats
            .get_or_try_init(|| async {
                let formats = self.api.archive_formats().await?;
                tracing::debug!(count = formats.len(), "Loaded archive formats");
                Ok(ArchiveFormatResolver::new(formats))
            })
            .await
    }

    /// Resolve the case file recorded for `request.remote_item_id`, creating
    /// and recording one when absent. Existing case files are never updated.
    pub async fn get_or_create_case_file(
        &self,
        identity: &impl IdentityMap,
        archiver_id: &str,
        request: &CaseFileRequest,
    ) -> Result<ArchiveCaseFile> {
        if let Some(record) = identity
            .find_case_file(archiver_id, &request.remote_item_id)
            .await?
        {
            let criteria = CaseFileSearch {
                case_file_id: Some(record.case_file_id.clone()),
                ..CaseFileSearch::default()
            };
            let mut found = self.api.search_case_files(&criteria).await?;
            if found.len() == 1 {
                return Ok(found.remove(0));
            }
            tracing::warn!(
                archiver = archiver_id,
                item_id = %request.remote_item_id,
                case_file = %record.case_file_id,
                "Recorded case file not found in archive; creating a new one"
            );
        }

        let case_file = self.api.create_case_file(request).await?;
        identity
            .record_case_file(archiver_id, &request.remote_item_id, &case_file.id)
            .await?;
        tracing::info!(
            archiver = archiver_id,
            item_id = %request.remote_item_id,
            case_file = %case_file.id,
            title = %case_file.title,
            "Created case file"
        );
        Ok(case_file)
    }

    /// The single case file with this sequence number, if exactly one exists
    pub async fn find_case_file_by_sequence_number(
        &self,
        sequence_number: &str,
    ) -> Result<Option<ArchiveCaseFile>> {
        let criteria = CaseFileSearch {
            sequence_number: Some(sequence_number.to_string()),
            ..CaseFileSearch::default()
        };
        let mut found = self.api.search_case_files(&criteria).await?;
        Ok(if found.len() == 1 {
            Some(found.remove(0))
        } else {
            None
        })
    }

    /// Create a document with its first version under `case_file`
    pub async fn create_document_version(
        &self,
        case_file: &ArchiveCaseFile,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument> {
        let document = self
            .api
            .create_document_and_version(case_file, payload)
            .await?;
        tracing::info!(
            case_file = %case_file.id,
            document = %document.id,
            title = %document.title,
            "Created document"
        );
        Ok(document)
    }

    /// Replace a document's content with a new version.
    ///
    /// The document is set to draft first and back to final afterwards, even
    /// when the replacement fails. Failures of either toggle are logged only.
    pub async fn update_document_version(
        &self,
        document: &ArchiveDocument,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument> {
        if let Err(error) = self.set_draft(document).await {
            tracing::warn!(document = %document.id, %error, "Failed to set document to draft");
        }

        let replaced = self.api.create_document_version(document, payload).await;

        if let Err(error) = self.set_final(document).await {
            tracing::error!(document = %document.id, %error, "Failed to set document to final");
        }

        let updated = replaced?;
        tracing::info!(
            document = %updated.id,
            version = %updated.version_id,
            "Created document version"
        );
        Ok(updated)
    }

    pub async fn set_draft(&self, document: &ArchiveDocument) -> Result<()> {
        self.api
            .update_document_settings(
                document,
                DocumentSettings::for_status(&self.status_codes, DocumentStatus::Draft),
            )
            .await
    }

    pub async fn set_final(&self, document: &ArchiveDocument) -> Result<()> {
        self.api
            .update_document_settings(
                document,
                DocumentSettings::for_status(&self.status_codes, DocumentStatus::Final),
            )
            .await
    }

    /// Delete a document; a non-success status is logged and returned
    pub async fn delete_document(&self, document_id: &str) -> Result<u16> {
        let status = self.api.delete_document(document_id).await?;
        if (200..300).contains(&status) {
            tracing::info!(document = document_id, status, "Deleted document");
        } else {
            tracing::warn!(
                document = document_id,
                status,
                "Unexpected status deleting document"
            );
        }
        Ok(status)
    }

    /// Resolve a format code, failing when neither type nor name is known
    pub async fn resolve_format(
        &self,
        declared_type: Option<&str>,
        file_name: &str,
    ) -> Result<String> {
        self.format_resolver()
            .await?
            .resolve(declared_type, file_name)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "No archive format for type {declared_type:?} / file {file_name}"
                ))
            })
    }
}
