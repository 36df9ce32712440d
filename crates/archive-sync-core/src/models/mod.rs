//! Data models for archive-sync

mod archive;
mod case_document;
mod exception_log;
mod remote_item;
mod sync_record;

pub use archive::{
    ArchiveCaseFile, ArchiveDocument, ArchiveFormat, CaseFileRequest, DocumentPayload,
    DocumentStatus, StatusCodes,
};
pub use case_document::{SourceCase, SourceDocument, SourceVersion};
pub use exception_log::{ExceptionLogEntry, ExceptionLogId};
pub use remote_item::{Correlation, ItemKind, Metadata, RemoteItem};
pub use sync_record::{CaseFileRecord, SyncRecord, VersionKey};
