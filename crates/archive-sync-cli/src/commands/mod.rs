pub mod archive;
pub mod case_documents;
pub mod common;
pub mod failures;
pub mod upload;
pub mod watermark;
