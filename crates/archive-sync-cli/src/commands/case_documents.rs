use std::path::Path;

use archive_sync_core::config::ArchiverKind;
use archive_sync_core::engine::{
    load_skip_list, CaseDocumentOptions, PropertyCaseClient, SweepContext,
};

use crate::commands::common::{
    build_engine, load_archiver, open_database, print_report, CommandContext,
};
use crate::error::CliError;

pub fn case_document_options(
    case: Option<String>,
    document: Option<String>,
    skip_list: Option<&Path>,
    include_completed: bool,
) -> Result<CaseDocumentOptions, CliError> {
    let skip_cases = match skip_list {
        Some(path) => load_skip_list(path)?,
        None => Default::default(),
    };
    Ok(CaseDocumentOptions {
        case_sequence_number: case.map(|value| value.trim().to_string()),
        document_number: document.map(|value| value.trim().to_string()),
        skip_cases,
        include_completed,
    })
}

pub async fn run_case_documents(
    archiver_path: &Path,
    case: Option<String>,
    document: Option<String>,
    skip_list: Option<&Path>,
    include_completed: bool,
    as_json: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let archiver = load_archiver(archiver_path, ArchiverKind::CaseDocuments)?;
    let options = case_document_options(case, document, skip_list, include_completed)?;
    let db = open_database(&context.db_path).await?;
    let engine = build_engine(&db, &archiver, &context.config)?;
    let source = PropertyCaseClient::new(archiver.case_documents()?, context.config.http_timeout)?;

    let ctx = SweepContext::new(&archiver);
    let report = engine
        .sweep_case_documents(&ctx, &source, &options)
        .await?;
    print_report(&report, as_json)
}
