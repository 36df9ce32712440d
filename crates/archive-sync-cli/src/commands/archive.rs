use std::path::Path;

use archive_sync_core::config::ArchiverKind;
use archive_sync_core::engine::SweepContext;
use archive_sync_core::remote::{RemoteTreeFetcher, ShareFileClient};

use crate::commands::common::{
    build_engine, load_archiver, open_database, print_report, CommandContext,
};
use crate::error::CliError;

pub async fn run_archive(
    archiver_path: &Path,
    item: Option<&str>,
    as_json: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let archiver = load_archiver(archiver_path, ArchiverKind::ShareFileToEdoc)?;
    let db = open_database(&context.db_path).await?;
    let engine = build_engine(&db, &archiver, &context.config)?;
    let fetcher = RemoteTreeFetcher::new(ShareFileClient::new(
        archiver.sharefile()?.clone(),
        context.config.http_timeout,
    )?);

    let ctx = SweepContext::new(&archiver);
    let report = match item {
        Some(hearing_id) => engine.sweep_hearing(&ctx, &fetcher, hearing_id).await?,
        None => engine.sweep_hearings(&ctx, &fetcher).await?,
    };
    print_report(&report, as_json)
}
