use std::path::Path;

use archive_sync_core::config::ArchiverConfig;
use archive_sync_core::db::{LibSqlWatermarkStore, WatermarkStore};

use crate::commands::common::{open_database, CommandContext};
use crate::error::CliError;

pub async fn run_watermark(archiver_path: &Path, context: &CommandContext) -> Result<(), CliError> {
    let archiver = ArchiverConfig::load(archiver_path)?;
    let db = open_database(&context.db_path).await?;

    match LibSqlWatermarkStore::new(db.connection())
        .get(&archiver.id)
        .await?
    {
        Some(watermark) => println!("{}", watermark.to_rfc3339()),
        None => println!("No watermark recorded for {}", archiver.id),
    }
    Ok(())
}
