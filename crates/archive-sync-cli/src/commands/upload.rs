use std::path::Path;

use archive_sync_core::config::ArchiverConfig;
use archive_sync_core::remote::{RemoteTreeFetcher, ShareFileClient, UploadOptions};

use crate::commands::common::CommandContext;
use crate::error::CliError;

pub fn upload_file_name(path: &Path) -> Result<String, CliError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| CliError::InvalidPath(path.display().to_string()))
}

pub async fn run_upload(
    archiver_path: &Path,
    folder_id: &str,
    path: &Path,
    overwrite: bool,
    notify: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let archiver = ArchiverConfig::load(archiver_path)?;
    let file_name = upload_file_name(path)?;
    let contents = std::fs::read(path)?;

    let fetcher = RemoteTreeFetcher::new(ShareFileClient::new(
        archiver.sharefile()?.clone(),
        context.config.http_timeout,
    )?);
    fetcher
        .upload_file(folder_id, &file_name, contents, UploadOptions { overwrite, notify })
        .await?;
    println!("Uploaded {file_name} to {folder_id}");
    Ok(())
}
