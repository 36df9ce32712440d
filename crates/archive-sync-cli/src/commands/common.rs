use std::path::{Path, PathBuf};

use archive_sync_core::archive::{ArchiveClient, EdocClient};
use archive_sync_core::config::{AppConfig, ArchiverConfig, ArchiverKind};
use archive_sync_core::db::{Database, LibSqlExceptionLog};
use archive_sync_core::engine::{ReconciliationEngine, SweepReport};
use archive_sync_core::models::ExceptionLogEntry;
use archive_sync_core::notify::{AuditNotificationSink, HttpAlertDispatcher};
use serde::Serialize;

use crate::error::CliError;

const DB_FILE_NAME: &str = "archive-sync.db";

/// Settings shared by every command
pub struct CommandContext {
    pub db_path: PathBuf,
    pub config: AppConfig,
}

pub type CliEngine<'a> = ReconciliationEngine<
    'a,
    EdocClient,
    AuditNotificationSink<'a, Option<HttpAlertDispatcher>>,
>;

#[derive(Debug, Serialize)]
pub struct FailureListItem {
    pub id: String,
    pub archiver_id: Option<String>,
    pub created_at: String,
    pub message: String,
    pub context: serde_json::Value,
}

/// `--db-path` wins over `ARCHIVE_SYNC_DB_PATH`, which wins over the data dir
pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("archive-sync")
        .join(DB_FILE_NAME)
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    tracing::debug!(path = %path.display(), "Opening state database");
    Ok(Database::open(path).await?)
}

/// Load an archiver definition and refuse it unless it is enabled and of `kind`
pub fn load_archiver(path: &Path, kind: ArchiverKind) -> Result<ArchiverConfig, CliError> {
    let archiver = ArchiverConfig::load(path)?;
    archiver.ensure_runnable(kind)?;
    Ok(archiver)
}

pub fn alert_dispatcher(config: &AppConfig) -> Result<Option<HttpAlertDispatcher>, CliError> {
    let Some(endpoint) = config.alert_endpoint.as_deref() else {
        return Ok(None);
    };
    Ok(Some(HttpAlertDispatcher::new(
        endpoint,
        config.alert_token.clone(),
        config.http_timeout,
    )?))
}

pub fn build_engine<'a>(
    db: &'a Database,
    archiver: &ArchiverConfig,
    config: &AppConfig,
) -> Result<CliEngine<'a>, CliError> {
    let edoc = EdocClient::new(archiver.edoc.clone(), config.http_timeout)?;
    let archive = ArchiveClient::new(edoc, archiver.edoc.status_codes);
    let sink = AuditNotificationSink::new(
        LibSqlExceptionLog::new(db.connection()),
        alert_dispatcher(config)?,
    )
    .for_archiver(archiver);
    Ok(ReconciliationEngine::new(db, archive, sink))
}

pub fn print_report(report: &SweepReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", format_report_line(report));
    Ok(())
}

pub fn format_report_line(report: &SweepReport) -> String {
    let watermark = if report.watermark_advanced {
        "advanced"
    } else {
        "unchanged"
    };
    format!(
        "{} root(s): {} created, {} updated, {} skipped, {} deleted, {} failed (watermark {watermark})",
        report.roots,
        report.created,
        report.updated,
        report.skipped,
        report.deleted,
        report.failures
    )
}

pub fn failure_to_list_item(entry: &ExceptionLogEntry) -> FailureListItem {
    FailureListItem {
        id: entry.id.to_string(),
        archiver_id: entry.archiver_id.clone(),
        created_at: entry.created_at.to_rfc3339(),
        message: entry.message.clone(),
        context: entry.context.clone(),
    }
}

pub fn format_failure_lines(entries: &[ExceptionLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<16} {}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.archiver_id.as_deref().unwrap_or("-"),
                entry.message
            )
        })
        .collect()
}
