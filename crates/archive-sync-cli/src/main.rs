//! archive-sync CLI - Run archive sweeps from the command line
//!
//! Loads configuration, opens the state database and hands off to the
//! reconciliation engine in archive-sync-core.

mod cli;
mod commands;
mod error;

use archive_sync_core::config::AppConfig;
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::archive::run_archive;
use crate::commands::case_documents::run_case_documents;
use crate::commands::common::{resolve_db_path, CommandContext};
use crate::commands::failures::run_failures;
use crate::commands::upload::run_upload;
use crate::commands::watermark::run_watermark;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("archive_sync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let context = CommandContext {
        db_path: resolve_db_path(cli.db_path, &config),
        config,
    };

    match cli.command {
        Commands::Archive {
            archiver,
            item,
            json,
        } => run_archive(&archiver, item.as_deref(), json, &context).await?,
        Commands::CaseDocuments {
            archiver,
            case,
            document,
            skip_list,
            include_completed,
            json,
        } => {
            run_case_documents(
                &archiver,
                case,
                document,
                skip_list.as_deref(),
                include_completed,
                json,
                &context,
            )
            .await?;
        }
        Commands::Failures { limit, json } => run_failures(limit, json, &context).await?,
        Commands::Watermark { archiver } => run_watermark(&archiver, &context).await?,
        Commands::Upload {
            archiver,
            folder,
            path,
            no_overwrite,
            no_notify,
        } => run_upload(&archiver, &folder, &path, !no_overwrite, !no_notify, &context).await?,
    }

    Ok(())
}
