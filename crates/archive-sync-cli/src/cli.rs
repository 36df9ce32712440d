use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "archive-sync")]
#[command(about = "Reconcile hearing files and case documents into the archive")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the state database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sweep hearings changed since the last run
    Archive {
        /// Archiver definition (JSON)
        #[arg(long, value_name = "FILE")]
        archiver: PathBuf,
        /// Only this hearing, without time filtering
        #[arg(long, value_name = "ID")]
        item: Option<String>,
        /// Print the sweep report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sweep case documents from the property case system
    CaseDocuments {
        /// Archiver definition (JSON)
        #[arg(long, value_name = "FILE")]
        archiver: PathBuf,
        /// Only this case sequence number
        #[arg(long, value_name = "SEQUENCE_NUMBER")]
        case: Option<String>,
        /// Only documents with this number
        #[arg(long, value_name = "NUMBER")]
        document: Option<String>,
        /// File listing case sequence numbers to skip, one per line
        #[arg(long, value_name = "FILE")]
        skip_list: Option<PathBuf>,
        /// Include completed cases
        #[arg(long)]
        include_completed: bool,
        /// Print the sweep report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent sync failures
    Failures {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored watermark of an archiver
    Watermark {
        /// Archiver definition (JSON)
        #[arg(long, value_name = "FILE")]
        archiver: PathBuf,
    },
    /// Upload a file into a remote folder
    Upload {
        /// Archiver definition (JSON) holding the remote store credentials
        #[arg(long, value_name = "FILE")]
        archiver: PathBuf,
        /// Target folder id
        #[arg(long, value_name = "ID")]
        folder: String,
        /// Local file to upload
        path: PathBuf,
        /// Fail instead of replacing an existing file
        #[arg(long)]
        no_overwrite: bool,
        /// Do not notify folder subscribers
        #[arg(long)]
        no_notify: bool,
    },
}
