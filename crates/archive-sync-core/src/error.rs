//! Error types for archive-sync-core

use std::error::Error as _;
use std::fmt::Write as _;

use thiserror::Error;

/// Result type alias using archive-sync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in archive-sync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote system unreachable or authentication failed
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Required setting absent or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote item cannot be mapped to a required archive reference
    #[error("Correlation error: {0}")]
    Correlation(String),

    /// Archive responded with a fault or non-success status
    #[error("Archive API error: {0}")]
    ArchiveApi(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used to decide how far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Configuration,
    Correlation,
    ArchiveApi,
    Storage,
    Data,
}

impl Error {
    /// Classify this error into the sync error taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) | Self::Http(_) => ErrorKind::Connectivity,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Correlation(_) => ErrorKind::Correlation,
            Self::ArchiveApi(_) => ErrorKind::ArchiveApi,
            Self::Database(_) | Self::LibSql(_) | Self::Io(_) => ErrorKind::Storage,
            Self::NotFound(_) | Self::InvalidInput(_) | Self::Serialization(_) => ErrorKind::Data,
        }
    }

    /// Render the error together with its `source()` chain, one cause per line.
    pub fn trace(&self) -> String {
        let mut trace = self.to_string();
        let mut source = self.source();
        let mut depth = 0usize;
        while let Some(cause) = source {
            depth += 1;
            let _ = write!(trace, "\n  #{depth} caused by: {cause}");
            source = cause.source();
        }
        trace
    }
}
