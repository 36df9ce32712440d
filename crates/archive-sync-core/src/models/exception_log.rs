//! Exception log entry model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier for an exception log entry, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExceptionLogId(Uuid);

impl ExceptionLogId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ExceptionLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExceptionLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExceptionLogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Durable audit entry written for every caught failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionLogEntry {
    pub id: ExceptionLogId,
    /// Archiver the failure happened under, if any
    pub archiver_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub message: String,
    /// Structured context (parent identifiers, payload snapshot)
    pub context: Value,
    /// Rendered error source chain
    pub trace: String,
}

impl ExceptionLogEntry {
    #[must_use]
    pub fn new(
        archiver_id: Option<String>,
        message: impl Into<String>,
        context: Value,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            id: ExceptionLogId::new(),
            archiver_id,
            created_at: Utc::now(),
            message: message.into(),
            context,
            trace: trace.into(),
        }
    }
}
