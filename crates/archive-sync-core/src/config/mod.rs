//! Runtime configuration.
//!
//! Process-level settings come from the environment ([`AppConfig`]); each
//! archiver is described by a JSON document ([`ArchiverConfig`]). Both are
//! validated when loaded so no sweep starts with a missing setting.

mod archiver;

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub use archiver::{
    ArchiverConfig, ArchiverKind, CaseDocumentSettings, EdocSettings, EmailSettings,
    NotificationSettings, OverviewSettings, ShareFileSettings, TemplateSettings,
};

const DEFAULT_HTTP_TIMEOUT_SECS: &str = "30";

/// Process-level settings read from `ARCHIVE_SYNC_*` environment variables
#[derive(Clone)]
pub struct AppConfig {
    /// State database path; `None` means the platform default
    pub db_path: Option<PathBuf>,
    /// HTTP relay that receives failure alerts
    pub alert_endpoint: Option<String>,
    /// Bearer token sent to the alert relay
    pub alert_token: Option<String>,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("db_path", &self.db_path)
            .field("alert_endpoint", &self.alert_endpoint)
            .field(
                "alert_token",
                &self.alert_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = optional_trimmed(&lookup, "ARCHIVE_SYNC_DB_PATH").map(PathBuf::from);

        let alert_endpoint = optional_trimmed(&lookup, "ARCHIVE_SYNC_ALERT_ENDPOINT");
        if let Some(endpoint) = alert_endpoint.as_deref() {
            if !is_http_url(endpoint) {
                return Err(Error::Configuration(
                    "ARCHIVE_SYNC_ALERT_ENDPOINT must start with http:// or https://".to_string(),
                ));
            }
        }
        let alert_token = optional_trimmed(&lookup, "ARCHIVE_SYNC_ALERT_TOKEN");

        let timeout_secs = value_or_default(
            &lookup,
            "ARCHIVE_SYNC_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )
        .parse::<u64>()
        .map_err(|_| {
            Error::Configuration(
                "ARCHIVE_SYNC_HTTP_TIMEOUT_SECS must be an integer in [1, 600]".to_string(),
            )
        })?;
        if !(1..=600).contains(&timeout_secs) {
            return Err(Error::Configuration(
                "ARCHIVE_SYNC_HTTP_TIMEOUT_SECS must be in [1, 600]".to_string(),
            ));
        }

        Ok(Self {
            db_path,
            alert_endpoint,
            alert_token,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
