//! Failure notification.
//!
//! Every caught failure becomes a durable [`ExceptionLogEntry`] and, when the
//! archiver lists recipients, an [`Alert`]. Notification never fails the
//! caller: problems here are logged and dropped.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::config::ArchiverConfig;
use crate::db::LibSqlExceptionLog;
use crate::error::{Error, Result};
use crate::models::ExceptionLogEntry;
use crate::util::compact_text;

/// A caught failure with its structured context
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub archiver_id: Option<String>,
    pub message: String,
    pub context: Value,
    pub trace: String,
}

impl FailureReport {
    pub fn from_error(archiver_id: Option<&str>, error: &Error, context: Value) -> Self {
        Self {
            archiver_id: archiver_id.map(str::to_string),
            message: error.to_string(),
            context,
            trace: error.trace(),
        }
    }
}

/// Receives caught failures (async, infallible)
#[allow(async_fn_in_trait)]
pub trait NotificationSink {
    async fn notify(&self, report: FailureReport);
}

/// Formatted alert for a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Alert {
    /// Subject is the failure message; body is the pretty context plus trace.
    pub fn for_report(from: &str, to: &[String], report: &FailureReport) -> Self {
        let context = serde_json::to_string_pretty(&report.context)
            .unwrap_or_else(|_| report.context.to_string());
        Self {
            from: from.to_string(),
            to: to.to_vec(),
            subject: report.message.clone(),
            body: format!("{context}\n{}", report.trace),
        }
    }
}

/// Delivers alerts (async)
#[allow(async_fn_in_trait)]
pub trait AlertDispatcher {
    async fn dispatch(&self, alert: &Alert) -> Result<()>;
}

/// Without a transport alerts are only logged
impl<D: AlertDispatcher> AlertDispatcher for Option<D> {
    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        match self {
            Some(dispatcher) => dispatcher.dispatch(alert).await,
            None => {
                tracing::warn!(
                    subject = %alert.subject,
                    recipients = alert.to.len(),
                    "No alert transport configured; alert not sent"
                );
                Ok(())
            }
        }
    }
}

/// Posts alerts as JSON to an HTTP relay
#[derive(Debug, Clone)]
pub struct HttpAlertDispatcher {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpAlertDispatcher {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                Error::Connectivity(format!("Failed to construct HTTP client: {error}"))
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }
}

impl AlertDispatcher for HttpAlertDispatcher {
    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(alert);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| Error::Connectivity(format!("Alert request failed: {error}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Connectivity(format!(
                "Alert request failed with HTTP {status}: {}",
                compact_text(&body)
            )));
        }
        Ok(())
    }
}

/// Persists failures to the exception log and alerts the archiver's recipients
pub struct AuditNotificationSink<'a, D> {
    log: LibSqlExceptionLog<'a>,
    dispatcher: D,
    sender: Option<String>,
    recipients: Vec<String>,
}

impl<'a, D: AlertDispatcher> AuditNotificationSink<'a, D> {
    pub const fn new(log: LibSqlExceptionLog<'a>, dispatcher: D) -> Self {
        Self {
            log,
            dispatcher,
            sender: None,
            recipients: Vec::new(),
        }
    }

    /// Alert the recipients configured on `archiver`
    #[must_use]
    pub fn for_archiver(mut self, archiver: &ArchiverConfig) -> Self {
        if let Some(email) = &archiver.notifications.email {
            self.sender = Some(email.from.clone());
            self.recipients = email.to.clone();
        }
        self
    }

    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }
}

impl<D: AlertDispatcher> NotificationSink for AuditNotificationSink<'_, D> {
    async fn notify(&self, report: FailureReport) {
        let entry = ExceptionLogEntry::new(
            report.archiver_id.clone(),
            report.message.clone(),
            report.context.clone(),
            report.trace.clone(),
        );
        if let Err(error) = self.log.record(&entry).await {
            tracing::error!(%error, message = %report.message, "Failed to persist exception log entry");
        }

        let Some(sender) = self.sender.as_deref() else {
            return;
        };
        if self.recipients.is_empty() {
            return;
        }

        let alert = Alert::for_report(sender, &self.recipients, &report);
        if let Err(error) = self.dispatcher.dispatch(&alert).await {
            tracing::error!(%error, subject = %alert.subject, "Failed to dispatch alert");
        }
    }
}
