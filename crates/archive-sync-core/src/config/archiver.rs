//! Archiver definitions loaded from JSON

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::StatusCodes;
use crate::util::{compact_text, is_http_url};

const DEFAULT_TITLE_TEMPLATE: &str = "{{ item.name }}";

/// What an archiver synchronizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiverKind {
    /// Hearing responses from the remote file store into the archive
    #[serde(rename = "sharefile2edoc")]
    ShareFileToEdoc,
    /// Case documents from the property case system into the archive
    CaseDocuments,
}

impl fmt::Display for ArchiverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShareFileToEdoc => f.write_str("sharefile2edoc"),
            Self::CaseDocuments => f.write_str("case_documents"),
        }
    }
}

/// One configured archiver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiverConfig {
    pub id: String,
    pub name: String,
    pub kind: ArchiverKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Create case files for new hearings; otherwise look them up by sequence number
    #[serde(default = "default_true")]
    pub create_case_file: bool,
    #[serde(default)]
    pub sharefile: Option<ShareFileSettings>,
    pub edoc: EdocSettings,
    #[serde(default)]
    pub case_documents: Option<CaseDocumentSettings>,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

/// Remote file store credentials and traversal root
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareFileSettings {
    pub hostname: String,
    pub client_id: String,
    pub secret: String,
    pub username: String,
    pub password: String,
    pub root_id: String,
}

impl fmt::Debug for ShareFileSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ShareFileSettings")
            .field("hostname", &self.hostname)
            .field("client_id", &self.client_id)
            .field("secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("root_id", &self.root_id)
            .finish()
    }
}

/// Title template plus default request fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSettings {
    #[serde(default = "default_title_template")]
    pub name: String,
    /// Extra fields merged into every create request
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            name: default_title_template(),
            defaults: Map::new(),
        }
    }
}

/// Overview file copied next to the responses of each hearing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverviewSettings {
    /// Shell glob matched against file names in the hearing folder
    pub pattern: String,
    /// Archive format code (e.g. `PDF`)
    pub format: String,
    /// Title template, rendered against the hearing item
    pub title: String,
}

/// Archive endpoint, templates and code mappings
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdocSettings {
    pub ws_url: String,
    pub ws_username: String,
    pub ws_password: String,
    pub user_identifier: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub case_file: TemplateSettings,
    #[serde(default)]
    pub document: TemplateSettings,
    #[serde(default)]
    pub status_codes: StatusCodes,
    /// Department id → archive organisation reference
    #[serde(default)]
    pub organisation_references: BTreeMap<String, String>,
    /// Glob selecting the file archived for a response folder
    #[serde(default)]
    pub file_name_pattern: Option<String>,
    /// Archive format code of files matched by `file_name_pattern`
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default = "default_overviews")]
    pub overviews: Vec<OverviewSettings>,
}

impl fmt::Debug for EdocSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EdocSettings")
            .field("ws_url", &self.ws_url)
            .field("ws_username", &self.ws_username)
            .field("ws_password", &"[REDACTED]")
            .field("user_identifier", &self.user_identifier)
            .field("project_id", &self.project_id)
            .field("case_file", &self.case_file)
            .field("document", &self.document)
            .field("status_codes", &self.status_codes)
            .field("organisation_references", &self.organisation_references)
            .field("file_name_pattern", &self.file_name_pattern)
            .field("file_type", &self.file_type)
            .field("overviews", &self.overviews)
            .finish()
    }
}

/// Property case system endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseDocumentSettings {
    pub url: String,
    pub api_key: String,
}

impl fmt::Debug for CaseDocumentSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CaseDocumentSettings")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationSettings {
    #[serde(default)]
    pub email: Option<EmailSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailSettings {
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
}

const fn default_true() -> bool {
    true
}

fn default_title_template() -> String {
    DEFAULT_TITLE_TEMPLATE.to_string()
}

fn default_overviews() -> Vec<OverviewSettings> {
    vec![
        OverviewSettings {
            pattern: "*-combined.pdf".to_string(),
            format: "PDF".to_string(),
            title: "{{ item.name }} - samlede høringssvar".to_string(),
        },
        OverviewSettings {
            pattern: "overblik.xlsx".to_string(),
            format: "XLSX".to_string(),
            title: "{{ item.name }} - overblik over høringssvar".to_string(),
        },
    ]
}

impl ArchiverConfig {
    /// Parse and validate an archiver definition.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload).map_err(|error| {
            Error::Configuration(format!("invalid archiver definition: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate an archiver definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let payload = std::fs::read_to_string(path).map_err(|error| {
            Error::Configuration(format!(
                "cannot read archiver definition {}: {error}",
                path.display()
            ))
        })?;
        Self::from_json(&payload)
    }

    /// Check required settings for the configured kind.
    pub fn validate(&self) -> Result<()> {
        require("id", &self.id)?;
        require("name", &self.name)?;

        let edoc = &self.edoc;
        require("edoc.ws_url", &edoc.ws_url)?;
        if !is_http_url(&edoc.ws_url) {
            return Err(Error::Configuration(
                "edoc.ws_url must start with http:// or https://".to_string(),
            ));
        }
        require("edoc.ws_username", &edoc.ws_username)?;
        require("edoc.ws_password", &edoc.ws_password)?;
        require("edoc.user_identifier", &edoc.user_identifier)?;
        if edoc.file_name_pattern.is_some() && edoc.file_type.is_none() {
            return Err(Error::Configuration(
                "edoc.file_type is required when edoc.file_name_pattern is set".to_string(),
            ));
        }
        for overview in &edoc.overviews {
            require("edoc.overviews[].pattern", &overview.pattern)?;
            require("edoc.overviews[].format", &overview.format)?;
        }

        match self.kind {
            ArchiverKind::ShareFileToEdoc => {
                let sharefile = self.sharefile()?;
                require("sharefile.hostname", &sharefile.hostname)?;
                require("sharefile.client_id", &sharefile.client_id)?;
                require("sharefile.secret", &sharefile.secret)?;
                require("sharefile.username", &sharefile.username)?;
                require("sharefile.password", &sharefile.password)?;
                require("sharefile.root_id", &sharefile.root_id)?;
            }
            ArchiverKind::CaseDocuments => {
                let source = self.case_documents()?;
                require("case_documents.url", &source.url)?;
                if !is_http_url(&source.url) {
                    return Err(Error::Configuration(
                        "case_documents.url must start with http:// or https://".to_string(),
                    ));
                }
                require("case_documents.api_key", &source.api_key)?;
            }
        }

        if let Some(email) = &self.notifications.email {
            require("notifications.email.from", &email.from)?;
        }

        Ok(())
    }

    /// Refuse disabled archivers and archivers of another kind.
    pub fn ensure_runnable(&self, kind: ArchiverKind) -> Result<()> {
        if !self.enabled {
            return Err(Error::Configuration(format!(
                "archiver {} is disabled",
                self.id
            )));
        }
        if self.kind != kind {
            return Err(Error::Configuration(format!(
                "archiver {} is of kind {}, expected {kind}",
                self.id, self.kind
            )));
        }
        Ok(())
    }

    pub fn sharefile(&self) -> Result<&ShareFileSettings> {
        self.sharefile.as_ref().ok_or_else(|| {
            Error::Configuration(format!("archiver {} has no sharefile section", self.id))
        })
    }

    pub fn case_documents(&self) -> Result<&CaseDocumentSettings> {
        self.case_documents.as_ref().ok_or_else(|| {
            Error::Configuration(format!(
                "archiver {} has no case_documents section",
                self.id
            ))
        })
    }

    /// Archive organisation reference for a department id
    pub fn organisation_reference(&self, department_id: &str) -> Option<&str> {
        self.edoc
            .organisation_references
            .get(department_id.trim())
            .map(String::as_str)
    }

    /// Alert recipients; empty when email alerts are off
    pub fn alert_recipients(&self) -> &[String] {
        self.notifications
            .email
            .as_ref()
            .map(|email| email.to.as_slice())
            .unwrap_or_default()
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Configuration(format!(
            "missing required setting {}",
            compact_text(name)
        )));
    }
    Ok(())
}
