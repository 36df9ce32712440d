//! eDoc archive client over a JSON RPC envelope.
//!
//! Every call is a `POST` of `{"method", "userIdentifier", "parameters"}` to
//! the configured endpoint. The response carries either a `Result` or a
//! `Fault`; a fault means failure even when the HTTP status is 200.

use std::time::Duration;

use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{ArchiveApi, CaseFileSearch, DocumentSettings};
use crate::config::EdocSettings;
use crate::error::{Error, Result};
use crate::models::{
    ArchiveCaseFile, ArchiveDocument, ArchiveFormat, CaseFileRequest, DocumentPayload,
};
use crate::util::compact_text;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Fault", default)]
    fault: Option<Fault>,
    #[serde(rename = "Result", default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct Fault {
    #[serde(rename = "Code", default)]
    code: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaseFilePayload {
    #[serde(rename = "CaseFileIdentifier")]
    id: String,
    #[serde(rename = "TitleText", default)]
    title: String,
    #[serde(rename = "SequenceNumber", default)]
    sequence_number: String,
    #[serde(rename = "OrganisationReference", default)]
    organisation_reference: Option<String>,
}

impl From<CaseFilePayload> for ArchiveCaseFile {
    fn from(payload: CaseFilePayload) -> Self {
        Self {
            id: payload.id,
            title: payload.title,
            sequence_number: payload.sequence_number,
            organisation_reference: payload.organisation_reference,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentVersionPayload {
    #[serde(rename = "DocumentIdentifier", default)]
    document_id: Option<String>,
    #[serde(rename = "DocumentVersionIdentifier")]
    version_id: String,
    #[serde(rename = "TitleText", default)]
    title: Option<String>,
    #[serde(rename = "DocumentStatusCode", default)]
    status_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ArchiveFormatPayload {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Mimetype", default)]
    mime_type: Option<String>,
    #[serde(rename = "FileExtension", default)]
    file_extension: Option<String>,
}

/// Archive client for the eDoc web service
pub struct EdocClient {
    client: Client,
    settings: EdocSettings,
}

impl EdocClient {
    pub fn new(settings: EdocSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                Error::Connectivity(format!("Failed to construct HTTP client: {error}"))
            })?;
        Ok(Self { client, settings })
    }

    /// Send one call and return the raw HTTP status with its result value
    async fn call(&self, method: &str, parameters: Value) -> Result<(u16, Value)> {
        let body = json!({
            "method": method,
            "userIdentifier": self.settings.user_identifier,
            "parameters": parameters,
        });

        let response = self
            .client
            .post(&self.settings.ws_url)
            .basic_auth(&self.settings.ws_username, Some(&self.settings.ws_password))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|error| Error::Connectivity(format!("{method} request failed: {error}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Connectivity(format!(
                "{method} rejected with HTTP {}",
                status.as_u16()
            )));
        }

        let text = response.text().await.map_err(|error| {
            Error::Connectivity(format!("Failed to read {method} response: {error}"))
        })?;
        let envelope = parse_envelope(method, status.as_u16(), &text)?;
        Ok((status.as_u16(), envelope))
    }

    async fn call_result<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        parameters: Value,
    ) -> Result<T> {
        let (_, result) = self.call(method, parameters).await?;
        serde_json::from_value(result).map_err(|error| {
            Error::ArchiveApi(format!("Unexpected {method} result: {error}"))
        })
    }

    /// Request fields merged with configured defaults; explicit fields win
    fn with_defaults(fields: Map<String, Value>, defaults: &Map<String, Value>) -> Value {
        let mut merged = fields;
        for (key, value) in defaults {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(merged)
    }
}

fn parse_envelope(method: &str, status: u16, text: &str) -> Result<Value> {
    let envelope: Envelope = serde_json::from_str(text).map_err(|_| {
        Error::ArchiveApi(format!(
            "{method} returned HTTP {status} without a valid envelope: {}",
            compact_text(text)
        ))
    })?;

    if let Some(fault) = envelope.fault {
        return Err(Error::ArchiveApi(format!(
            "{method} fault {}: {}",
            fault.code.as_deref().unwrap_or("unknown"),
            fault.message.as_deref().map(compact_text).unwrap_or_default()
        )));
    }
    if !(200..300).contains(&status) {
        return Err(Error::ArchiveApi(format!(
            "{method} failed with HTTP {status}"
        )));
    }
    Ok(envelope.result)
}

fn encode_contents(contents: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(contents)
}

impl ArchiveApi for EdocClient {
    async fn search_case_files(&self, criteria: &CaseFileSearch) -> Result<Vec<ArchiveCaseFile>> {
        let mut parameters = Map::new();
        if let Some(id) = &criteria.case_file_id {
            parameters.insert("CaseFileIdentifier".into(), json!(id));
        }
        if let Some(number) = &criteria.sequence_number {
            parameters.insert("SequenceNumber".into(), json!(number));
        }
        if let Some(title) = &criteria.title {
            parameters.insert("TitleText".into(), json!(title));
        }
        if let Some(project) = &self.settings.project_id {
            parameters.insert("Project".into(), json!(project));
        }

        let found: Vec<CaseFilePayload> = self
            .call_result("SearchCaseFile", Value::Object(parameters))
            .await?;
        Ok(found.into_iter().map(ArchiveCaseFile::from).collect())
    }

    async fn create_case_file(&self, request: &CaseFileRequest) -> Result<ArchiveCaseFile> {
        let mut fields = Map::new();
        fields.insert("TitleText".into(), json!(request.title));
        if let Some(project) = &self.settings.project_id {
            fields.insert("Project".into(), json!(project));
        }
        if let Some(reference) = &request.organisation_reference {
            fields.insert("OrganisationReference".into(), json!(reference));
        }

        let parameters = Self::with_defaults(fields, &self.settings.case_file.defaults);
        let created: CaseFilePayload = self.call_result("CreateCaseFile", parameters).await?;
        Ok(created.into())
    }

    async fn create_document_and_version(
        &self,
        case_file: &ArchiveCaseFile,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument> {
        let mut fields = Map::new();
        fields.insert("CaseFileIdentifier".into(), json!(case_file.id));
        fields.insert("TitleText".into(), json!(payload.title));
        fields.insert("ArchiveFormatCode".into(), json!(payload.archive_format_code));
        fields.insert(
            "DocumentContents".into(),
            json!(encode_contents(&payload.contents)),
        );
        if let Some(reference) = &payload.organisation_reference {
            fields.insert("OrganisationReference".into(), json!(reference));
        }

        let parameters = Self::with_defaults(fields, &self.settings.document.defaults);
        let created: DocumentVersionPayload = self
            .call_result("CreateDocumentAndDocumentVersion", parameters)
            .await?;
        let document_id = created.document_id.ok_or_else(|| {
            Error::ArchiveApi("CreateDocumentAndDocumentVersion returned no document id".into())
        })?;

        Ok(ArchiveDocument {
            id: document_id,
            case_file_id: case_file.id.clone(),
            version_id: created.version_id,
            title: created.title.unwrap_or_else(|| payload.title.clone()),
            status_code: created
                .status_code
                .unwrap_or(self.settings.status_codes.final_code),
        })
    }

    async fn create_document_version(
        &self,
        document: &ArchiveDocument,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument> {
        let parameters = json!({
            "DocumentIdentifier": document.id,
            "ArchiveFormatCode": payload.archive_format_code,
            "DocumentContents": encode_contents(&payload.contents),
        });
        let created: DocumentVersionPayload = self
            .call_result("CreateDocumentVersion", parameters)
            .await?;

        Ok(ArchiveDocument {
            version_id: created.version_id,
            title: payload.title.clone(),
            ..document.clone()
        })
    }

    async fn update_document_settings(
        &self,
        document: &ArchiveDocument,
        settings: DocumentSettings,
    ) -> Result<()> {
        self.call(
            "UpdateDocument",
            json!({
                "DocumentIdentifier": document.id,
                "DocumentStatusCode": settings.status_code,
                "DocumentTypeReference": settings.type_reference,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<u16> {
        let (status, _) = self
            .call("DeleteDocument", json!({"DocumentIdentifier": document_id}))
            .await?;
        Ok(status)
    }

    async fn archive_formats(&self) -> Result<Vec<ArchiveFormat>> {
        let formats: Vec<ArchiveFormatPayload> =
            self.call_result("GetArchiveFormats", json!({})).await?;
        Ok(formats
            .into_iter()
            .map(|format| ArchiveFormat {
                code: format.code,
                mime_type: format.mime_type,
                file_extension: format.file_extension,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn envelope_fault_is_archive_error_despite_http_ok() {
        let error = parse_envelope(
            "CreateDocumentVersion",
            200,
            r#"{"Fault": {"Code": "E-LOCKED", "Message": "Document is locked"}, "Result": null}"#,
        )
        .unwrap_err();
        assert!(matches!(error, Error::ArchiveApi(_)));
        assert!(error.to_string().contains("E-LOCKED"));
    }

    #[test]
    fn envelope_without_fault_returns_result() {
        let result = parse_envelope(
            "SearchCaseFile",
            200,
            r#"{"Fault": null, "Result": [{"CaseFileIdentifier": "cf-1"}]}"#,
        )
        .unwrap();
        assert_eq!(result, json!([{"CaseFileIdentifier": "cf-1"}]));
    }

    #[test]
    fn invalid_envelope_is_archive_error() {
        let error = parse_envelope("SearchCaseFile", 502, "<html>Bad gateway</html>").unwrap_err();
        assert!(error.to_string().contains("HTTP 502"));
    }

    #[test]
    fn non_success_status_without_fault_is_archive_error() {
        let error = parse_envelope("DeleteDocument", 500, r#"{"Result": null}"#).unwrap_err();
        assert!(matches!(error, Error::ArchiveApi(_)));
    }

    #[test]
    fn defaults_never_override_explicit_fields() {
        let mut fields = Map::new();
        fields.insert("TitleText".into(), json!("HS1"));
        let mut defaults = Map::new();
        defaults.insert("TitleText".into(), json!("ignored"));
        defaults.insert("DocumentTypeReference".into(), json!(110));

        let merged = EdocClient::with_defaults(fields, &defaults);
        assert_eq!(
            merged,
            json!({"TitleText": "HS1", "DocumentTypeReference": 110})
        );
    }

    #[test]
    fn case_file_payload_maps_fields() {
        let payload: CaseFilePayload = serde_json::from_value(json!({
            "CaseFileIdentifier": "cf-9",
            "TitleText": "Høring H42",
            "SequenceNumber": "22-000042"
        }))
        .unwrap();
        let case_file = ArchiveCaseFile::from(payload);
        assert_eq!(case_file.sequence_number, "22-000042");
        assert_eq!(case_file.organisation_reference, None);
    }
}
