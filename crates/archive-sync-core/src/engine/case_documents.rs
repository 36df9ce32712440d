//! Case-document sweep: cases from the property case system become case
//! files, their documents and attachments become archive documents.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Outcome, ReconciliationEngine, SweepContext, SweepReport};
use crate::archive::{template, ArchiveApi};
use crate::config::CaseDocumentSettings;
use crate::db::IdentityMap;
use crate::error::{Error, Result};
use crate::models::{
    ArchiveCaseFile, CaseFileRequest, DocumentPayload, SourceCase, SourceDocument, SourceVersion,
    VersionKey,
};
use crate::notify::NotificationSink;
use crate::util::compact_text;

/// Property case system operations (async)
#[allow(async_fn_in_trait)]
pub trait CaseDocumentSource {
    /// Open cases, plus completed ones when asked
    async fn cases(&self, include_completed: bool) -> Result<Vec<SourceCase>>;

    /// Primary documents of a case
    async fn documents(&self, case: &SourceCase) -> Result<Vec<SourceDocument>>;

    /// Attachments of a primary document
    async fn attachments(&self, document: &SourceDocument) -> Result<Vec<SourceDocument>>;

    /// A version with its content
    async fn version(&self, version_identifier: &str) -> Result<SourceVersion>;
}

/// Narrowing applied to a case-document sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseDocumentOptions {
    /// Only this case
    pub case_sequence_number: Option<String>,
    /// Only documents with this number
    pub document_number: Option<String>,
    /// Case sequence numbers never synced
    pub skip_cases: HashSet<String>,
    pub include_completed: bool,
}

impl CaseDocumentOptions {
    /// Whether the sweep covers everything and may advance the watermark
    pub const fn is_full_sweep(&self) -> bool {
        self.case_sequence_number.is_none() && self.document_number.is_none()
    }

    fn selects_case(&self, case: &SourceCase) -> bool {
        self.case_sequence_number
            .as_deref()
            .is_none_or(|wanted| wanted == case.sequence_number)
    }

    fn selects_document(&self, document: &SourceDocument) -> bool {
        self.document_number
            .as_deref()
            .is_none_or(|wanted| wanted == document.document_number)
    }
}

/// Read a skip list: one case sequence number per line, blank lines ignored.
pub fn load_skip_list(path: impl AsRef<Path>) -> Result<HashSet<String>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::Configuration(format!(
            "skip list {} does not exist",
            path.display()
        )));
    }

    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

impl<A: ArchiveApi, N: NotificationSink> ReconciliationEngine<'_, A, N> {
    /// Sweep cases and their documents.
    ///
    /// Versions already recorded are skipped; versions that disappeared from
    /// a document are deleted from the archive. The watermark only advances
    /// for unfiltered sweeps.
    pub async fn sweep_case_documents<S: CaseDocumentSource>(
        &self,
        ctx: &SweepContext<'_>,
        source: &S,
        options: &CaseDocumentOptions,
    ) -> Result<SweepReport> {
        tracing::info!(
            archiver = ctx.archiver_id(),
            case = ?options.case_sequence_number,
            document = ?options.document_number,
            skip_cases = options.skip_cases.len(),
            "Getting case documents"
        );

        let mut report = SweepReport::default();
        let outcome = self.sweep_cases(ctx, source, options, &mut report).await;
        self.finish_batch(ctx, report, outcome, options.is_full_sweep())
            .await
    }

    async fn sweep_cases<S: CaseDocumentSource>(
        &self,
        ctx: &SweepContext<'_>,
        source: &S,
        options: &CaseDocumentOptions,
        report: &mut SweepReport,
    ) -> Result<()> {
        let cases = source.cases(options.include_completed).await?;

        for case in cases.iter().filter(|case| options.selects_case(case)) {
            if options.skip_cases.contains(&case.sequence_number) {
                tracing::info!(case = %case.sequence_number, "Skipping case from skip list");
                continue;
            }

            report.roots += 1;
            if let Err(error) = self.sync_case(ctx, source, options, case, report).await {
                report.failures += 1;
                self.report_failure(ctx, &error, json!({"case": case})).await;
            }
        }
        Ok(())
    }

    /// Root scope: one case and all its documents.
    async fn sync_case<S: CaseDocumentSource>(
        &self,
        ctx: &SweepContext<'_>,
        source: &S,
        options: &CaseDocumentOptions,
        case: &SourceCase,
        report: &mut SweepReport,
    ) -> Result<()> {
        let case_file = self.resolve_case_document_case_file(ctx, case).await?;
        let documents = source.documents(case).await?;
        tracing::info!(
            case = %case.sequence_number,
            case_file = %case_file.id,
            documents = documents.len(),
            "Syncing case"
        );

        for document in documents
            .iter()
            .filter(|document| options.selects_document(document))
        {
            if self.archive.status_codes().is_draft(document.status_code) {
                tracing::debug!(document = %document.document_number, "Skipping draft document");
                report.skipped += 1;
                continue;
            }

            if let Err(error) = self
                .sync_case_document(ctx, source, case, &case_file, document, report)
                .await
            {
                report.failures += 1;
                self.report_failure(
                    ctx,
                    &error,
                    json!({
                        "case": case,
                        "document": document.snapshot(),
                        "case_file": case_file.id,
                    }),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn resolve_case_document_case_file(
        &self,
        ctx: &SweepContext<'_>,
        case: &SourceCase,
    ) -> Result<ArchiveCaseFile> {
        if !ctx.archiver.create_case_file {
            return self
                .archive
                .find_case_file_by_sequence_number(&case.sequence_number)
                .await?
                .ok_or_else(|| {
                    Error::Correlation(format!(
                        "Cannot get case file {}",
                        case.sequence_number
                    ))
                });
        }

        let context = json!({
            "item": {
                "id": case.sequence_number,
                "name": case.title,
                "property_reference": case.property_reference,
            },
        });
        let request = CaseFileRequest {
            remote_item_id: case.sequence_number.clone(),
            title: template::render(&ctx.archiver.edoc.case_file.name, &context),
            organisation_reference: None,
        };
        self.archive
            .get_or_create_case_file(&self.identity, ctx.archiver_id(), &request)
            .await
    }

    /// Child scope: a primary document, its attachments and stale cleanup.
    ///
    /// Every part is its own archive document. All parts are recorded under
    /// the primary document identifier so one stale query covers them. A
    /// document without a current version keeps no parts, so every version
    /// archived for it earlier is stale.
    async fn sync_case_document<S: CaseDocumentSource>(
        &self,
        ctx: &SweepContext<'_>,
        source: &S,
        case: &SourceCase,
        case_file: &ArchiveCaseFile,
        document: &SourceDocument,
        report: &mut SweepReport,
    ) -> Result<()> {
        let mut current_versions = HashSet::new();
        let attachments = if document.version_identifier.is_some() {
            source.attachments(document).await?
        } else {
            tracing::debug!(document = %document.document_number, "Document has no version");
            report.skipped += 1;
            Vec::new()
        };

        for part in std::iter::once(document).chain(&attachments) {
            let Some(version_identifier) = part.version_identifier.as_deref() else {
                continue;
            };
            current_versions.insert(version_identifier.to_string());

            let key = VersionKey {
                remote_item_id: part.document_identifier.clone(),
                document_identifier: document.document_identifier.clone(),
                version_identifier: version_identifier.to_string(),
            };
            let mut attempted = None;
            match self
                .sync_case_version(
                    ctx,
                    source,
                    case,
                    case_file,
                    document,
                    part,
                    &key,
                    &mut attempted,
                )
                .await
            {
                Ok(outcome) => report.record(outcome),
                Err(error) => {
                    report.failures += 1;
                    self.report_failure(
                        ctx,
                        &error,
                        json!({
                            "case": case,
                            "document": document.snapshot(),
                            "part": part.snapshot(),
                            "case_file": case_file.id,
                            "payload": attempted,
                        }),
                    )
                    .await;
                }
            }
        }

        self.remove_stale_versions(ctx, document, &current_versions, report)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn sync_case_version<S: CaseDocumentSource>(
        &self,
        ctx: &SweepContext<'_>,
        source: &S,
        case: &SourceCase,
        case_file: &ArchiveCaseFile,
        document: &SourceDocument,
        part: &SourceDocument,
        key: &VersionKey,
        attempted: &mut Option<Value>,
    ) -> Result<Outcome> {
        let archiver_id = ctx.archiver_id();
        if let Some(record) = self
            .identity
            .find(archiver_id, &key.document_identifier, &key.version_identifier)
            .await?
        {
            tracing::debug!(
                version = %key.version_identifier,
                document = %record.archive_document_id,
                "Version already archived"
            );
            return Ok(Outcome::Skipped);
        }

        let version = source.version(&key.version_identifier).await?;
        let file_name = match version.file_extension.as_deref() {
            Some(extension) => format!("{}.{extension}", version.version_identifier),
            None => part.title.clone(),
        };
        let archive_format_code = self
            .archive
            .resolve_format(version.declared_type.as_deref(), &file_name)
            .await?;

        let context = version_context(case, document, part);
        let payload = DocumentPayload {
            title: template::render(&ctx.archiver.edoc.document.name, &context),
            archive_format_code,
            contents: version.contents,
            organisation_reference: case_file.organisation_reference.clone(),
        };
        *attempted = Some(payload.snapshot());

        let created = self
            .archive
            .create_document_version(case_file, &payload)
            .await?;
        self.identity
            .record_created(archiver_id, key, &created, ctx.started_at)
            .await?;
        Ok(Outcome::Created)
    }

    /// Delete archive documents of versions no longer present.
    ///
    /// The record goes whatever status the archive returns; a failed call
    /// keeps the record for the next sweep.
    async fn remove_stale_versions(
        &self,
        ctx: &SweepContext<'_>,
        document: &SourceDocument,
        current_versions: &HashSet<String>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let stale = self
            .identity
            .list_stale(ctx.archiver_id(), &document.document_identifier, current_versions)
            .await?;

        for record in stale {
            match self.archive.delete_document(&record.archive_document_id).await {
                Ok(_) => {
                    self.identity.remove(&record).await?;
                    report.deleted += 1;
                }
                Err(error) => {
                    tracing::error!(
                        archiver = ctx.archiver_id(),
                        document = %record.archive_document_id,
                        version = %record.version_identifier,
                        %error,
                        "Failed to delete stale document"
                    );
                }
            }
        }
        Ok(())
    }
}

fn version_context(case: &SourceCase, document: &SourceDocument, part: &SourceDocument) -> Value {
    json!({
        "item": {
            "id": part.document_identifier,
            "name": part.title,
            "document_number": document.document_number,
            "act_number": document.act_number(),
            "document_date": document.document_date.map(|date| date.format("%Y-%m-%d").to_string()),
            "attachment": part.document_identifier != document.document_identifier,
        },
        "case": {
            "sequence_number": case.sequence_number,
            "title": case.title,
        },
    })
}

#[derive(Deserialize)]
struct VersionPayload {
    version_identifier: String,
    #[serde(default)]
    declared_type: Option<String>,
    #[serde(default)]
    file_extension: Option<String>,
    /// Base64 encoded
    contents: String,
}

impl VersionPayload {
    fn into_version(self) -> Result<SourceVersion> {
        let contents = base64::engine::general_purpose::STANDARD
            .decode(self.contents.as_bytes())
            .map_err(|error| {
                Error::InvalidInput(format!(
                    "Invalid content encoding on version {}: {error}",
                    self.version_identifier
                ))
            })?;
        Ok(SourceVersion {
            version_identifier: self.version_identifier,
            declared_type: self.declared_type,
            file_extension: self.file_extension,
            contents,
        })
    }
}

/// HTTP client for the property case system, authenticated with an API key
pub struct PropertyCaseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PropertyCaseClient {
    pub fn new(settings: &CaseDocumentSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                Error::Connectivity(format!("Failed to construct HTTP client: {error}"))
            })?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| Error::Connectivity(format!("{context} failed: {error}")))?;
        let response = check_status(response, context).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!(
        "{context} failed with HTTP {}: {}",
        status.as_u16(),
        compact_text(&body)
    );
    if status == reqwest::StatusCode::NOT_FOUND {
        Err(Error::NotFound(message))
    } else {
        Err(Error::Connectivity(message))
    }
}

impl CaseDocumentSource for PropertyCaseClient {
    async fn cases(&self, include_completed: bool) -> Result<Vec<SourceCase>> {
        self.get_json(
            &format!("api/cases?completed={include_completed}"),
            "Cases request",
        )
        .await
    }

    async fn documents(&self, case: &SourceCase) -> Result<Vec<SourceDocument>> {
        self.get_json(
            &format!(
                "api/cases/{}/documents",
                urlencoding::encode(&case.sequence_number)
            ),
            "Documents request",
        )
        .await
    }

    async fn attachments(&self, document: &SourceDocument) -> Result<Vec<SourceDocument>> {
        self.get_json(
            &format!(
                "api/documents/{}/attachments",
                urlencoding::encode(&document.document_identifier)
            ),
            "Attachments request",
        )
        .await
    }

    async fn version(&self, version_identifier: &str) -> Result<SourceVersion> {
        let payload: VersionPayload = self
            .get_json(
                &format!("api/versions/{}", urlencoding::encode(version_identifier)),
                "Version request",
            )
            .await?;
        payload.into_version()
    }
}
