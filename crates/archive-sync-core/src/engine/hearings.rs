//! Hearing sweep: hearing folders become case files, response folders and
//! overview files become documents.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{Outcome, ReconciliationEngine, SweepContext, SweepReport};
use crate::archive::{template, ArchiveApi};
use crate::config::OverviewSettings;
use crate::db::IdentityMap;
use crate::error::{Error, Result};
use crate::models::{
    ArchiveCaseFile, CaseFileRequest, Correlation, DocumentPayload, DocumentStatus, Metadata,
    RemoteItem, VersionKey,
};
use crate::notify::NotificationSink;
use crate::remote::{RemoteTreeApi, RemoteTreeFetcher};
use crate::util::glob_matches;

const FOLDER_ARCHIVE_TYPE: &str = "zip";

/// Remote item chosen as the content of a document, with its declared type
struct SourceFile<'i> {
    item: &'i RemoteItem,
    declared_type: Option<&'i str>,
}

impl<A: ArchiveApi, N: NotificationSink> ReconciliationEngine<'_, A, N> {
    /// Sweep every hearing changed since the stored watermark.
    ///
    /// The watermark advances to the sweep start only when no batch-level
    /// error occurred; per-hearing and per-response failures do not block it.
    pub async fn sweep_hearings<R: RemoteTreeApi>(
        &self,
        ctx: &SweepContext<'_>,
        fetcher: &RemoteTreeFetcher<R>,
    ) -> Result<SweepReport> {
        let since = match self.watermark(ctx).await? {
            Some(watermark) => watermark,
            None => ctx.default_watermark(),
        };
        tracing::info!(
            archiver = ctx.archiver_id(),
            since = %since,
            "Getting hearings updated since watermark"
        );

        let mut report = SweepReport::default();
        let outcome = self
            .sweep_hearing_roots(ctx, fetcher, since, &mut report)
            .await;
        self.finish_batch(ctx, report, outcome, true).await
    }

    /// Sweep one hearing without time filtering. The watermark is untouched.
    pub async fn sweep_hearing<R: RemoteTreeApi>(
        &self,
        ctx: &SweepContext<'_>,
        fetcher: &RemoteTreeFetcher<R>,
        hearing_id: &str,
    ) -> Result<SweepReport> {
        tracing::info!(archiver = ctx.archiver_id(), hearing = hearing_id, "Getting hearing");

        let mut report = SweepReport::default();
        let outcome = async {
            let hearing = fetcher.fetch_item(hearing_id).await?;
            report.roots += 1;
            if let Err(error) = self
                .sync_hearing(ctx, fetcher, &hearing, None, &mut report)
                .await
            {
                report.failures += 1;
                self.report_failure(ctx, &error, json!({"hearing": hearing.snapshot()}))
                    .await;
            }
            Ok(())
        }
        .await;
        self.finish_batch(ctx, report, outcome, false).await
    }

    async fn sweep_hearing_roots<R: RemoteTreeApi>(
        &self,
        ctx: &SweepContext<'_>,
        fetcher: &RemoteTreeFetcher<R>,
        since: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let sharefile = ctx.archiver.sharefile()?;
        let hearings = fetcher.fetch_roots(&sharefile.root_id, Some(since)).await?;
        tracing::info!(archiver = ctx.archiver_id(), count = hearings.len(), "Fetched hearings");

        for hearing in &hearings {
            report.roots += 1;
            if let Err(error) = self
                .sync_hearing(ctx, fetcher, hearing, Some(since), report)
                .await
            {
                report.failures += 1;
                self.report_failure(ctx, &error, json!({"hearing": hearing.snapshot()}))
                    .await;
            }
        }
        Ok(())
    }

    /// Root scope: resolve the case file, then sync responses and overviews.
    async fn sync_hearing<R: RemoteTreeApi>(
        &self,
        ctx: &SweepContext<'_>,
        fetcher: &RemoteTreeFetcher<R>,
        hearing: &RemoteItem,
        since: Option<DateTime<Utc>>,
        report: &mut SweepReport,
    ) -> Result<()> {
        // Correlation needs every response; the time filter applies to syncing only
        let responses = fetcher.fetch_responses(&hearing.id, None).await?;
        let changed = responses
            .iter()
            .filter(|response| since.is_none_or(|since| response.changed_since(since)))
            .collect::<Vec<_>>();
        let hearing_files = fetcher.fetch_files(&hearing.id).await?;
        let overviews = select_overview_files(&ctx.archiver.edoc.overviews, &hearing_files);

        if changed.is_empty() && overviews.iter().all(|(_, file)| file.is_none()) {
            tracing::debug!(hearing = %hearing.name, "Nothing to sync for hearing");
            report.skipped += 1;
            return Ok(());
        }

        let case_file = self.resolve_hearing_case_file(ctx, hearing, &responses).await?;
        tracing::info!(
            hearing = %hearing.name,
            case_file = %case_file.id,
            responses = changed.len(),
            "Syncing hearing"
        );

        for response in changed {
            let mut attempted = None;
            match self
                .sync_response(ctx, fetcher, &case_file, response, &mut attempted)
                .await
            {
                Ok(outcome) => report.record(outcome),
                Err(error) => {
                    report.failures += 1;
                    self.report_failure(
                        ctx,
                        &error,
                        json!({
                            "hearing": hearing.snapshot(),
                            "response": response.snapshot(),
                            "case_file": case_file.id,
                            "payload": attempted,
                        }),
                    )
                    .await;
                }
            }
        }

        for (overview, file) in overviews {
            let Some(file) = file else {
                tracing::warn!(
                    hearing = %hearing.name,
                    pattern = %overview.pattern,
                    "No overview file matching pattern"
                );
                continue;
            };

            let mut attempted = None;
            match self
                .sync_overview(ctx, fetcher, &case_file, hearing, overview, file, &mut attempted)
                .await
            {
                Ok(outcome) => report.record(outcome),
                Err(error) => {
                    report.failures += 1;
                    self.report_failure(
                        ctx,
                        &error,
                        json!({
                            "hearing": hearing.snapshot(),
                            "overview": file.snapshot(),
                            "case_file": case_file.id,
                            "payload": attempted,
                        }),
                    )
                    .await;
                }
            }
        }

        Ok(())
    }

    /// Case file for a hearing, created from the first department found among
    /// responses or looked up by the case sequence number in their metadata.
    async fn resolve_hearing_case_file(
        &self,
        ctx: &SweepContext<'_>,
        hearing: &RemoteItem,
        responses: &[RemoteItem],
    ) -> Result<ArchiveCaseFile> {
        let archiver = ctx.archiver;

        if !archiver.create_case_file {
            let sequence_number = Correlation::first_case_sequence_number(responses)
                .ok_or_else(|| {
                    Error::Correlation(format!(
                        "Cannot get case sequence number for hearing {} ({})",
                        hearing.name, hearing.id
                    ))
                })?;
            return self
                .archive
                .find_case_file_by_sequence_number(&sequence_number)
                .await?
                .ok_or_else(|| {
                    Error::Correlation(format!("Cannot get case file {sequence_number}"))
                });
        }

        let department_id = Correlation::first_department(responses).ok_or_else(|| {
            Error::Correlation(format!(
                "Cannot get department for hearing {} ({})",
                hearing.name, hearing.id
            ))
        })?;
        let organisation_reference =
            archiver
                .organisation_reference(&department_id)
                .ok_or_else(|| {
                    Error::Correlation(format!(
                        "Unknown department: {department_id} on hearing {}",
                        hearing.id
                    ))
                })?;

        // Response metadata feeds the case file title template
        let mut context = hearing.template_context();
        if let (Some(item), Some(response)) = (context.get_mut("item"), responses.first()) {
            merge_missing(item, &response.metadata);
        }

        let request = CaseFileRequest {
            remote_item_id: hearing.id.clone(),
            title: template::render(&archiver.edoc.case_file.name, &context),
            organisation_reference: Some(organisation_reference.to_string()),
        };
        self.archive
            .get_or_create_case_file(&self.identity, ctx.archiver_id(), &request)
            .await
    }

    /// Child scope: one response folder becomes one document.
    async fn sync_response<R: RemoteTreeApi>(
        &self,
        ctx: &SweepContext<'_>,
        fetcher: &RemoteTreeFetcher<R>,
        case_file: &ArchiveCaseFile,
        response: &RemoteItem,
        attempted: &mut Option<Value>,
    ) -> Result<Outcome> {
        let edoc = &ctx.archiver.edoc;

        let organisation_reference = match response.correlation().department_id {
            Some(department_id) => Some(
                ctx.archiver
                    .organisation_reference(&department_id)
                    .ok_or_else(|| {
                        Error::Correlation(format!(
                            "Unknown department: {department_id} on item {}",
                            response.id
                        ))
                    })?
                    .to_string(),
            ),
            None => case_file.organisation_reference.clone(),
        };

        let files;
        let source = match edoc.file_name_pattern.as_deref() {
            Some(pattern) => {
                files = fetcher.fetch_files(&response.id).await?;
                let item = last_match(pattern, &files).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Cannot find file matching pattern {pattern} for item {}",
                        response.id
                    ))
                })?;
                SourceFile {
                    item,
                    declared_type: edoc.file_type.as_deref(),
                }
            }
            None => SourceFile {
                item: response,
                declared_type: Some(FOLDER_ARCHIVE_TYPE),
            },
        };

        let title = template::render(&edoc.document.name, &response.template_context());
        self.sync_document(
            ctx,
            fetcher,
            case_file,
            VersionKey::single(response.id.clone()),
            &source,
            title,
            organisation_reference,
            attempted,
        )
        .await
    }

    /// Child scope: one overview file becomes one document.
    #[allow(clippy::too_many_arguments)]
    async fn sync_overview<R: RemoteTreeApi>(
        &self,
        ctx: &SweepContext<'_>,
        fetcher: &RemoteTreeFetcher<R>,
        case_file: &ArchiveCaseFile,
        hearing: &RemoteItem,
        overview: &OverviewSettings,
        file: &RemoteItem,
        attempted: &mut Option<Value>,
    ) -> Result<Outcome> {
        let title = template::render(&overview.title, &hearing.template_context());
        let source = SourceFile {
            item: file,
            declared_type: Some(&overview.format),
        };
        self.sync_document(
            ctx,
            fetcher,
            case_file,
            VersionKey::single(file.id.clone()),
            &source,
            title,
            case_file.organisation_reference.clone(),
            attempted,
        )
        .await
    }

    /// Create the document when unknown; replace its content when the source
    /// changed strictly after the last sync; otherwise leave it alone.
    #[allow(clippy::too_many_arguments)]
    async fn sync_document<R: RemoteTreeApi>(
        &self,
        ctx: &SweepContext<'_>,
        fetcher: &RemoteTreeFetcher<R>,
        case_file: &ArchiveCaseFile,
        key: VersionKey,
        source: &SourceFile<'_>,
        title: String,
        organisation_reference: Option<String>,
        attempted: &mut Option<Value>,
    ) -> Result<Outcome> {
        let archiver_id = ctx.archiver_id();
        let existing = self
            .identity
            .find(archiver_id, &key.document_identifier, &key.version_identifier)
            .await?;

        if let Some(record) = &existing {
            if !record.is_outdated_by(source.item.last_changed_at) {
                tracing::debug!(
                    item_id = %key.remote_item_id,
                    document = %record.archive_document_id,
                    "Document is already up to date"
                );
                return Ok(Outcome::Skipped);
            }
        }

        let archive_format_code = self
            .archive
            .resolve_format(source.declared_type, &source.item.name)
            .await?;
        let mut payload = DocumentPayload {
            title,
            archive_format_code,
            contents: Vec::new(),
            organisation_reference,
        };
        *attempted = Some(payload.snapshot());

        payload.contents = fetcher.download(source.item).await?;
        *attempted = Some(payload.snapshot());

        match existing {
            None => {
                let document = self
                    .archive
                    .create_document_version(case_file, &payload)
                    .await?;
                self.identity
                    .record_created(archiver_id, &key, &document, ctx.started_at)
                    .await?;
                Ok(Outcome::Created)
            }
            Some(record) => {
                let final_code = self
                    .archive
                    .status_codes()
                    .code(DocumentStatus::Final);
                let current = record.archive_document(payload.title.clone(), final_code);
                let document = self
                    .archive
                    .update_document_version(&current, &payload)
                    .await?;
                self.identity
                    .record_updated(archiver_id, &key, &document, ctx.started_at)
                    .await?;
                Ok(Outcome::Updated)
            }
        }
    }
}

/// Last item whose name matches `pattern`, in listing order.
///
/// The remote listing has no ordering guarantee, so with several matches the
/// choice is arbitrary but stable for a given listing.
fn last_match<'i>(pattern: &str, items: &'i [RemoteItem]) -> Option<&'i RemoteItem> {
    items
        .iter()
        .filter(|item| glob_matches(pattern, &item.name))
        .last()
}

fn select_overview_files<'o, 'i>(
    overviews: &'o [OverviewSettings],
    files: &'i [RemoteItem],
) -> Vec<(&'o OverviewSettings, Option<&'i RemoteItem>)> {
    overviews
        .iter()
        .map(|overview| (overview, last_match(&overview.pattern, files)))
        .collect()
}

fn merge_missing(target: &mut Value, metadata: &Metadata) {
    if let Value::Object(map) = target {
        for (key, value) in metadata {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}
