//! Reconciliation engine.
//!
//! Sweeps walk a source tree strictly in order, one call at a time. Errors
//! are caught at the smallest enclosing scope (child, then root, then
//! batch), reported through the [`NotificationSink`], and only a batch-level
//! error keeps the watermark from advancing. Every create/update is guarded
//! by an identity lookup, so rerunning a window is harmless.

mod case_documents;
mod hearings;

use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::archive::{ArchiveApi, ArchiveClient};
use crate::config::ArchiverConfig;
use crate::db::{Database, LibSqlIdentityMap, LibSqlWatermarkStore, WatermarkStore};
use crate::error::{Error, Result};
use crate::notify::{FailureReport, NotificationSink};

pub use case_documents::{load_skip_list, CaseDocumentOptions, CaseDocumentSource, PropertyCaseClient};

/// Explicit per-sweep context threaded through every call
#[derive(Debug, Clone, Copy)]
pub struct SweepContext<'c> {
    pub archiver: &'c ArchiverConfig,
    /// Captured before fetching; becomes the next watermark
    pub started_at: DateTime<Utc>,
}

impl<'c> SweepContext<'c> {
    pub fn new(archiver: &'c ArchiverConfig) -> Self {
        Self::at(archiver, Utc::now())
    }

    pub const fn at(archiver: &'c ArchiverConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            archiver,
            started_at,
        }
    }

    pub fn archiver_id(&self) -> &'c str {
        &self.archiver.id
    }

    /// Watermark used when none is stored: one month before the start
    pub fn default_watermark(&self) -> DateTime<Utc> {
        self.started_at
            .checked_sub_months(Months::new(1))
            .unwrap_or(self.started_at)
    }
}

/// Summary of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub roots: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failures: usize,
    pub watermark_advanced: bool,
}

impl SweepReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

/// Result of reconciling one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Skipped,
}

/// Orchestrates sweeps against one state database
pub struct ReconciliationEngine<'a, A, N> {
    identity: LibSqlIdentityMap<'a>,
    watermarks: LibSqlWatermarkStore<'a>,
    archive: ArchiveClient<A>,
    sink: N,
}

impl<'a, A: ArchiveApi, N: NotificationSink> ReconciliationEngine<'a, A, N> {
    pub fn new(db: &'a Database, archive: ArchiveClient<A>, sink: N) -> Self {
        Self {
            identity: LibSqlIdentityMap::new(db.connection()),
            watermarks: LibSqlWatermarkStore::new(db.connection()),
            archive,
            sink,
        }
    }

    pub const fn identity(&self) -> &LibSqlIdentityMap<'a> {
        &self.identity
    }

    pub const fn archive(&self) -> &ArchiveClient<A> {
        &self.archive
    }

    pub const fn sink(&self) -> &N {
        &self.sink
    }

    /// Stored watermark of the sweep's archiver
    pub async fn watermark(&self, ctx: &SweepContext<'_>) -> Result<Option<DateTime<Utc>>> {
        self.watermarks.get(ctx.archiver_id()).await
    }

    /// Log a caught failure and hand it to the sink
    async fn report_failure(&self, ctx: &SweepContext<'_>, error: &Error, context: Value) {
        tracing::error!(
            archiver = ctx.archiver_id(),
            kind = ?error.kind(),
            %error,
            context = %context,
            "Sync failure"
        );
        self.sink
            .notify(FailureReport::from_error(
                Some(ctx.archiver_id()),
                error,
                context,
            ))
            .await;
    }

    /// Close a batch: advance the watermark on success, report a batch failure otherwise
    async fn finish_batch(
        &self,
        ctx: &SweepContext<'_>,
        mut report: SweepReport,
        outcome: Result<()>,
        advance_watermark: bool,
    ) -> Result<SweepReport> {
        if let Err(error) = outcome {
            self.report_failure(ctx, &error, serde_json::json!({"scope": "batch"}))
                .await;
            tracing::error!(archiver = ctx.archiver_id(), ?report, "Sweep aborted");
            return Err(error);
        }

        if advance_watermark {
            self.watermarks
                .set(ctx.archiver_id(), ctx.started_at)
                .await?;
            report.watermark_advanced = true;
        }

        tracing::info!(
            archiver = ctx.archiver_id(),
            roots = report.roots,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            deleted = report.deleted,
            failures = report.failures,
            watermark_advanced = report.watermark_advanced,
            "Sweep finished"
        );
        Ok(report)
    }
}
