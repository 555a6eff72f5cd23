//! # Sync Engine
//!
//! Orchestrates revision synchronization across a set of documents.
//!
//! ## Overview
//!
//! The engine walks each document through the pipeline tracked by
//! [`DocumentJob`]: resolve the reference, list revisions, filter them down to
//! the configured granularity, then download the surviving snapshots into the
//! vault. Documents are processed sequentially and independently, so one
//! failing document never blocks the rest of the run. Downloads inside a
//! document run concurrently under a semaphore.
//!
//! ## Sync Workflow
//!
//! 1. **Resolving**: Extract the document identifier from the reference
//! 2. **Listing**: Fetch the full revision history, oldest first
//! 3. **Filtering**: Keep the latest revision per granularity bucket
//! 4. **Downloading**: Export retained revisions as plain text, bounded by
//!    the concurrency limit
//!
//! Cancellation is cooperative: once the token fires, no new documents are
//! started and no new downloads are issued, while downloads already in flight
//! run to completion.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{DocumentRef, SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(SyncConfig::default(), source, exporter, fs, event_bus);
//! let summary = engine.run(vec![DocumentRef::new("ABC123")]).await?;
//! println!("{} documents synced", summary.documents_done());
//! ```

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use bridge_traits::error::BridgeError;
use bridge_traits::storage::{ContentExporter, FileSystemAccess, RevisionSource};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};

use crate::document::{resolve_reference, DocumentRef};
use crate::error::{Result, SyncError};
use crate::filter::{filter_revisions, Granularity, RetainedRevision};
use crate::job::{DocumentJob, DocumentPhase};
use crate::vault::{folder_name, RevisionVault};

/// Default number of concurrent revision downloads per document.
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 4;

/// Upper bound on concurrent revision downloads per document.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 8;

// ============================================================================
// Configuration
// ============================================================================

/// Run-wide sync settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root directory snapshots are written under.
    pub output_dir: PathBuf,
    /// Granularity applied to documents that do not set their own.
    pub granularity: Granularity,
    /// Concurrent downloads per document, clamped to
    /// `1..=MAX_CONCURRENT_DOWNLOADS`.
    pub max_concurrent_downloads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("revisions"),
            granularity: Granularity::All,
            max_concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
        }
    }
}

fn download_permits(config: &SyncConfig) -> usize {
    config.max_concurrent_downloads.clamp(1, MAX_CONCURRENT_DOWNLOADS)
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one revision download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Success,
    Skipped { reason: String },
    Failed { reason: String },
}

/// One revision's download record.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub revision_id: String,
    pub modified_at: DateTime<Utc>,
    pub outcome: DownloadOutcome,
    /// Path written, present only on success.
    pub path: Option<PathBuf>,
}

/// Aggregate result of a sync or export run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub documents: Vec<DocumentJob>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn documents_done(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.phase == DocumentPhase::Done)
            .count()
    }

    pub fn documents_failed(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.phase == DocumentPhase::Failed)
            .count()
    }

    /// True when any document failed outright or finished with failed
    /// revisions.
    pub fn has_failures(&self) -> bool {
        self.documents
            .iter()
            .any(|d| d.phase == DocumentPhase::Failed || d.stats.failed > 0)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Drives sync runs over the revision source and vault.
pub struct SyncEngine {
    config: SyncConfig,
    revision_source: Arc<dyn RevisionSource>,
    exporter: Arc<dyn ContentExporter>,
    vault: Arc<RevisionVault>,
    event_bus: EventBus,
    cancellation_token: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        revision_source: Arc<dyn RevisionSource>,
        exporter: Arc<dyn ContentExporter>,
        file_system: Arc<dyn FileSystemAccess>,
        event_bus: EventBus,
    ) -> Self {
        let vault = Arc::new(RevisionVault::new(file_system, config.output_dir.clone()));
        Self {
            config,
            revision_source,
            exporter,
            vault,
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Token observed between documents and before each download. Cancel it
    /// to wind the run down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Synchronizes revision histories for the given documents.
    ///
    /// Document-level problems (bad reference, missing document, denied
    /// access) mark that document failed and the run continues. Only an
    /// unrecoverable authorization failure aborts the whole run.
    pub async fn run(&self, documents: Vec<DocumentRef>) -> Result<RunSummary> {
        self.process_documents(documents, false).await
    }

    /// Exports the current content of each document instead of its history.
    pub async fn export_documents(&self, documents: Vec<DocumentRef>) -> Result<RunSummary> {
        self.process_documents(documents, true).await
    }

    #[instrument(skip(self, documents), fields(document_count = documents.len()))]
    async fn process_documents(
        &self,
        documents: Vec<DocumentRef>,
        export_only: bool,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(
            "Starting {} run {} over {} documents",
            if export_only { "export" } else { "sync" },
            run_id,
            documents.len()
        );
        self.emit(SyncEvent::RunStarted {
            run_id: run_id.clone(),
            document_count: documents.len(),
        });

        let mut jobs = Vec::with_capacity(documents.len());
        for document in &documents {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            self.emit(SyncEvent::DocumentStarted {
                reference: document.reference.clone(),
            });

            let job = if export_only {
                self.export_document(document).await
            } else {
                self.sync_document(document).await
            };

            match job {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    self.emit(SyncEvent::DocumentFailed {
                        reference: document.reference.clone(),
                        reason: e.to_string(),
                    });
                    error!("Run {} aborted: {}", run_id, e);
                    return Err(e);
                }
            }
        }

        let summary = RunSummary {
            run_id: run_id.clone(),
            documents: jobs,
            cancelled: self.cancellation_token.is_cancelled(),
        };

        if summary.cancelled {
            warn!(
                "Run {} cancelled after {} documents",
                run_id,
                summary.documents.len()
            );
            self.emit(SyncEvent::RunCancelled { run_id });
        } else {
            info!(
                "Run {} finished: {} done, {} failed in {}s",
                run_id,
                summary.documents_done(),
                summary.documents_failed(),
                started.elapsed().as_secs()
            );
            self.emit(SyncEvent::RunCompleted {
                run_id,
                documents_done: summary.documents_done(),
                documents_failed: summary.documents_failed(),
                duration_secs: started.elapsed().as_secs(),
            });
        }

        Ok(summary)
    }

    #[instrument(skip(self, document), fields(reference = %document.reference))]
    async fn sync_document(&self, document: &DocumentRef) -> Result<DocumentJob> {
        let job = DocumentJob::new(document.reference.clone());

        let document_id = match resolve_reference(&document.reference) {
            Ok(id) => id,
            Err(e) => return Ok(self.fail_job(job, e.to_string())),
        };
        let job = job.resolved(document_id.clone())?;
        self.emit_phase(&document_id, DocumentPhase::Listing);

        if self.cancellation_token.is_cancelled() {
            return Ok(self.fail_job(job, SyncError::Cancelled.to_string()));
        }

        let revisions = match self.revision_source.list_revisions(&document_id).await {
            Ok(revisions) => revisions,
            Err(BridgeError::Unauthorized) => return Err(SyncError::AuthExpired),
            Err(e) => return Ok(self.fail_job(job, e.to_string())),
        };
        let job = job.listed(revisions.len())?;
        self.emit_phase(&document_id, DocumentPhase::Filtering);

        let granularity = document.granularity.unwrap_or(self.config.granularity);
        let retained = filter_revisions(revisions, granularity);
        let mut job = job.filtered(retained.len())?;
        self.emit(SyncEvent::RevisionsSelected {
            document_id: document_id.clone(),
            listed: job.stats.revisions_listed,
            retained: job.stats.revisions_retained,
        });
        info!(
            "Document {}: {} of {} revisions retained at {} granularity",
            document_id, job.stats.revisions_retained, job.stats.revisions_listed, granularity
        );
        self.emit_phase(&document_id, DocumentPhase::Downloading);

        let folder = folder_name(document.display_name.as_deref(), &document_id);
        let outcomes = self
            .download_revisions(&document_id, &folder, retained)
            .await?;
        let issued = outcomes.len();

        for result in &outcomes {
            let outcome_label = match &result.outcome {
                DownloadOutcome::Success => {
                    job.record_downloaded()?;
                    "success"
                }
                DownloadOutcome::Skipped { reason } => {
                    debug!("Revision {} skipped: {}", result.revision_id, reason);
                    job.record_skipped()?;
                    "skipped"
                }
                DownloadOutcome::Failed { reason } => {
                    warn!("Revision {} failed: {}", result.revision_id, reason);
                    job.record_failed()?;
                    "failed"
                }
            };
            self.emit(SyncEvent::RevisionFinished {
                document_id: document_id.clone(),
                revision_id: result.revision_id.clone(),
                outcome: outcome_label.to_string(),
            });
        }

        if issued < job.stats.revisions_retained {
            let reason = if self.cancellation_token.is_cancelled() {
                SyncError::Cancelled.to_string()
            } else {
                "Download task aborted".to_string()
            };
            return Ok(self.fail_job(job, reason));
        }

        let job = job.done()?;
        self.emit(SyncEvent::DocumentCompleted {
            document_id: document_id.clone(),
            downloaded: job.stats.downloaded,
            skipped: job.stats.skipped,
            failed: job.stats.failed,
        });
        info!(
            "Document {} done: {} downloaded, {} skipped, {} failed",
            document_id, job.stats.downloaded, job.stats.skipped, job.stats.failed
        );
        Ok(job)
    }

    #[instrument(skip(self, document), fields(reference = %document.reference))]
    async fn export_document(&self, document: &DocumentRef) -> Result<DocumentJob> {
        let job = DocumentJob::new(document.reference.clone());

        let document_id = match resolve_reference(&document.reference) {
            Ok(id) => id,
            Err(e) => return Ok(self.fail_job(job, e.to_string())),
        };
        let job = job.resolved(document_id.clone())?;

        if self.cancellation_token.is_cancelled() {
            return Ok(self.fail_job(job, SyncError::Cancelled.to_string()));
        }

        // Title lookup is best effort; the export itself reports real errors.
        if let Ok(info) = self.exporter.document_info(&document_id).await {
            debug!("Exporting '{}' ({})", info.name, info.mime_type);
        }

        let mut job = job.listed(1)?.filtered(1)?;
        self.emit_phase(&document_id, DocumentPhase::Downloading);

        let folder = folder_name(document.display_name.as_deref(), &document_id);
        let content = match self.exporter.export_current_text(&document_id).await {
            Ok(content) => content,
            Err(BridgeError::Unauthorized) => return Err(SyncError::AuthExpired),
            Err(e) => return Ok(self.fail_job(job, e.to_string())),
        };

        let path = match self.vault.persist_current(&folder, content).await {
            Ok(path) => path,
            Err(e) => return Ok(self.fail_job(job, format!("Write failed: {}", e))),
        };

        job.record_downloaded()?;
        self.emit(SyncEvent::RevisionFinished {
            document_id: document_id.clone(),
            revision_id: "current".to_string(),
            outcome: "success".to_string(),
        });
        info!("Exported {} to {}", document_id, path.display());

        let job = job.done()?;
        self.emit(SyncEvent::DocumentCompleted {
            document_id,
            downloaded: job.stats.downloaded,
            skipped: job.stats.skipped,
            failed: job.stats.failed,
        });
        Ok(job)
    }

    /// Downloads retained revisions with bounded concurrency, preserving the
    /// input order in the returned results.
    async fn download_revisions(
        &self,
        document_id: &str,
        folder: &str,
        retained: Vec<RetainedRevision>,
    ) -> Result<Vec<DownloadResult>> {
        let semaphore = Arc::new(Semaphore::new(download_permits(&self.config)));
        let mut tasks = JoinSet::new();

        for (index, item) in retained.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let source = Arc::clone(&self.revision_source);
            let vault = Arc::clone(&self.vault);
            let document_id = document_id.to_string();
            let folder = folder.to_string();

            tasks.spawn(async move {
                let _permit = permit;
                (index, download_one(source, vault, document_id, folder, item).await)
            });
        }

        let mut indexed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(e) => warn!("Download task did not complete: {}", e),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let mut results = Vec::with_capacity(indexed.len());
        for (_, result) in indexed {
            results.push(result?);
        }
        Ok(results)
    }

    fn fail_job(&self, job: DocumentJob, reason: impl Into<String>) -> DocumentJob {
        let reason = reason.into();
        warn!("Document {} failed: {}", job.reference, reason);
        self.emit(SyncEvent::DocumentFailed {
            reference: job.reference.clone(),
            reason: reason.clone(),
        });
        match job.clone().fail(reason) {
            Ok(failed) => failed,
            Err(e) => {
                warn!("Could not mark document as failed: {}", e);
                job
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }

    fn emit_phase(&self, document_id: &str, phase: DocumentPhase) {
        self.emit(SyncEvent::DocumentPhase {
            document_id: document_id.to_string(),
            phase: phase.to_string(),
        });
    }
}

/// Fetches one revision's plain text and persists it.
///
/// Runs as a spawned task, so it takes owned handles rather than borrowing
/// the engine. An authorization failure is the only error that escapes; all
/// other problems are folded into the returned outcome.
async fn download_one(
    source: Arc<dyn RevisionSource>,
    vault: Arc<RevisionVault>,
    document_id: String,
    folder: String,
    item: RetainedRevision,
) -> Result<DownloadResult> {
    let modified_at = item.revision.modified_at;
    let revision_id = item.revision.revision_id;

    let (outcome, path) = match source.fetch_revision_text(&document_id, &revision_id).await {
        Ok(Some(content)) => match vault.persist(&folder, modified_at, content).await {
            Ok(Some(path)) => (DownloadOutcome::Success, Some(path)),
            Ok(None) => (
                DownloadOutcome::Skipped {
                    reason: "duplicate snapshot timestamp".to_string(),
                },
                None,
            ),
            Err(e) => (
                DownloadOutcome::Failed {
                    reason: format!("Write failed: {}", e),
                },
                None,
            ),
        },
        Ok(None) => (
            DownloadOutcome::Skipped {
                reason: "no plain-text export".to_string(),
            },
            None,
        ),
        Err(BridgeError::Unauthorized) => return Err(SyncError::AuthExpired),
        Err(e) => (
            DownloadOutcome::Failed {
                reason: e.to_string(),
            },
            None,
        ),
    };

    Ok(DownloadResult {
        revision_id,
        modified_at,
        outcome,
        path,
    })
}

// ============================================================================
// Tests
// ============================================================================
