//! # Revsync CLI
//!
//! Command-line front end for the revision sync engine. Wires the desktop
//! bridge implementations (reqwest transport, tokio file system) into the
//! credential provider, the Drive client, and the sync engine, then renders
//! engine events as progress output.
//!
//! Exit codes: `0` on full success, `1` on fatal errors (bad arguments,
//! authorization failure), `2` when the run finished but some documents
//! failed or the run was cancelled.

mod cli;
mod config;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
use bridge_traits::auth::TokenSource;
use bridge_traits::http::HttpClient;
use bridge_traits::storage::{ContentExporter, FileSystemAccess, RevisionSource};
use core_auth::{CachedTokens, ClientSecrets, CredentialProvider};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::{init_logging, LoggingConfig};
use core_sync::{DocumentPhase, DocumentRef, Granularity, RunSummary, SyncConfig, SyncEngine};
use provider_drive::{DriveRevisionClient, DRIVE_READONLY_SCOPE};

use crate::cli::{AuthArgs, Cli, Command, ExportArgs, SyncArgs};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli) {
        eprintln!("revsync: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("revsync: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let mut logging = LoggingConfig::default().with_level(level);
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    init_logging(logging).context("Failed to initialize logging")
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Sync(args) => run_sync(&config, args).await,
        Command::Export(args) => run_export(&config, args).await,
        Command::Auth(args) => run_auth(&config, args).await,
    }
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_sync(config: &AppConfig, args: SyncArgs) -> Result<ExitCode> {
    let documents = collect_documents(&args.references, args.name.as_deref(), config)?;
    let documents = apply_granularity_override(documents, args.granularity);

    let sync_config = SyncConfig {
        output_dir: args.output.unwrap_or_else(|| config.sync.output_dir.clone()),
        granularity: args.granularity.unwrap_or(config.sync.granularity),
        max_concurrent_downloads: args
            .concurrency
            .unwrap_or(config.sync.max_concurrent_downloads),
    };

    let context = AppContext::authorize(config, args.auth_timeout_secs, false).await?;
    let engine = context.engine(sync_config);
    watch_ctrl_c(engine.cancellation_token());

    let summary = engine.run(documents).await?;
    drop(engine);
    context.shutdown().await;

    print_summary(&summary);
    Ok(ExitCode::from(exit_code_for(
        summary.cancelled,
        summary.has_failures(),
    )))
}

async fn run_export(config: &AppConfig, args: ExportArgs) -> Result<ExitCode> {
    let documents = collect_documents(&args.references, args.name.as_deref(), config)?;

    let sync_config = SyncConfig {
        output_dir: args.output.unwrap_or_else(|| config.sync.output_dir.clone()),
        ..SyncConfig::default()
    };

    let context = AppContext::authorize(config, args.auth_timeout_secs, false).await?;
    let engine = context.engine(sync_config);
    watch_ctrl_c(engine.cancellation_token());

    let summary = engine.export_documents(documents).await?;
    drop(engine);
    context.shutdown().await;

    print_summary(&summary);
    Ok(ExitCode::from(exit_code_for(
        summary.cancelled,
        summary.has_failures(),
    )))
}

async fn run_auth(config: &AppConfig, args: AuthArgs) -> Result<ExitCode> {
    let context = AppContext::authorize(config, args.auth_timeout_secs, args.force).await?;
    let cache_path = context.token_cache.clone();
    context.shutdown().await;

    println!(
        "Authorization complete; credentials cached at {}",
        cache_path.display()
    );
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Wiring
// ============================================================================

/// Authorized services shared by the subcommands.
struct AppContext {
    token_cache: PathBuf,
    provider: Arc<CredentialProvider>,
    transport: Arc<dyn HttpClient>,
    file_system: Arc<dyn FileSystemAccess>,
    event_bus: EventBus,
    printer: JoinHandle<()>,
}

impl AppContext {
    /// Builds the provider from the configured client secrets and acquires
    /// credentials, running the browser flow when the cache can't help.
    async fn authorize(
        config: &AppConfig,
        timeout_override: Option<u64>,
        force_interactive: bool,
    ) -> Result<Self> {
        let event_bus = EventBus::default();
        let printer = spawn_progress_printer(event_bus.subscribe());

        let transport: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        let file_system: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());

        let secrets_path = config.client_secrets_path().ok_or_else(|| {
            anyhow!(
                "No OAuth client secrets configured; set [auth] client_secrets in the config \
                 file or the {} environment variable",
                config::SECRETS_ENV_VAR
            )
        })?;
        let raw = tokio::fs::read_to_string(&secrets_path)
            .await
            .with_context(|| {
                format!("Could not read client secrets file {}", secrets_path.display())
            })?;
        let secrets = ClientSecrets::from_json(&raw)?;

        let mut provider = CredentialProvider::new(
            secrets,
            vec![DRIVE_READONLY_SCOPE.to_string()],
            Arc::clone(&transport),
            event_bus.clone(),
        );

        let token_cache = config.token_cache_path();
        if force_interactive {
            debug!("Skipping token cache, interactive flow forced");
        } else if let Some(cache) = load_token_cache(&token_cache).await {
            provider = provider.with_cached_tokens(cache);
        }

        let wait = Duration::from_secs(timeout_override.unwrap_or(config.auth.flow_timeout_secs));
        provider.acquire(wait).await.context("Authorization failed")?;

        Ok(Self {
            token_cache,
            provider: Arc::new(provider),
            transport,
            file_system,
            event_bus,
            printer,
        })
    }

    /// Assembles a sync engine over the Drive client.
    fn engine(&self, sync_config: SyncConfig) -> SyncEngine {
        let drive = Arc::new(DriveRevisionClient::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.provider) as Arc<dyn TokenSource>,
        ));
        SyncEngine::new(
            sync_config,
            Arc::clone(&drive) as Arc<dyn RevisionSource>,
            drive as Arc<dyn ContentExporter>,
            Arc::clone(&self.file_system),
            self.event_bus.clone(),
        )
    }

    /// Persists refreshed tokens, then drops all event senders so the
    /// progress printer can drain and finish.
    async fn shutdown(self) {
        persist_token_cache(&self.token_cache, &self.provider).await;

        let AppContext {
            provider,
            transport,
            event_bus,
            printer,
            ..
        } = self;
        drop(provider);
        drop(transport);
        drop(event_bus);
        let _ = printer.await;
    }
}

fn watch_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received; letting in-flight downloads finish");
            token.cancel();
        }
    });
}

// ============================================================================
// Document selection
// ============================================================================

/// Command-line references win over the config file's document list.
fn collect_documents(
    references: &[String],
    name: Option<&str>,
    config: &AppConfig,
) -> Result<Vec<DocumentRef>> {
    if references.is_empty() {
        let documents: Vec<DocumentRef> = config
            .documents
            .iter()
            .map(|entry| {
                let mut document = DocumentRef::new(entry.reference.clone());
                if let Some(name) = &entry.name {
                    document = document.with_display_name(name.clone());
                }
                if let Some(granularity) = entry.granularity {
                    document = document.with_granularity(granularity);
                }
                document
            })
            .collect();

        if documents.is_empty() {
            bail!(
                "No documents to process; pass references on the command line or add \
                 [[documents]] entries to the config file"
            );
        }
        return Ok(documents);
    }

    if name.is_some() && references.len() > 1 {
        bail!("--name applies to a single reference");
    }

    Ok(references
        .iter()
        .map(|reference| {
            let mut document = DocumentRef::new(reference.clone());
            if let Some(name) = name {
                document = document.with_display_name(name.to_string());
            }
            document
        })
        .collect())
}

/// An explicit `--granularity` overrides per-document config entries too.
fn apply_granularity_override(
    mut documents: Vec<DocumentRef>,
    granularity: Option<Granularity>,
) -> Vec<DocumentRef> {
    if granularity.is_some() {
        for document in &mut documents {
            document.granularity = None;
        }
    }
    documents
}

// ============================================================================
// Token cache
// ============================================================================

async fn load_token_cache(path: &Path) -> Option<CachedTokens> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Could not read token cache {}: {}", path.display(), e);
            return None;
        }
    };
    match CachedTokens::from_json(&raw) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Ignoring malformed token cache {}: {}", path.display(), e);
            None
        }
    }
}

/// Best effort; a failed write costs one browser flow on the next run.
async fn persist_token_cache(path: &Path, provider: &CredentialProvider) {
    let Some(session) = provider.session().await else {
        return;
    };
    let json = match CachedTokens::from_session(&session).to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("Could not serialize token cache: {}", e);
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(
                "Could not create token cache directory {}: {}",
                parent.display(),
                e
            );
            return;
        }
    }
    match tokio::fs::write(path, json).await {
        Ok(()) => debug!("Token cache updated at {}", path.display()),
        Err(e) => warn!("Could not write token cache {}: {}", path.display(), e),
    }
}

// ============================================================================
// Progress output
// ============================================================================

fn spawn_progress_printer(mut events: broadcast::Receiver<CoreEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Progress display dropped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &CoreEvent) {
    match event {
        CoreEvent::Auth(AuthEvent::FlowStarted { auth_url }) => {
            println!("Authorize access in your browser:\n  {}\n", auth_url);
        }
        CoreEvent::Sync(SyncEvent::RunStarted { document_count, .. }) => {
            println!("Processing {} document(s)", document_count);
        }
        CoreEvent::Sync(SyncEvent::DocumentStarted { reference }) => {
            println!("* {}", reference);
        }
        CoreEvent::Sync(SyncEvent::RevisionsSelected {
            listed, retained, ..
        }) => {
            println!("    {} of {} revisions selected", retained, listed);
        }
        CoreEvent::Sync(SyncEvent::RevisionFinished {
            revision_id,
            outcome,
            ..
        }) if outcome != "success" => {
            println!("    revision {} {}", revision_id, outcome);
        }
        CoreEvent::Sync(SyncEvent::DocumentCompleted {
            downloaded,
            skipped,
            failed,
            ..
        }) => {
            println!("    {} downloaded, {} skipped, {} failed", downloaded, skipped, failed);
        }
        CoreEvent::Sync(SyncEvent::DocumentFailed { reason, .. }) => {
            println!("    failed: {}", reason);
        }
        CoreEvent::Sync(SyncEvent::RunCancelled { .. }) => {
            println!("Run cancelled");
        }
        _ => {}
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    for job in &summary.documents {
        let label = job.document_id.as_deref().unwrap_or(job.reference.as_str());
        match job.phase {
            DocumentPhase::Done => println!(
                "  {:<44} {} downloaded, {} skipped, {} failed",
                label, job.stats.downloaded, job.stats.skipped, job.stats.failed
            ),
            DocumentPhase::Failed => println!(
                "  {:<44} FAILED: {}",
                label,
                job.failure.as_deref().unwrap_or("unknown reason")
            ),
            _ => {}
        }
    }
    if summary.cancelled {
        println!("\nRun cancelled before completion");
    }
}

fn exit_code_for(cancelled: bool, has_failures: bool) -> u8 {
    if cancelled || has_failures {
        2
    } else {
        0
    }
}

// ============================================================================
// Tests
// ============================================================================
