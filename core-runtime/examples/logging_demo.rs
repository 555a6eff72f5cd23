//! Logging walkthrough
//!
//! Emits the kinds of records a sync run produces so the three output
//! formats can be compared side by side.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # Compact format
//! cargo run --example logging_demo -- compact
//!
//! # With custom filter
//! cargo run --example logging_demo -- pretty "core_runtime=trace"
//! ```

use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::env;
use std::time::Duration;
use tracing::{debug, error, info, instrument, span, trace, warn, Level};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = args
        .get(1)
        .and_then(|arg| arg.parse::<LogFormat>().ok())
        .unwrap_or_default();
    let filter = args.get(2).cloned();

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(Level::TRACE)
        .with_spans(true)
        .with_target(true);

    if let Some(f) = filter {
        config = config.with_filter(f);
    }

    init_logging(config).expect("Failed to initialize logging");

    info!(format = ?format, "Logging initialized");

    simulate_run().await;
}

/// Walks two documents through the phases a real run goes through,
/// one succeeding and one failing partway.
async fn simulate_run() {
    let span = span!(Level::INFO, "sync_run", run_id = "f81d4fae");
    let _enter = span.enter();

    info!(documents = 2, granularity = "daily", "Run started");

    sync_document("1xK9abcDEF", 150, 12).await;
    sync_failing_document("2bV7ghiJKL").await;

    info!(succeeded = 1, failed = 1, "Run completed");
}

#[instrument(skip(listed, retained))]
async fn sync_document(document_id: &str, listed: usize, retained: usize) {
    info!(phase = "listing", "Phase changed");
    debug!(page = 1, page_size = 1000, "Requesting revision page");
    trace!(revision = "41", "Parsed revision entry");
    tokio::time::sleep(Duration::from_millis(10)).await;

    info!(phase = "filtering", "Phase changed");
    info!(listed, retained, "Revisions selected");

    info!(phase = "downloading", "Phase changed");
    download_revisions(retained).await;

    info!(phase = "done", downloaded = retained - 1, "Document finished");
}

#[instrument(skip(retained), fields(count = retained))]
async fn download_revisions(retained: usize) {
    for n in 1..=retained {
        trace!(revision = n, "Fetching snapshot");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    warn!(revision = "17", "Plain-text export unavailable, skipping");
    debug!(written = retained - 1, "Snapshots written");
}

/// A document that hits a transient status, retries, then fails for good.
async fn sync_failing_document(document_id: &str) {
    let span = span!(Level::INFO, "sync_document", document_id);
    let _enter = span.enter();

    info!(phase = "listing", "Phase changed");
    warn!(
        status = 503,
        attempt = 2,
        delay_ms = 2000,
        "Transient status, retrying"
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    error!(status = 403, "Listing failed");
    info!(phase = "failed", "Document finished");
}
