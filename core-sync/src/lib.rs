//! # Revision Sync Module
//!
//! Orchestrates revision synchronization for cloud documents.
//!
//! ## Overview
//!
//! This module turns a list of document references into folders of plain-text
//! snapshots, including:
//! - Resolving editor URLs and bare identifiers via `resolve_reference`
//! - Listing revision histories through the `RevisionSource` bridge
//! - Thinning histories to one revision per time bucket
//! - Downloading retained revisions with bounded concurrency
//! - Writing snapshots under `{output_dir}/{folder}/{timestamp}.txt`
//!
//! ## Components
//!
//! - **Document Sync State Machine** (`job`): Tracks each document's pipeline with validated phase transitions
//! - **Granularity Filter** (`filter`): Selects the latest revision per hour, day, week, or month
//! - **Document References** (`document`): Reference parsing and per-document overrides
//! - **Revision Vault** (`vault`): Output naming, sanitization, and collision handling
//! - **Sync Engine** (`engine`): Orchestrates the run and reports progress events

pub mod document;
pub mod engine;
pub mod error;
pub mod filter;
pub mod job;
pub mod vault;

pub use document::{resolve_reference, DocumentRef};
pub use engine::{
    DownloadOutcome, DownloadResult, RunSummary, SyncConfig, SyncEngine,
    DEFAULT_CONCURRENT_DOWNLOADS, MAX_CONCURRENT_DOWNLOADS,
};
pub use error::{Result, SyncError};
pub use filter::{filter_revisions, Granularity, RetainedRevision};
pub use job::{DocumentJob, DocumentPhase, DocumentStats};
pub use vault::{folder_name, RevisionVault};
