//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host adapter.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine and everything
//! outside of it: the HTTP transport, the file system, and the hosting API's
//! revision/export surface. Each trait represents a capability the core
//! requires but that is implemented elsewhere (desktop adapters in
//! `bridge-desktop`, the Drive API in `provider-drive`, mocks in tests).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - One async HTTP round trip; retry and
//!   auth live with the caller
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Vault writes and
//!   credential cache reads
//!
//! ### Credentials
//! - [`TokenSource`](auth::TokenSource) - Bearer tokens for API calls and
//!   the single-flight replacement of rejected ones
//!
//! ### Hosting API
//! - [`RevisionSource`](storage::RevisionSource) - Legacy-endpoint revision
//!   listing and per-revision plain-text downloads
//! - [`ContentExporter`](storage::ContentExporter) - Current-endpoint
//!   document metadata and present-content export
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should:
//!
//! - Convert transport- and API-specific errors to `BridgeError`
//! - Preserve the variants the engine routes on (`NotFound`,
//!   `PermissionDenied`, `Unauthorized`, `Http`)
//! - Provide actionable error messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks. Implementations must ensure thread safety.

pub mod auth;
pub mod error;
pub mod http;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use auth::TokenSource;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{
    ContentExporter, DocumentInfo, FileSystemAccess, RevisionMeta, RevisionSource,
};
