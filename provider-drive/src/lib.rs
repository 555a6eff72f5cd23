//! # Drive Revision Provider
//!
//! Implements the revision-source and content-export seams against the Drive
//! API.
//!
//! ## Overview
//!
//! This crate provides:
//! - Bearer authentication on every request, with a single synchronized
//!   refresh cycle when the service rejects a token
//! - Rate-limit aware retries (`Retry-After` honored, exponential backoff
//!   otherwise)
//! - Revision enumeration on the legacy v2 endpoints, paginated and sorted
//!   ascending by modification time
//! - Plain-text export of historical revisions and of current content (v3)

pub mod error;
pub mod resilient;
pub mod revisions;
pub mod types;

pub use error::{DriveError, Result};
pub use resilient::ApiClient;
pub use revisions::{DriveRevisionClient, DRIVE_READONLY_SCOPE};
