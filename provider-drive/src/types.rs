//! Drive API response types
//!
//! Data structures for deserializing revision listing responses (API v2)
//! and file metadata responses (API v3).

use serde::Deserialize;
use std::collections::HashMap;

/// Drive API v2 revision resource
///
/// See: https://developers.google.com/drive/api/v2/reference/revisions
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionResource {
    /// Revision ID
    pub id: String,

    /// Modification time (RFC 3339)
    pub modified_date: String,

    /// Display name of the last modifying user
    #[serde(default)]
    pub last_modifying_user_name: Option<String>,

    /// Export URLs keyed by MIME type (present for editor documents)
    #[serde(default)]
    pub export_links: HashMap<String, String>,
}

/// Drive API v2 revisions.list response
///
/// See: https://developers.google.com/drive/api/v2/reference/revisions/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionListResponse {
    /// Revisions in this page
    #[serde(default)]
    pub items: Vec<RevisionResource>,

    /// Token for the next page
    pub next_page_token: Option<String>,
}

/// Drive API v3 file resource, limited to the fields the engine requests
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    /// File ID
    pub id: String,

    /// File name
    pub name: String,

    /// MIME type
    pub mime_type: String,
}
