//! Drive revision listing and export
//!
//! Implements the `RevisionSource` and `ContentExporter` seams against the
//! Drive API. Revision enumeration still lives on the legacy v2 endpoints,
//! which are the only ones that expose revision history usefully; file
//! metadata and current-content export use v3.

use async_trait::async_trait;
use bridge_traits::auth::TokenSource;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::storage::{ContentExporter, DocumentInfo, RevisionMeta, RevisionSource};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{DriveError, Result};
use crate::resilient::ApiClient;
use crate::types::{FileResource, RevisionListResponse, RevisionResource};

/// Legacy API base URL
const DRIVE_V2_BASE: &str = "https://www.googleapis.com/drive/v2";

/// Current API base URL
const DRIVE_V3_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Maximum results per revision page (API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,mimeType";

/// Export MIME type for snapshot content
const EXPORT_MIME: &str = "text/plain";

/// Content downloads get a longer timeout than metadata requests
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// OAuth scope required for revision listing and content export
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Drive revision client
///
/// # Example
///
/// ```ignore
/// use provider_drive::DriveRevisionClient;
/// use bridge_traits::storage::RevisionSource;
///
/// let client = DriveRevisionClient::new(http_client, tokens);
/// let revisions = client.list_revisions("doc-id").await?;
/// ```
pub struct DriveRevisionClient {
    api: ApiClient,
}

impl DriveRevisionClient {
    /// Create a client with the default retry schedule.
    pub fn new(transport: Arc<dyn HttpClient>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            api: ApiClient::new(transport, tokens),
        }
    }

    /// Replace the retry schedule.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.api = self.api.with_retry_policy(retry);
        self
    }

    /// Map final request errors onto the document they concern.
    fn classify(document_id: &str, error: DriveError) -> DriveError {
        match error {
            DriveError::Api { status: 404, .. } => DriveError::NotFound {
                document_id: document_id.to_string(),
            },
            DriveError::Api { status: 403, .. } => DriveError::PermissionDenied {
                document_id: document_id.to_string(),
            },
            other => other,
        }
    }

    /// Parse an RFC 3339 timestamp into UTC.
    fn parse_timestamp(rfc3339: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(rfc3339)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Convert a wire revision into seam metadata.
    fn convert_revision(item: RevisionResource) -> Result<RevisionMeta> {
        let modified_at = Self::parse_timestamp(&item.modified_date).ok_or_else(|| {
            DriveError::Parse(format!(
                "Bad modifiedDate '{}' on revision {}",
                item.modified_date, item.id
            ))
        })?;

        Ok(RevisionMeta {
            revision_id: item.id,
            modified_at,
            author: item.last_modifying_user_name,
        })
    }

    async fn fetch_revision_page(
        &self,
        document_id: &str,
        page_token: Option<&str>,
    ) -> Result<RevisionListResponse> {
        let mut url = format!(
            "{}/files/{}/revisions?maxResults={}",
            DRIVE_V2_BASE, document_id, MAX_PAGE_SIZE
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let request = HttpRequest::get(url).header("Accept", "application/json");
        let response = self.api.request(request).await?;

        serde_json::from_slice(&response.body)
            .map_err(|e| DriveError::Parse(format!("Failed to parse revision list: {}", e)))
    }

    async fn fetch_revision_meta(
        &self,
        document_id: &str,
        revision_id: &str,
    ) -> Result<RevisionResource> {
        let url = format!(
            "{}/files/{}/revisions/{}",
            DRIVE_V2_BASE, document_id, revision_id
        );

        let request = HttpRequest::get(url).header("Accept", "application/json");
        let response = self.api.request(request).await?;

        serde_json::from_slice(&response.body)
            .map_err(|e| DriveError::Parse(format!("Failed to parse revision metadata: {}", e)))
    }
}

#[async_trait]
impl RevisionSource for DriveRevisionClient {
    #[instrument(skip(self), fields(document_id = %document_id))]
    async fn list_revisions(&self, document_id: &str) -> BridgeResult<Vec<RevisionMeta>> {
        info!("Listing revisions");

        let mut revisions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .fetch_revision_page(document_id, page_token.as_deref())
                .await
                .map_err(|e| Self::classify(document_id, e))?;

            for item in page.items {
                revisions.push(Self::convert_revision(item)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        // The API does not document an ordering guarantee.
        revisions.sort_by(|a, b| a.modified_at.cmp(&b.modified_at));

        info!("Listed {} revisions", revisions.len());
        Ok(revisions)
    }

    #[instrument(skip(self), fields(document_id = %document_id, revision_id = %revision_id))]
    async fn fetch_revision_text(
        &self,
        document_id: &str,
        revision_id: &str,
    ) -> BridgeResult<Option<Bytes>> {
        let meta = self
            .fetch_revision_meta(document_id, revision_id)
            .await
            .map_err(|e| Self::classify(document_id, e))?;

        let Some(link) = meta.export_links.get(EXPORT_MIME) else {
            debug!("No {} export link, skipping revision", EXPORT_MIME);
            return Ok(None);
        };

        let request = HttpRequest::get(link.clone()).timeout(DOWNLOAD_TIMEOUT);
        let response = self
            .api
            .request(request)
            .await
            .map_err(|e| Self::classify(document_id, e))?;

        debug!("Downloaded {} bytes", response.body.len());
        Ok(Some(response.body))
    }
}

#[async_trait]
impl ContentExporter for DriveRevisionClient {
    #[instrument(skip(self), fields(document_id = %document_id))]
    async fn export_current_text(&self, document_id: &str) -> BridgeResult<Bytes> {
        let url = format!(
            "{}/files/{}/export?mimeType={}",
            DRIVE_V3_BASE,
            document_id,
            urlencoding::encode(EXPORT_MIME)
        );

        let request = HttpRequest::get(url).timeout(DOWNLOAD_TIMEOUT);
        let response = self
            .api
            .request(request)
            .await
            .map_err(|e| Self::classify(document_id, e))?;

        debug!("Exported {} bytes", response.body.len());
        Ok(response.body)
    }

    #[instrument(skip(self), fields(document_id = %document_id))]
    async fn document_info(&self, document_id: &str) -> BridgeResult<DocumentInfo> {
        let url = format!("{}/files/{}?fields={}", DRIVE_V3_BASE, document_id, FILE_FIELDS);

        let request = HttpRequest::get(url).header("Accept", "application/json");
        let response = self
            .api
            .request(request)
            .await
            .map_err(|e| Self::classify(document_id, e))?;

        let file: FileResource = serde_json::from_slice(&response.body)
            .map_err(|e| DriveError::Parse(format!("Failed to parse file metadata: {}", e)))?;

        Ok(DocumentInfo {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use chrono::TimeZone;
    use mockall::{mock, Sequence};
    use std::collections::HashMap;

    mock! {
        Transport {}

        #[async_trait::async_trait]
        impl HttpClient for Transport {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<bridge_traits::http::HttpResponse>;
        }
    }

    mock! {
        Tokens {}

        #[async_trait::async_trait]
        impl TokenSource for Tokens {
            async fn access_token(&self) -> BridgeResult<String>;
            async fn refresh_after_unauthorized(&self, stale_token: &str) -> BridgeResult<String>;
        }
    }

    fn static_tokens() -> MockTokens {
        let mut tokens = MockTokens::new();
        tokens
            .expect_access_token()
            .returning(|| Ok("test-token".to_string()));
        tokens
    }

    fn json_response(body: &'static str) -> bridge_traits::http::HttpResponse {
        bridge_traits::http::HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(body),
        }
    }

    fn status_response(status: u16) -> bridge_traits::http::HttpResponse {
        bridge_traits::http::HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    fn client(transport: MockTransport) -> DriveRevisionClient {
        DriveRevisionClient::new(Arc::new(transport), Arc::new(static_tokens()))
    }

    #[test]
    fn test_convert_revision() {
        let item = RevisionResource {
            id: "rev-41".to_string(),
            modified_date: "2025-01-01T10:00:00.000Z".to_string(),
            last_modifying_user_name: Some("Alice".to_string()),
            export_links: HashMap::new(),
        };

        let meta = DriveRevisionClient::convert_revision(item).unwrap();

        assert_eq!(meta.revision_id, "rev-41");
        assert_eq!(
            meta.modified_at,
            Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(meta.author, Some("Alice".to_string()));
    }

    #[test]
    fn test_convert_revision_bad_timestamp() {
        let item = RevisionResource {
            id: "rev-41".to_string(),
            modified_date: "not-a-date".to_string(),
            last_modifying_user_name: None,
            export_links: HashMap::new(),
        };

        let result = DriveRevisionClient::convert_revision(item);

        assert!(matches!(result, Err(DriveError::Parse(_))));
    }

    #[tokio::test]
    async fn test_list_revisions_sorts_ascending() {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).returning(|_| {
            Ok(json_response(
                r#"{
                    "items": [
                        {"id": "rev-2", "modifiedDate": "2025-01-02T09:00:00.000Z"},
                        {"id": "rev-1", "modifiedDate": "2025-01-01T10:00:00.000Z"},
                        {"id": "rev-3", "modifiedDate": "2025-01-02T11:00:00.000Z"}
                    ]
                }"#,
            ))
        });

        let client = client(transport);
        let revisions = client.list_revisions("doc-1").await.unwrap();

        let ids: Vec<&str> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["rev-1", "rev-2", "rev-3"]);
    }

    #[tokio::test]
    async fn test_list_revisions_follows_pagination() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| {
                req.url.contains("/drive/v2/files/doc-1/revisions")
                    && req.url.contains("maxResults=1000")
                    && !req.url.contains("pageToken")
            })
            .returning(|_| {
                Ok(json_response(
                    r#"{
                        "items": [
                            {"id": "rev-1", "modifiedDate": "2025-01-01T10:00:00.000Z"}
                        ],
                        "nextPageToken": "page-2"
                    }"#,
                ))
            });
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.url.contains("pageToken=page-2"))
            .returning(|_| {
                Ok(json_response(
                    r#"{
                        "items": [
                            {"id": "rev-2", "modifiedDate": "2025-01-01T14:00:00.000Z"}
                        ]
                    }"#,
                ))
            });

        let client = client(transport);
        let revisions = client.list_revisions("doc-1").await.unwrap();

        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].revision_id, "rev-1");
        assert_eq!(revisions[1].revision_id, "rev-2");
    }

    #[tokio::test]
    async fn test_list_revisions_not_found() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(status_response(404)));

        let client = client(transport);
        let result = client.list_revisions("missing-doc").await;

        assert!(matches!(
            result,
            Err(BridgeError::NotFound(id)) if id == "missing-doc"
        ));
    }

    #[tokio::test]
    async fn test_list_revisions_permission_denied() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(status_response(403)));

        let client = client(transport);
        let result = client.list_revisions("locked-doc").await;

        assert!(matches!(
            result,
            Err(BridgeError::PermissionDenied(id)) if id == "locked-doc"
        ));
    }

    #[tokio::test]
    async fn test_fetch_revision_text_follows_export_link() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.url.contains("/drive/v2/files/doc-1/revisions/rev-41"))
            .returning(|_| {
                Ok(json_response(
                    r#"{
                        "id": "rev-41",
                        "modifiedDate": "2025-01-01T10:00:00.000Z",
                        "exportLinks": {
                            "text/plain": "https://docs.example.com/export/rev-41?format=txt"
                        }
                    }"#,
                ))
            });
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| {
                req.url == "https://docs.example.com/export/rev-41?format=txt"
                    && req.timeout == Some(Duration::from_secs(60))
            })
            .returning(|_| {
                Ok(bridge_traits::http::HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from("revision body"),
                })
            });

        let client = client(transport);
        let content = client.fetch_revision_text("doc-1", "rev-41").await.unwrap();

        assert_eq!(content, Some(Bytes::from("revision body")));
    }

    #[tokio::test]
    async fn test_fetch_revision_text_without_export_link_skips() {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).returning(|_| {
            Ok(json_response(
                r#"{
                    "id": "rev-7",
                    "modifiedDate": "2025-01-01T10:00:00.000Z",
                    "exportLinks": {
                        "application/pdf": "https://docs.example.com/export/rev-7?format=pdf"
                    }
                }"#,
            ))
        });

        let client = client(transport);
        let content = client.fetch_revision_text("doc-1", "rev-7").await.unwrap();

        assert_eq!(content, None);
    }

    #[tokio::test]
    async fn test_export_current_text() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(|req| {
                req.url
                    .contains("/drive/v3/files/doc-1/export?mimeType=text%2Fplain")
            })
            .returning(|_| {
                Ok(bridge_traits::http::HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from("current content"),
                })
            });

        let client = client(transport);
        let content = client.export_current_text("doc-1").await.unwrap();

        assert_eq!(content, Bytes::from("current content"));
    }

    #[tokio::test]
    async fn test_document_info() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(|req| req.url.contains("/drive/v3/files/doc-1?fields=id,name,mimeType"))
            .returning(|_| {
                Ok(json_response(
                    r#"{
                        "id": "doc-1",
                        "name": "Design Notes",
                        "mimeType": "application/vnd.google-apps.document"
                    }"#,
                ))
            });

        let client = client(transport);
        let info = client.document_info("doc-1").await.unwrap();

        assert_eq!(info.id, "doc-1");
        assert_eq!(info.name, "Design Notes");
        assert_eq!(info.mime_type, "application/vnd.google-apps.document");
    }

    #[tokio::test]
    async fn test_document_info_parse_failure() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response("not json")));

        let client = client(transport);
        let result = client.document_info("doc-1").await;

        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
