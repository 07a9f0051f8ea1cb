//! Google Drive API client.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use drivesync_common::{Error, RemoteFileRef, Result};

use crate::credentials::TokenManager;
use crate::provider::{FileQuery, StorageBackend};

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields requested for single-file responses.
const FILE_FIELDS: &str = "id,name";
/// Fields requested for list responses.
const LIST_FIELDS: &str = "nextPageToken, files(id, name)";

/// Largest page Drive accepts for `files.list`.
const MAX_PAGE_SIZE: usize = 1000;

/// Uploads above this size use a resumable session instead of a single request.
const SIMPLE_UPLOAD_LIMIT: usize = 5 * 1024 * 1024;

/// Chunk size for resumable uploads (must be a multiple of 256KB).
const CHUNK_SIZE: usize = 8 * 256 * 1024; // 2MB

const MULTIPART_BOUNDARY: &str = "DriveSyncBoundary";

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RemoteFileRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Google Drive API client.
pub struct DriveClient {
    http: Client,
    token_manager: Arc<TokenManager>,
}

impl DriveClient {
    /// Create a new Drive client.
    pub fn new(token_manager: Arc<TokenManager>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Remote(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token_manager,
        })
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.token_manager.access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    /// Create a file with a single multipart request.
    async fn create_multipart(
        &self,
        name: &str,
        parent_id: &str,
        data: Vec<u8>,
    ) -> Result<RemoteFileRef> {
        let url = format!("{}/files", DRIVE_UPLOAD_BASE);
        let auth = self.auth_header().await?;

        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id]
        });
        let body = multipart_body(&metadata, &data)?;

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("Failed to upload file: {}", e)))?;

        self.handle_response(response).await
    }

    /// Replace file content with a single media request.
    async fn update_media(&self, file_id: &str, data: Vec<u8>) -> Result<RemoteFileRef> {
        let url = format!("{}/files/{}", DRIVE_UPLOAD_BASE, file_id);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .patch(&url)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("Failed to update file: {}", e)))?;

        self.handle_response(response).await
    }

    /// Start a resumable upload session and return its upload URI.
    async fn start_resumable_upload(
        &self,
        method: Method,
        url: &str,
        metadata: serde_json::Value,
        total_size: usize,
    ) -> Result<String> {
        let auth = self.auth_header().await?;

        let response = self
            .http
            .request(method, url)
            .header(header::AUTHORIZATION, auth)
            .header("X-Upload-Content-Length", total_size.to_string())
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("Failed to start resumable upload: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }

        // Extract upload URI from Location header
        let upload_uri = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| Error::Remote("No upload URI in response".to_string()))?
            .to_str()
            .map_err(|e| Error::Remote(format!("Invalid upload URI: {}", e)))?
            .to_string();

        Ok(upload_uri)
    }

    /// Upload a chunk to a resumable upload session.
    ///
    /// Returns the file once the final chunk has been accepted.
    async fn upload_chunk(
        &self,
        upload_uri: &str,
        data: &[u8],
        start_byte: usize,
        total_size: usize,
    ) -> Result<Option<RemoteFileRef>> {
        let response = self
            .http
            .put(upload_uri)
            .header(header::CONTENT_LENGTH, data.len().to_string())
            .header(
                header::CONTENT_RANGE,
                content_range(start_byte, data.len(), total_size),
            )
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| Error::Remote(format!("Failed to upload chunk: {}", e)))?;

        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::CREATED {
            let file = response
                .json()
                .await
                .map_err(|e| Error::Remote(format!("Failed to parse upload response: {}", e)))?;
            Ok(Some(file))
        } else if status == StatusCode::PERMANENT_REDIRECT {
            // More chunks needed (308 Resume Incomplete)
            Ok(None)
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    /// Upload `data` through a resumable session.
    async fn upload_resumable(
        &self,
        method: Method,
        url: &str,
        metadata: serde_json::Value,
        data: &[u8],
    ) -> Result<RemoteFileRef> {
        let upload_uri = self
            .start_resumable_upload(method, url, metadata, data.len())
            .await?;

        let mut offset = 0;
        for chunk in data.chunks(CHUNK_SIZE) {
            debug!(offset, total = data.len(), "Uploading chunk");
            if let Some(file) = self
                .upload_chunk(&upload_uri, chunk, offset, data.len())
                .await?
            {
                return Ok(file);
            }
            offset += chunk.len();
        }

        Err(Error::Remote("Upload did not complete".to_string()))
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Remote(format!("Failed to parse response: {}", e)))
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    async fn error_from_response(&self, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error_for_status(status, &body)
    }
}

#[async_trait]
impl StorageBackend for DriveClient {
    fn name(&self) -> &str {
        "gdrive"
    }

    async fn list(&self, query: &FileQuery, limit: usize) -> Result<Vec<RemoteFileRef>> {
        let url = format!("{}/files", DRIVE_API_BASE);
        let q = query.to_drive_query();
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        while files.len() < limit {
            let page_size = (limit - files.len()).min(MAX_PAGE_SIZE).to_string();
            let auth = self.auth_header().await?;

            let mut request = self
                .http
                .get(&url)
                .header(header::AUTHORIZATION, auth)
                .query(&[
                    ("q", q.as_str()),
                    ("spaces", "drive"),
                    ("fields", LIST_FIELDS),
                    ("pageSize", page_size.as_str()),
                ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Remote(format!("Failed to list files: {}", e)))?;

            let page: FileListResponse = self.handle_response(response).await?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        files.truncate(limit);
        Ok(files)
    }

    async fn create(&self, name: &str, parent_id: &str, content: Vec<u8>) -> Result<RemoteFileRef> {
        if content.len() <= SIMPLE_UPLOAD_LIMIT {
            return self.create_multipart(name, parent_id, content).await;
        }

        let url = format!("{}/files", DRIVE_UPLOAD_BASE);
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id]
        });
        self.upload_resumable(Method::POST, &url, metadata, &content)
            .await
    }

    async fn update(&self, file_id: &str, content: Vec<u8>) -> Result<RemoteFileRef> {
        if content.len() <= SIMPLE_UPLOAD_LIMIT {
            return self.update_media(file_id, content).await;
        }

        let url = format!("{}/files/{}", DRIVE_UPLOAD_BASE, file_id);
        self.upload_resumable(Method::PATCH, &url, serde_json::json!({}), &content)
            .await
    }
}

/// Build a `multipart/related` body holding JSON metadata and raw content.
fn multipart_body(metadata: &serde_json::Value, data: &[u8]) -> Result<Vec<u8>> {
    let metadata_json = serde_json::to_string(metadata)
        .map_err(|e| Error::Serialization(format!("Failed to serialize metadata: {}", e)))?;

    let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);

    // Metadata part
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(b"\r\n");

    // Data part
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");

    // End boundary
    body.extend_from_slice(format!("--{}--", MULTIPART_BOUNDARY).as_bytes());

    Ok(body)
}

fn content_range(start: usize, len: usize, total: usize) -> String {
    format!("bytes {}-{}/{}", start, start + len - 1, total)
}

/// Map a failed Drive response to the error taxonomy.
fn error_for_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::Authentication("Invalid or expired token".to_string()),
        StatusCode::FORBIDDEN => Error::PermissionDenied(format!("Access denied: {}", body)),
        StatusCode::NOT_FOUND => Error::NotFound(format!("Resource not found: {}", body)),
        _ => Error::Remote(format!("API error: {} - {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_list_response_parsing() {
        let json = r#"{
            "nextPageToken": "page2",
            "files": [
                {"id": "X", "name": "report.csv"},
                {"id": "Y", "name": "notes.txt"}
            ]
        }"#;

        let response: FileListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.next_page_token.as_deref(), Some("page2"));
        assert_eq!(response.files[0], RemoteFileRef::new("X", "report.csv"));
        assert_eq!(response.files.len(), 2);
    }

    #[test]
    fn test_empty_list_response() {
        let response: FileListResponse = serde_json::from_str("{}").unwrap();
        assert!(response.files.is_empty());
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn test_multipart_body_layout() {
        let metadata = serde_json::json!({"name": "a.txt", "parents": ["folder"]});
        let body = multipart_body(&metadata, b"payload").unwrap();
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--DriveSyncBoundary\r\n"));
        assert!(text.contains(r#""parents":["folder"]"#));
        assert!(text.contains("application/octet-stream\r\n\r\npayload\r\n"));
        assert!(text.ends_with("--DriveSyncBoundary--"));
    }

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(0, CHUNK_SIZE, 5_000_000), "bytes 0-2097151/5000000");
        assert_eq!(content_range(4_194_304, 805_696, 5_000_000), "bytes 4194304-4999999/5000000");
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, "storageQuotaExceeded"),
            Error::PermissionDenied(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, ""),
            Error::NotFound(_)
        ));

        let err = error_for_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(err.is_remote());
        assert!(err.to_string().contains("boom"));
    }
}
