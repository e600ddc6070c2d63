//! Drive REST adapter.
//!
//! Lists, uploads and deletes backup files with a bearer access token.

use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::StorageError;
use crate::traits::{EntryKind, RemoteEntry, RemoteStorage};

/// MIME type the Drive API reports for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const PAGE_SIZE: &str = "100";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, createdTime, mimeType)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    created_time: DateTime<Utc>,
    #[serde(default)]
    mime_type: String,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        let kind = if file.mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        RemoteEntry {
            id: file.id,
            name: file.name,
            created_at: file.created_time,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

/// Framing around the file bytes of a `multipart/related` body: the JSON
/// metadata part plus the opening of the media part, and the closing boundary.
fn multipart_frame(boundary: &str, metadata: &serde_json::Value) -> (Bytes, Bytes) {
    let mut head = BytesMut::with_capacity(256);
    head.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    head.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    head.extend_from_slice(metadata.to_string().as_bytes());
    head.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    head.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    let tail = Bytes::from(format!("\r\n--{}--\r\n", boundary));
    (head.freeze(), tail)
}

/// Remote storage backed by the Drive v3 REST API.
#[derive(Debug, Clone)]
pub struct DriveStorage {
    api_base_url: String,
    upload_base_url: String,
    access_token: String,
    parents: Vec<String>,
    client: Client,
}

impl DriveStorage {
    pub fn new(
        api_base_url: impl Into<String>,
        upload_base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            upload_base_url: upload_base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            parents: Vec::new(),
            client: Client::new(),
        }
    }

    /// Only list entries directly inside these folders.
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    fn list_query(&self) -> String {
        if self.parents.is_empty() {
            return "trashed = false".to_string();
        }
        let scope = self
            .parents
            .iter()
            .map(|id| format!("'{}' in parents", id.replace('\\', "\\\\").replace('\'', "\\'")))
            .collect::<Vec<_>>()
            .join(" or ");
        format!("trashed = false and ({})", scope)
    }

    async fn check(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(StorageError::Api {
            operation,
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }
}

fn transport(operation: &'static str) -> impl Fn(reqwest::Error) -> StorageError {
    move |e| StorageError::Transport {
        operation,
        message: e.to_string(),
    }
}

#[async_trait]
impl RemoteStorage for DriveStorage {
    /// GET /files, following `nextPageToken`.
    async fn list(&self) -> Result<Vec<RemoteEntry>, StorageError> {
        let url = format!("{}/files", self.api_base_url);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let q = self.list_query();

        loop {
            let mut query = vec![
                ("q", q.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&query)
                .send()
                .await
                .map_err(transport("list"))?;
            let page: FileList = Self::check("list", response)
                .await?
                .json()
                .await
                .map_err(|e| StorageError::Decode {
                    operation: "list",
                    message: e.to_string(),
                })?;

            entries.extend(page.files.into_iter().map(RemoteEntry::from));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        tracing::debug!(count = entries.len(), "listed remote entries");
        Ok(entries)
    }

    /// POST /files?uploadType=multipart into `folder_id`.
    async fn upload(&self, local_path: &Path, folder_id: &str) -> Result<String, StorageError> {
        let local_error = |e: std::io::Error| StorageError::LocalFile {
            path: local_path.to_path_buf(),
            message: e.to_string(),
        };
        let file = tokio::fs::File::open(local_path).await.map_err(local_error)?;
        let file_len = file.metadata().await.map_err(local_error)?.len();
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapshot.snap".to_string());

        let boundary = format!("vault-backup-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let metadata = serde_json::json!({ "name": name, "parents": [folder_id] });
        let (head, tail) = multipart_frame(&boundary, &metadata);
        let content_length = head.len() as u64 + file_len + tail.len() as u64;

        // The snapshot is streamed from disk, never held in memory whole.
        let body = stream::iter([Ok::<_, std::io::Error>(head)])
            .chain(ReaderStream::new(file))
            .chain(stream::iter([Ok(tail)]));

        let response = self
            .client
            .post(format!("{}/files", self.upload_base_url))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(transport("upload"))?;
        let uploaded: UploadedFile = Self::check("upload", response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Decode {
                operation: "upload",
                message: e.to_string(),
            })?;

        tracing::debug!(name = %name, folder = folder_id, id = %uploaded.id, "uploaded file");
        Ok(uploaded.id)
    }

    /// DELETE /files/{id}
    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(format!("{}/files/{}", self.api_base_url, id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport("delete"))?;
        Self::check("delete", response).await?;
        Ok(())
    }
}
