// API client module: a small blocking HTTP client for the Google Drive v3
// API. It implements `RemoteStore` (folder creation and resumable file
// upload) and offers the folder listing used to check credentials.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{AuthError, RemoteError};
use crate::store::{ContainerId, RemoteStore};

const TRACING_TARGET: &str = "gdrive_upload_helper::api";

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Resumable chunks must be a multiple of 256 KiB.
pub const CHUNK_SIZE: usize = 32 * 256 * 1024;

const QUOTA_PROJECT_HEADER: &str = "x-goog-user-project";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Anything that can hand out a bearer token for the Drive API.
pub trait TokenSource {
    fn access_token(&self) -> Result<String, AuthError>;
}

/// Drive API client holding the reqwest blocking client, the API base URL,
/// a token source and the optional quota project billed for the calls.
pub struct DriveClient {
    client: Client,
    base_url: String,
    tokens: Box<dyn TokenSource>,
    quota_project: Option<String>,
    chunk_size: usize,
}

/// Metadata sent when creating a file or folder.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: [&'a str; 1],
}

#[derive(Deserialize, Debug)]
struct CreatedFile {
    id: String,
}

/// One entry of a folder listing.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Google's JSON error envelope: `{"error": {"code": .., "message": ..}}`.
#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    message: String,
}

impl DriveClient {
    /// Create a client for `DRIVE_API_URL`, falling back to the public
    /// Google endpoint.
    pub fn from_env(tokens: Box<dyn TokenSource>) -> Result<Self, RemoteError> {
        let base_url = std::env::var("DRIVE_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Self::new(base_url, tokens)
    }

    pub fn new(base_url: impl Into<String>, tokens: Box<dyn TokenSource>) -> Result<Self, RemoteError> {
        // Resumable uploads answer 308 without a Location; never follow it.
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(base_url, tokens, client))
    }

    fn with_client(base_url: impl Into<String>, tokens: Box<dyn TokenSource>, client: Client) -> Self {
        DriveClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            quota_project: None,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Bill API usage to `project` (sent as `x-goog-user-project`).
    pub fn with_quota_project(mut self, project: Option<String>) -> Self {
        self.quota_project = project.filter(|p| !p.is_empty());
        self
    }

    /// Override the resumable chunk size, rounded down to a 256 KiB multiple.
    #[cfg(test)]
    fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = (chunk_size / (256 * 1024)).max(1) * 256 * 1024;
        self
    }

    /// List up to `page_size` direct children of `folder`.
    pub fn list_children(&self, folder: &ContainerId, page_size: u32) -> Result<Vec<DriveFile>, RemoteError> {
        let url = format!("{}/drive/v3/files", self.base_url);
        let query = format!("'{}' in parents", folder.as_str().replace('\'', "\\'"));
        let page_size = page_size.to_string();
        let res = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .query(&[
                ("q", query.as_str()),
                ("pageSize", page_size.as_str()),
                ("fields", "files(id,name,mimeType)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()?;
        let list: FileList = check(res)?.json()?;
        debug!(target: TRACING_TARGET, folder_id = %folder, count = list.files.len(), "listed folder");
        Ok(list.files)
    }

    /// Authorization and quota project headers for the next request.
    fn auth_headers(&self) -> Result<HeaderMap, RemoteError> {
        let token = self.tokens.access_token()?;
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| RemoteError::Protocol("access token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        if let Some(project) = &self.quota_project {
            let value = HeaderValue::from_str(project)
                .map_err(|_| RemoteError::Protocol(format!("invalid quota project '{project}'")))?;
            headers.insert(QUOTA_PROJECT_HEADER, value);
        }
        Ok(headers)
    }

    /// Open a resumable upload session and return its URI.
    fn start_session(&self, name: &str, parent: &ContainerId, total: u64) -> Result<String, RemoteError> {
        let url = format!("{}/upload/drive/v3/files", self.base_url);
        let meta = FileMetadata {
            name,
            mime_type: None,
            parents: [parent.as_str()],
        };
        let res = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .query(&[("uploadType", "resumable"), ("fields", "id"), ("supportsAllDrives", "true")])
            .header("X-Upload-Content-Length", total.to_string())
            .json(&meta)
            .send()?;
        let res = check(res)?;
        res.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Protocol("resumable session has no Location header".into()))
    }

    /// Send one chunk (or the empty body of a zero-byte file) to the session.
    fn put_chunk(&self, session: &str, body: Vec<u8>, content_range: String) -> Result<Response, RemoteError> {
        let res = self
            .client
            .put(session)
            .headers(self.auth_headers()?)
            .header(CONTENT_RANGE, content_range.as_str())
            .body(body)
            .send()?;
        trace!(target: TRACING_TARGET, %content_range, status = res.status().as_u16(), "sent chunk");
        Ok(res)
    }
}

impl RemoteStore for DriveClient {
    fn create_container(&self, name: &str, parent: &ContainerId) -> Result<ContainerId, RemoteError> {
        let url = format!("{}/drive/v3/files", self.base_url);
        let meta = FileMetadata {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: [parent.as_str()],
        };
        let res = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&meta)
            .send()?;
        let created: CreatedFile = check(res)?.json()?;
        debug!(target: TRACING_TARGET, name, parent_id = %parent, folder_id = %created.id, "created folder");
        Ok(ContainerId::new(created.id))
    }

    fn upload_file(&self, path: &Path, parent: &ContainerId) -> Result<(), RemoteError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RemoteError::Protocol(format!("{} has no file name", path.display())))?;
        let mut file = File::open(path)?;
        let total = file.metadata()?.len();

        let session = self.start_session(&name, parent, total)?;
        debug!(target: TRACING_TARGET, name, total, "opened upload session");

        if total == 0 {
            let res = self.put_chunk(&session, Vec::new(), "bytes */0".to_string())?;
            check(res)?;
            return Ok(());
        }

        let mut offset = 0u64;
        loop {
            if offset >= total {
                return Err(RemoteError::Protocol(format!(
                    "server kept all {total} bytes of {} but did not finish the upload",
                    path.display()
                )));
            }
            file.seek(SeekFrom::Start(offset))?;
            // Never send past the length announced when the session opened,
            // even if the file grew since.
            let limit = (self.chunk_size as u64).min(total - offset);
            let mut chunk = Vec::with_capacity(limit as usize);
            (&mut file).take(limit).read_to_end(&mut chunk)?;
            if chunk.is_empty() {
                return Err(RemoteError::Protocol(format!(
                    "{} shrank to {offset} bytes during upload",
                    path.display()
                )));
            }

            let end = offset + chunk.len() as u64 - 1;
            let res = self.put_chunk(&session, chunk, content_range(offset, end, total))?;
            match res.status() {
                StatusCode::OK | StatusCode::CREATED => return Ok(()),
                StatusCode::PERMANENT_REDIRECT => {
                    // The server reports what it kept; resume right after it.
                    let next = res
                        .headers()
                        .get(RANGE)
                        .and_then(|v| v.to_str().ok())
                        .and_then(last_received_byte)
                        .map_or(0, |last| last + 1);
                    if next <= offset {
                        return Err(RemoteError::Protocol(format!(
                            "upload of {} stalled at byte {offset}",
                            path.display()
                        )));
                    }
                    offset = next;
                }
                status => {
                    check(res)?;
                    return Err(RemoteError::Protocol(format!("unexpected upload status {status}")));
                }
            }
        }
    }
}

/// `Content-Range` value for bytes `start..=end` of a `total`-byte file.
fn content_range(start: u64, end: u64, total: u64) -> String {
    format!("bytes {start}-{end}/{total}")
}

/// Parse the `Range: bytes=0-<last>` header of a 308 answer.
fn last_received_byte(range: &str) -> Option<u64> {
    let (_, last) = range.strip_prefix("bytes=")?.split_once('-')?;
    last.trim().parse().ok()
}

/// Turn a non-success response into `RemoteError::Api`.
fn check(res: Response) -> Result<Response, RemoteError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

fn api_error(status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| env.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    RemoteError::Api { status, message }
}
