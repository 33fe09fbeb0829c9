//! Google Drive API v3 client.
//!
//! Used by the Direct access variant with the owner's credential and by the
//! Gateway with its service identity. A 401 is retried once when the
//! credential provider can renew; a second 401 is `AuthenticationExpired`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::auth::AccessTokenProvider;
use crate::classify::FolderContents;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, DriveEntry, FileListResponse, RelayRequest};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Default bound on any single outbound request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ENTRY_FIELDS: &str = "id, name, mimeType, modifiedTime, size, parents, thumbnailLink";
const LIST_FIELDS: &str =
    "nextPageToken, files(id, name, mimeType, modifiedTime, size, parents, thumbnailLink)";

/// Quote a value for use inside a Drive query string literal.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build an HTTP client with the given request timeout.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Turn a non-success response into `DriveError::ApiError`.
pub(crate) async fn api_error(response: Response) -> DriveError {
    let status = response.status();
    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        };
    }
    DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    }
}

/// Client for the Drive files API.
#[derive(Clone)]
pub struct DriveClient {
    api_base: String,
    auth: Arc<dyn AccessTokenProvider>,
    http: Client,
    relay_url: Option<String>,
}

impl DriveClient {
    /// Create a client against the public Drive API.
    pub fn new(auth: Arc<dyn AccessTokenProvider>, http: Client) -> Self {
        Self::with_base(auth, http, DRIVE_API_BASE)
    }

    /// Create a client against a different API base, e.g. a test server.
    pub fn with_base(
        auth: Arc<dyn AccessTokenProvider>,
        http: Client,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            auth,
            http,
            relay_url: None,
        }
    }

    /// Send every request through the Gateway's generic relay at `relay_url`
    /// instead of calling Drive directly.
    pub fn with_relay(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = Some(relay_url.into());
        self
    }

    /// URL of a file's raw content.
    pub fn media_url(&self, file_id: &str) -> String {
        format!("{}/files/{}?alt=media", self.api_base, file_id)
    }

    /// Send a request built by `build`, replaying it once with a renewed
    /// token if Drive answers 401.
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.auth.access_token().await?;
        let response = self.dispatch(build(&token), &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(fresh) = self.auth.renew(&token).await? else {
            return Ok(response);
        };

        let retried = self.dispatch(build(&fresh), &fresh).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("Drive rejected renewed credential");
            return Err(DriveError::AuthenticationExpired);
        }
        Ok(retried)
    }

    async fn dispatch(&self, request: RequestBuilder, token: &str) -> Result<Response> {
        let Some(relay_url) = &self.relay_url else {
            return Ok(request.send().await?);
        };

        let request = request.build()?;
        let body = RelayRequest {
            url: request.url().to_string(),
            method: Some(request.method().to_string()),
            ..Default::default()
        };
        Ok(self
            .http
            .post(relay_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?)
    }

    async fn checked(&self, response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    /// Query files using Google Drive query syntax, following all pages.
    pub async fn query_files(&self, query: &str) -> Result<Vec<DriveEntry>> {
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;
        let url = format!("{}/files", self.api_base);

        loop {
            let response = self
                .send_authorized(|token| {
                    let mut request = self
                        .http
                        .get(&url)
                        .bearer_auth(token)
                        .query(&[
                            ("q", query),
                            ("fields", LIST_FIELDS),
                            ("orderBy", "folder,name"),
                            ("includeItemsFromAllDrives", "true"),
                            ("supportsAllDrives", "true"),
                        ]);
                    if let Some(ref page) = page_token {
                        request = request.query(&[("pageToken", page)]);
                    }
                    request
                })
                .await?;

            let list_response: FileListResponse = self.checked(response).await?.json().await?;
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// List the non-trashed children of a folder.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        tracing::debug!(folder_id, "listing folder children");
        let query = format!("'{}' in parents and trashed = false", quote(folder_id));
        self.query_files(&query).await
    }

    /// List a folder's children partitioned into folders, images and STL files.
    pub async fn list_contents(&self, folder_id: &str) -> Result<FolderContents> {
        Ok(FolderContents::from_entries(self.list_children(folder_id).await?))
    }

    /// Images directly inside a folder.
    pub async fn search_images(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        let query = format!(
            "'{}' in parents and trashed = false and mimeType contains 'image/'",
            quote(folder_id)
        );
        self.query_files(&query).await
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &str) -> Result<DriveEntry> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let response = self
            .send_authorized(|token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("supportsAllDrives", "true"), ("fields", ENTRY_FIELDS)])
            })
            .await?;

        Ok(self.checked(response).await?.json().await?)
    }

    /// Start downloading a file's content. The body is left unread so the
    /// caller can stream it.
    pub async fn download(&self, file_id: &str) -> Result<Response> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        tracing::debug!(file_id, "downloading file content");
        let response = self
            .send_authorized(|token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            })
            .await?;

        self.checked(response).await
    }

    /// Whether `item_id` is `ancestor_id` or lies beneath it, following
    /// `parents` at most `max_depth` levels up.
    pub async fn is_within(&self, item_id: &str, ancestor_id: &str, max_depth: usize) -> Result<bool> {
        if item_id == ancestor_id {
            return Ok(true);
        }

        let mut frontier = vec![item_id.to_string()];
        let mut seen = std::collections::HashSet::new();

        for _ in 0..max_depth {
            let mut next = Vec::new();
            for id in frontier {
                let entry = self.get_file(&id).await?;
                for parent in entry.parents {
                    if parent == ancestor_id {
                        return Ok(true);
                    }
                    if seen.insert(parent.clone()) {
                        next.push(parent);
                    }
                }
            }
            if next.is_empty() {
                return Ok(false);
            }
            frontier = next;
        }

        Ok(false)
    }
}
