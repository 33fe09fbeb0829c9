//! One interface over two ways of reading Drive.
//!
//! A signed-in owner reads Drive directly with their bearer credential. An
//! anonymous visitor holding a share token reads through the Gateway, which
//! only exposes the one resource the token names. The variant is chosen once
//! from the credential string and never changes for a session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use url::Url;

use crate::auth::{OwnerCredential, Reauthenticate};
use crate::cache::ContentCache;
use crate::classify::{classify, EntryKind, FolderContents};
use crate::client::{http_client, DriveClient, DEFAULT_TIMEOUT, DRIVE_API_BASE};
use crate::error::{DriveError, Result};
use crate::gateway::{SHARE_FILE_PATH, SHARE_FOLDER_FILE_PATH, SHARE_FOLDER_PATH};
use crate::models::{DriveEntry, GatewayErrorBody};
use crate::token::{self, ResourceType, ShareClaims};

/// Marks a credential string as a share token rather than an owner bearer.
pub const PREVIEW_PREFIX: &str = "preview:";

/// Which credential drives a browsing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessContext {
    /// The signed-in owner's bearer token.
    Owner(String),
    /// A raw share token, without the prefix.
    Preview(String),
}

impl AccessContext {
    /// Decide the access mode from a credential string.
    pub fn from_credential(credential: &str) -> Self {
        match credential.strip_prefix(PREVIEW_PREFIX) {
            Some(token) => AccessContext::Preview(token.to_string()),
            None => AccessContext::Owner(credential.to_string()),
        }
    }

    /// The credential string form, with the prefix for preview tokens.
    pub fn to_credential(&self) -> String {
        match self {
            AccessContext::Owner(bearer) => bearer.clone(),
            AccessContext::Preview(token) => format!("{}{}", PREVIEW_PREFIX, token),
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, AccessContext::Preview(_))
    }
}

/// Where the clients send their requests.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Drive API base for direct access.
    pub drive_api_base: String,
    /// Gateway base URL; required for preview access.
    pub gateway_url: Option<String>,
    /// Route direct access through the Gateway's generic relay.
    pub use_relay: bool,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            drive_api_base: DRIVE_API_BASE.to_string(),
            gateway_url: None,
            use_relay: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Operations the browsing layer needs from Drive.
#[async_trait]
pub trait ContentAccess: Send + Sync {
    /// URL from which the file's content can be fetched.
    async fn get_file_url(&self, file_id: &str) -> Result<String>;

    /// URL of an image suitable as a thumbnail for the file.
    async fn get_thumbnail_url(&self, file_id: &str) -> Result<String>;

    /// Children of a folder, unclassified.
    async fn list_folder_contents(&self, folder_id: &str) -> Result<Vec<DriveEntry>>;

    /// Images directly inside a folder.
    async fn search_images(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        let entries = self.list_folder_contents(folder_id).await?;
        Ok(entries
            .into_iter()
            .filter(|e| classify(e) == EntryKind::Image)
            .collect())
    }

    /// Whether supplementary queries beyond listing are available.
    fn can_search_files(&self) -> bool;
}

#[async_trait]
impl<T: ContentAccess + ?Sized> ContentAccess for Arc<T> {
    async fn get_file_url(&self, file_id: &str) -> Result<String> {
        (**self).get_file_url(file_id).await
    }

    async fn get_thumbnail_url(&self, file_id: &str) -> Result<String> {
        (**self).get_thumbnail_url(file_id).await
    }

    async fn list_folder_contents(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        (**self).list_folder_contents(folder_id).await
    }

    async fn search_images(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        (**self).search_images(folder_id).await
    }

    fn can_search_files(&self) -> bool {
        (**self).can_search_files()
    }
}

/// Reads Drive with the owner's own credential.
#[derive(Clone)]
pub struct DirectClient {
    drive: DriveClient,
}

impl DirectClient {
    pub fn new(drive: DriveClient) -> Self {
        Self { drive }
    }

    pub fn drive(&self) -> &DriveClient {
        &self.drive
    }
}

#[async_trait]
impl ContentAccess for DirectClient {
    async fn get_file_url(&self, file_id: &str) -> Result<String> {
        Ok(self.drive.media_url(file_id))
    }

    async fn get_thumbnail_url(&self, file_id: &str) -> Result<String> {
        let entry = self.drive.get_file(file_id).await?;
        Ok(entry
            .thumbnail_link
            .unwrap_or_else(|| self.drive.media_url(file_id)))
    }

    async fn list_folder_contents(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        self.drive.list_children(folder_id).await
    }

    async fn search_images(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        self.drive.search_images(folder_id).await
    }

    fn can_search_files(&self) -> bool {
        true
    }
}

/// Reads Drive through the Gateway with a share token.
#[derive(Clone)]
pub struct ProxiedClient {
    gateway_url: String,
    token: String,
    // Unverified; only used to pick an endpoint. The Gateway verifies.
    claims: Option<ShareClaims>,
    http: Client,
}

impl ProxiedClient {
    pub fn new(gateway_url: impl Into<String>, token: impl Into<String>, http: Client) -> Self {
        let token = token.into();
        let claims = token::peek(&token).ok();
        Self {
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            token,
            claims,
            http,
        }
    }

    /// The resource the token claims to grant, if its payload is readable.
    pub fn root(&self) -> Option<(&str, ResourceType)> {
        self.claims
            .as_ref()
            .map(|c| (c.resource_id.as_str(), c.resource_type))
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.gateway_url, path))
            .map_err(|e| DriveError::InvalidUrlOrId(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("token", &self.token)
            .extend_pairs(params);
        Ok(url)
    }

    async fn gateway_error(response: Response) -> DriveError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<GatewayErrorBody>(&text) {
            Ok(body) if body.expired == Some(true) => DriveError::ShareExpired,
            Ok(body) => DriveError::GatewayError {
                status,
                message: body.error,
            },
            Err(_) => DriveError::GatewayError {
                status,
                message: if text.is_empty() {
                    "Failed to fetch folder".to_string()
                } else {
                    text
                },
            },
        }
    }
}

#[async_trait]
impl ContentAccess for ProxiedClient {
    async fn get_file_url(&self, file_id: &str) -> Result<String> {
        let path = match self.root() {
            Some((_, ResourceType::Folder)) => SHARE_FOLDER_FILE_PATH,
            _ => SHARE_FILE_PATH,
        };
        Ok(self.endpoint(path, &[("resourceId", file_id)])?.to_string())
    }

    async fn get_thumbnail_url(&self, file_id: &str) -> Result<String> {
        self.get_file_url(file_id).await
    }

    async fn list_folder_contents(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        let url = self.endpoint(SHARE_FOLDER_PATH, &[("folderId", folder_id)])?;
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::gateway_error(response).await);
        }
        let contents: FolderContents = response.json().await?;
        Ok(contents.into_entries())
    }

    fn can_search_files(&self) -> bool {
        false
    }
}

/// The client for one session, in whichever mode its credential selects.
#[derive(Clone)]
pub enum ContentClient {
    Direct(DirectClient),
    Proxied(ProxiedClient),
}

impl ContentClient {
    /// Build the client for `context`. Owner credentials are not renewed.
    pub fn new(context: AccessContext, config: &ClientConfig) -> Result<Self> {
        Self::build(context, config, None)
    }

    /// Like [`ContentClient::new`], renewing an owner credential through
    /// `reauth` once when Drive rejects it.
    pub fn with_reauth(
        context: AccessContext,
        config: &ClientConfig,
        reauth: Arc<dyn Reauthenticate>,
    ) -> Result<Self> {
        Self::build(context, config, Some(reauth))
    }

    /// Parse `credential` and build the matching client.
    pub fn from_credential(credential: &str, config: &ClientConfig) -> Result<Self> {
        Self::new(AccessContext::from_credential(credential), config)
    }

    fn build(
        context: AccessContext,
        config: &ClientConfig,
        reauth: Option<Arc<dyn Reauthenticate>>,
    ) -> Result<Self> {
        let http = http_client(config.timeout)?;
        match context {
            AccessContext::Owner(bearer) => {
                let credential = match reauth {
                    Some(reauth) => OwnerCredential::with_reauth(bearer, reauth),
                    None => OwnerCredential::new(bearer),
                };
                let mut drive =
                    DriveClient::with_base(Arc::new(credential), http, &config.drive_api_base);
                if config.use_relay {
                    let gateway = config
                        .gateway_url
                        .as_deref()
                        .ok_or(DriveError::MissingConfig("gateway URL for relay"))?;
                    drive = drive.with_relay(format!(
                        "{}{}",
                        gateway.trim_end_matches('/'),
                        crate::gateway::RELAY_PATH
                    ));
                }
                Ok(ContentClient::Direct(DirectClient::new(drive)))
            }
            AccessContext::Preview(token) => {
                let gateway = config
                    .gateway_url
                    .as_deref()
                    .ok_or(DriveError::MissingConfig("gateway URL for preview access"))?;
                Ok(ContentClient::Proxied(ProxiedClient::new(gateway, token, http)))
            }
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, ContentClient::Proxied(_))
    }

    fn inner(&self) -> &dyn ContentAccess {
        match self {
            ContentClient::Direct(c) => c,
            ContentClient::Proxied(c) => c,
        }
    }
}

#[async_trait]
impl ContentAccess for ContentClient {
    async fn get_file_url(&self, file_id: &str) -> Result<String> {
        self.inner().get_file_url(file_id).await
    }

    async fn get_thumbnail_url(&self, file_id: &str) -> Result<String> {
        self.inner().get_thumbnail_url(file_id).await
    }

    async fn list_folder_contents(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        self.inner().list_folder_contents(folder_id).await
    }

    async fn search_images(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        self.inner().search_images(folder_id).await
    }

    fn can_search_files(&self) -> bool {
        self.inner().can_search_files()
    }
}

/// Thumbnail URL for `file_id`, from the cache when present.
pub async fn cached_thumbnail_url<C: ContentAccess + ?Sized>(
    client: &C,
    cache: &ContentCache,
    file_id: &str,
) -> Result<String> {
    if let Some(url) = cache.thumbnail(file_id) {
        return Ok(url);
    }
    let url = client.get_thumbnail_url(file_id).await?;
    cache.set_thumbnail(file_id, url.clone());
    Ok(url)
}
