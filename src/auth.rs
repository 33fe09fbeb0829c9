//! Credentials for calling the Drive API.
//!
//! Two sources exist: the Gateway's own service account, exchanged for
//! short-lived access tokens with a signed JWT assertion, and the signed-in
//! owner's bearer token, which may be renewed once through a caller-supplied
//! hook when Drive answers 401.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{DriveError, Result};
use crate::models::{ServiceAccountCredentials, TokenResponse};

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only Drive scope; the Gateway never writes.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Supplies bearer tokens for Drive requests.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// A token to use for the next request.
    async fn access_token(&self) -> Result<String>;

    /// Obtain a fresh token after Drive rejected `rejected`.
    ///
    /// `None` means this provider cannot renew and the 401 must propagate.
    async fn renew(&self, _rejected: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Service-account identity of the Gateway.
#[derive(Clone)]
pub struct ServiceAccountAuth {
    credentials: Arc<ServiceAccountCredentials>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Create a new authenticator from a service account JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::new(credentials))
    }

    /// Create a new authenticator from credentials.
    pub fn new(credentials: ServiceAccountCredentials) -> Self {
        Self::with_client(credentials, Client::new())
    }

    pub fn with_client(credentials: ServiceAccountCredentials, client: Client) -> Self {
        Self {
            credentials: Arc::new(credentials),
            client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    fn token_uri(&self) -> &str {
        self.credentials.token_uri.as_deref().unwrap_or(TOKEN_URI)
    }

    /// Exchange a signed JWT assertion for an access token.
    async fn refresh_token(&self) -> Result<CachedToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DriveError::TokenRefreshError(e.to_string()))?
            .as_secs();

        let claims = Claims {
            iss: self.credentials.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: self.token_uri().to_string(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];

        tracing::debug!(email = %self.credentials.client_email, "refreshing service account token");

        let response = self
            .client
            .post(self.token_uri())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;

        let expires_at = SystemTime::now() + Duration::from_secs(token_response.expires_in);

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                // Add 60 second buffer before expiration
                let buffer = Duration::from_secs(60);
                if token.expires_at > SystemTime::now() + buffer {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }
}

/// Obtains a fresh owner token, e.g. by re-running the sign-in flow.
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    async fn reauthenticate(&self) -> Result<String>;
}

/// The signed-in owner's bearer token.
pub struct OwnerCredential {
    token: RwLock<String>,
    reauth: Option<Arc<dyn Reauthenticate>>,
}

impl OwnerCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(token.into()),
            reauth: None,
        }
    }

    pub fn with_reauth(token: impl Into<String>, reauth: Arc<dyn Reauthenticate>) -> Self {
        Self {
            token: RwLock::new(token.into()),
            reauth: Some(reauth),
        }
    }
}

impl std::fmt::Debug for OwnerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerCredential")
            .field("reauth", &self.reauth.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AccessTokenProvider for OwnerCredential {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.read().await.clone())
    }

    /// Renew through the hook, unless another request already replaced
    /// `rejected` while this one waited for the lock.
    async fn renew(&self, rejected: &str) -> Result<Option<String>> {
        let Some(reauth) = &self.reauth else {
            return Ok(None);
        };

        let mut token = self.token.write().await;
        if *token != rejected {
            return Ok(Some(token.clone()));
        }

        tracing::info!("owner credential rejected, re-authenticating");
        let fresh = reauth
            .reauthenticate()
            .await
            .map_err(|e| DriveError::AuthenticationError(e.to_string()))?;
        *token = fresh.clone();
        Ok(Some(fresh))
    }
}
