//! Error types for the drive_preview crate.

use thiserror::Error;

use crate::token::TokenError;

/// Errors that can occur when talking to Google Drive or the Gateway.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Authentication expired. Please sign in again.")]
    AuthenticationExpired,

    #[error("This share link has expired. Request a new link.")]
    ShareExpired,

    #[error("Failed to read credentials file: {0}")]
    CredentialsFileError(#[from] std::io::Error),

    #[error("Failed to parse credentials JSON: {0}")]
    CredentialsParseError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Gateway error ({status}): {message}")]
    GatewayError { status: u16, message: String },

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("Share token error: {0}")]
    ShareToken(#[from] TokenError),

    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
