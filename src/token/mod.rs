//! Signed, self-contained share tokens.
//!
//! A share token grants read access to one Drive resource until it expires.
//! Nothing is stored server-side: a token is valid for as long as its
//! signature verifies against the secret and its expiry lies in the future.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod codec;
pub mod service;

pub use codec::{decode, encode, peek};
pub use service::{Clock, ShareSecret, SystemClock, TokenService};

/// Milliseconds in one minute.
pub const MILLIS_PER_MINUTE: i64 = 60_000;

/// The kind of Drive resource a token grants access to.
///
/// Images and STL files are both `File`; which one a file is gets decided
/// from its MIME type and name when it is listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[serde(alias = "image", alias = "stl")]
    File,
    Folder,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::File => "file",
            ResourceType::Folder => "folder",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "image" | "stl" => Ok(ResourceType::File),
            "folder" => Ok(ResourceType::Folder),
            "" => Err(TokenError::MissingField("resourceType")),
            other => Err(TokenError::UnknownResourceType(other.to_string())),
        }
    }
}

/// Claims carried in the payload segment of a share token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareClaims {
    pub resource_id: String,
    pub resource_type: ResourceType,
    /// Expiry, epoch milliseconds.
    pub exp: i64,
    /// Issue time, epoch milliseconds.
    pub iat: i64,
}

impl ShareClaims {
    /// Temporally valid iff `now < exp`.
    pub fn is_live_at(&self, now_ms: i64) -> bool {
        now_ms < self.exp
    }
}

/// Failures while encoding or decoding the token bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    InvalidSignature,
}

/// Failures of the token service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] CodecError),

    #[error("token expired at {expires_at}")]
    Expired { expires_at: i64 },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("ttlMinutes must be greater than zero")]
    InvalidTtl,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired { .. })
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
