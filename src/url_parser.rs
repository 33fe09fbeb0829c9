//! Parsing Drive URLs and share links.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{DriveError, Result};

/// Regex patterns for Google Drive URLs.
static FOLDER_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)")
        .expect("Invalid folder URL regex")
});

static FILE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/file/d/([a-zA-Z0-9_-]+)")
        .expect("Invalid file URL regex")
});

static OPEN_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/open\?id=([a-zA-Z0-9_-]+)")
        .expect("Invalid open URL regex")
});

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// `.../preview/<token>` in a share link, ignoring any query or fragment.
static PREVIEW_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^?#]*/preview/([A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+)")
        .expect("Invalid preview link regex")
});

/// Three base64url segments separated by dots.
static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").expect("Invalid token regex")
});

/// Path of the preview page under the application URL.
pub const PREVIEW_PATH: &str = "preview";

/// Extract a Google Drive ID from a URL or validate a raw ID.
///
/// Supports the following URL formats:
/// - `https://drive.google.com/drive/folders/<ID>`
/// - `https://drive.google.com/drive/u/0/folders/<ID>`
/// - `https://drive.google.com/file/d/<ID>/view`
/// - `https://drive.google.com/open?id=<ID>`
/// - Raw ID string
///
/// # Examples
///
/// ```
/// use drive_preview::url_parser::extract_id;
///
/// let id = extract_id("https://drive.google.com/drive/folders/1abc123").unwrap();
/// assert_eq!(id, "1abc123");
///
/// let id = extract_id("1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// ```
pub fn extract_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    // Try folder URL pattern
    if let Some(captures) = FOLDER_URL_REGEX.captures(trimmed) {
        if let Some(id) = captures.get(1) {
            return Ok(id.as_str().to_string());
        }
    }

    // Try file URL pattern
    if let Some(captures) = FILE_URL_REGEX.captures(trimmed) {
        if let Some(id) = captures.get(1) {
            return Ok(id.as_str().to_string());
        }
    }

    // Try open URL pattern
    if let Some(captures) = OPEN_URL_REGEX.captures(trimmed) {
        if let Some(id) = captures.get(1) {
            return Ok(id.as_str().to_string());
        }
    }

    // Check if it's a raw ID
    if ID_REGEX.is_match(trimmed) && !trimmed.is_empty() {
        return Ok(trimmed.to_string());
    }

    Err(DriveError::InvalidUrlOrId(url_or_id.to_string()))
}

/// Public link that opens the preview page for `token`.
pub fn share_link(app_url: &str, token: &str) -> String {
    format!("{}/{}/{}", app_url.trim_end_matches('/'), PREVIEW_PATH, token)
}

/// Extract a share token from a preview link or accept a raw token.
///
/// A `preview:` credential prefix is also stripped.
pub fn extract_share_token(link_or_token: &str) -> Result<String> {
    let trimmed = link_or_token.trim();
    let trimmed = trimmed
        .strip_prefix(crate::access::PREVIEW_PREFIX)
        .unwrap_or(trimmed);

    if let Some(captures) = PREVIEW_LINK_REGEX.captures(trimmed) {
        if let Some(token) = captures.get(1) {
            return Ok(token.as_str().to_string());
        }
    }

    if TOKEN_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(DriveError::InvalidUrlOrId(link_or_token.to_string()))
}
