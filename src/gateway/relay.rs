//! Generic relay for the owner path.
//!
//! Forwards a request to Drive with the caller's own Authorization header so
//! the browser avoids CORS. Status codes come back verbatim.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use reqwest::Method;
use url::Url;

use super::{GatewayError, GatewayState};
use crate::error::DriveError;
use crate::models::RelayRequest;

/// Content types relayed as raw bytes rather than JSON.
/// Content types Drive uses for STL files.
const STL_CONTENT_TYPES: &[&str] = &[
    "application/sla",
    "application/vnd.ms-pki.stl",
    "model/stl",
    "model/x.stl-ascii",
    "model/x.stl-binary",
];

pub(crate) fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("application/octet-stream")
        || ct.contains("image/")
        || STL_CONTENT_TYPES.iter().any(|stl| ct.contains(stl))
}

fn parse_request(body: &[u8]) -> Result<RelayRequest, GatewayError> {
    if body.is_empty() {
        return Err(GatewayError::BadRequest("Missing URL parameter".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid relay request: {}", e)))
}

pub async fn handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(GatewayError::MissingAuthorization)?;

    let request = parse_request(&body)?;
    if request.url.trim().is_empty() {
        return Err(GatewayError::BadRequest("Missing URL parameter".to_string()));
    }

    let target = Url::parse(request.url.trim())
        .map_err(|e| GatewayError::BadRequest(format!("Invalid URL: {}", e)))?;
    if !state.config().is_drive_url(&target) {
        return Err(GatewayError::BadRequest(format!(
            "URL is not a Drive API URL: {}",
            target
        )));
    }

    let method = match request.method.as_deref() {
        None | Some("") => Method::GET,
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .map_err(|_| GatewayError::BadRequest(format!("Invalid method: {}", m)))?,
    };

    // Caller-supplied headers are applied after Authorization and may override it.
    let mut forward = HeaderMap::new();
    forward.insert(AUTHORIZATION, authorization);
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| GatewayError::BadRequest(format!("Invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| GatewayError::BadRequest(format!("Invalid header value for {}", name)))?;
        forward.insert(name, value);
    }

    tracing::debug!(%method, url = %target, "relaying Drive request");

    let upstream = state
        .http()
        .request(method, target)
        .headers(forward)
        .send()
        .await
        .map_err(|e| GatewayError::Upstream(DriveError::HttpError(e)))?;

    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();

    let mut builder = Response::builder().status(status);
    if let Some(ct) = &content_type {
        builder = builder.header(CONTENT_TYPE, ct);
    }

    let binary = content_type
        .as_ref()
        .and_then(|ct| ct.to_str().ok())
        .map(is_binary_content_type)
        .unwrap_or(false);

    let body = if binary {
        Body::from_stream(upstream.bytes_stream())
    } else {
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(DriveError::HttpError(e)))?;
        if bytes.is_empty() {
            Body::empty()
        } else {
            let json: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                GatewayError::Upstream(DriveError::ApiError {
                    status: 502,
                    message: format!("Upstream response is not JSON: {}", e),
                })
            })?;
            if content_type.is_none() {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            Body::from(json.to_string())
        }
    };

    builder
        .body(body)
        .map_err(|e| GatewayError::Internal(e.to_string()))
}
