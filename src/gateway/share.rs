//! Token-scoped relays: anonymous visitors read only what their token grants.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use super::{GatewayError, GatewayState};
use crate::classify::FolderContents;
use crate::token::{ResourceType, ShareClaims};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileQuery {
    pub token: Option<String>,
    pub resource_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderQuery {
    pub token: Option<String>,
    pub folder_id: Option<String>,
}

fn verify(state: &GatewayState, token: Option<String>) -> Result<ShareClaims, GatewayError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Missing token".to_string()))?;
    Ok(state.tokens().validate(&token)?)
}

fn require_type(claims: &ShareClaims, expected: ResourceType) -> Result<(), GatewayError> {
    if claims.resource_type == expected {
        return Ok(());
    }
    Err(GatewayError::ResourceMismatch(format!(
        "Token is for a {}, not a {}",
        claims.resource_type, expected
    )))
}

/// Reject `item_id` unless it is the token's folder or lies beneath it.
async fn require_in_scope(
    state: &GatewayState,
    claims: &ShareClaims,
    item_id: &str,
) -> Result<(), GatewayError> {
    let within = state
        .drive()
        .is_within(item_id, &claims.resource_id, state.config().max_scope_depth)
        .await
        .map_err(GatewayError::Upstream)?;
    if !within {
        return Err(GatewayError::OutOfScope(format!(
            "Resource {} is not part of the shared folder",
            item_id
        )));
    }
    Ok(())
}

async fn stream_file(state: &GatewayState, file_id: &str) -> Result<Response, GatewayError> {
    let upstream = state
        .drive()
        .download(file_id)
        .await
        .map_err(GatewayError::Upstream)?;

    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let content_length = upstream.headers().get(CONTENT_LENGTH).cloned();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(
            CACHE_CONTROL,
            format!("public, max-age={}", state.config().cache_max_age.as_secs()),
        );
    if let Some(len) = content_length {
        builder = builder.header(CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

/// Content of the single file a file token grants.
pub async fn file(
    State(state): State<GatewayState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, GatewayError> {
    let claims = verify(&state, query.token)?;
    require_type(&claims, ResourceType::File)?;

    if let Some(requested) = query.resource_id.as_deref().filter(|id| !id.is_empty()) {
        if requested != claims.resource_id {
            return Err(GatewayError::OutOfScope(
                "Token does not grant access to this resource".to_string(),
            ));
        }
    }

    state.acquire_service_credential().await?;
    tracing::debug!(resource_id = %claims.resource_id, "relaying shared file");
    stream_file(&state, &claims.resource_id).await
}

/// Classified listing of the shared folder or one of its sub-folders.
pub async fn folder(
    State(state): State<GatewayState>,
    Query(query): Query<FolderQuery>,
) -> Result<Json<FolderContents>, GatewayError> {
    let claims = verify(&state, query.token)?;
    require_type(&claims, ResourceType::Folder)?;
    state.acquire_service_credential().await?;

    let folder_id = query
        .folder_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| claims.resource_id.clone());
    if folder_id != claims.resource_id {
        require_in_scope(&state, &claims, &folder_id).await?;
    }

    tracing::debug!(folder_id = %folder_id, "listing shared folder");
    let contents = state
        .drive()
        .list_contents(&folder_id)
        .await
        .map_err(GatewayError::Upstream)?;
    Ok(Json(contents))
}

/// Content of a file somewhere inside the shared folder.
pub async fn folder_file(
    State(state): State<GatewayState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, GatewayError> {
    let claims = verify(&state, query.token)?;
    require_type(&claims, ResourceType::Folder)?;
    let resource_id = query
        .resource_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Missing resourceId".to_string()))?;

    state.acquire_service_credential().await?;
    require_in_scope(&state, &claims, &resource_id).await?;

    tracing::debug!(resource_id = %resource_id, folder_id = %claims.resource_id, "relaying file from shared folder");
    stream_file(&state, &resource_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(resource_type: ResourceType) -> ShareClaims {
        ShareClaims {
            resource_id: "r".to_string(),
            resource_type,
            exp: 2,
            iat: 1,
        }
    }

    #[test]
    fn test_require_type() {
        assert!(require_type(&claims(ResourceType::File), ResourceType::File).is_ok());
        let err = require_type(&claims(ResourceType::Folder), ResourceType::File).unwrap_err();
        assert_eq!(err.to_string(), "Token is for a folder, not a file");
    }
}
