//! Issue and validate share tokens over HTTP.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{GatewayError, GatewayState};
use crate::token::{ResourceType, TokenError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    pub token: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub expires_at: i64,
}

// Bodies are parsed by hand so a malformed body is a 400 with our error shape.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid request body: {}", e)))
}

pub async fn issue(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<IssueResponse>, GatewayError> {
    let request: IssueRequest = parse_body(&body)?;

    let resource_id = request
        .resource_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(TokenError::MissingField("resourceId"))?;
    let resource_type: ResourceType = request.resource_type.unwrap_or_default().parse()?;
    let ttl_minutes = match request.ttl_minutes {
        None => return Err(TokenError::MissingField("ttlMinutes").into()),
        Some(ttl) => u64::try_from(ttl).map_err(|_| TokenError::InvalidTtl)?,
    };

    let token = state
        .tokens()
        .issue(&resource_id, resource_type, ttl_minutes)?;

    tracing::info!(
        resource_id = %resource_id,
        resource_type = %resource_type,
        ttl_minutes,
        "issued share token"
    );
    Ok(Json(IssueResponse { token }))
}

pub async fn validate(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<ValidateResponse>, GatewayError> {
    let request: ValidateRequest = parse_body(&body)?;
    let token = request
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Missing token".to_string()))?;

    let claims = state.tokens().validate(&token)?;
    Ok(Json(ValidateResponse {
        valid: true,
        resource_id: claims.resource_id,
        resource_type: claims.resource_type,
        expires_at: claims.exp,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_is_default() {
        let req: IssueRequest = parse_body(b"  ").unwrap();
        assert!(req.resource_id.is_none());
        let req: ValidateRequest = parse_body(b"").unwrap();
        assert!(req.token.is_none());
    }

    #[test]
    fn test_issue_request_is_camel_case() {
        let req: IssueRequest =
            parse_body(br#"{"resourceId":"abc","resourceType":"image","ttlMinutes":15}"#).unwrap();
        assert_eq!(req.resource_id.as_deref(), Some("abc"));
        assert_eq!(req.resource_type.as_deref(), Some("image"));
        assert_eq!(req.ttl_minutes, Some(15));
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let err = parse_body::<ValidateRequest>(b"{token").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }
}
