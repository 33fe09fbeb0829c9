//! HS256 token codec: `base64url(header).base64url(payload).base64url(hmac)`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use super::{CodecError, ShareClaims};

type HmacSha256 = Hmac<Sha256>;

/// Fixed header; only meaningful as part of the signed bytes.
#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: Header = Header {
    alg: "HS256",
    typ: "JWT",
};

fn mac_for(secret: &[u8]) -> Result<HmacSha256, CodecError> {
    // HMAC accepts keys of any length; this only fails for a broken backend.
    HmacSha256::new_from_slice(secret).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Sign `claims` with `secret`.
pub fn encode(claims: &ShareClaims, secret: &[u8]) -> Result<String, CodecError> {
    let header_json =
        serde_json::to_vec(&HEADER).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let payload_json =
        serde_json::to_vec(claims).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload_json)
    );

    let mut mac = mac_for(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = mac.finalize().into_bytes();

    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}

/// Split into exactly three non-empty segments.
fn split(token: &str) -> Result<(&str, &str, &str), CodecError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
            Ok((h, p, s))
        }
        _ => Err(CodecError::Malformed(
            "expected three non-empty dot-separated segments".to_string(),
        )),
    }
}

fn decode_payload(payload_b64: &str) -> Result<ShareClaims, CodecError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| CodecError::Malformed(format!("payload is not base64url: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CodecError::Malformed(format!("payload is not valid claims: {}", e)))
}

/// Verify the signature of `token` against `secret` and return its claims.
///
/// Expiry is not checked here.
pub fn decode(token: &str, secret: &[u8]) -> Result<ShareClaims, CodecError> {
    let (header_b64, payload_b64, signature_b64) = split(token.trim())?;

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| CodecError::InvalidSignature)?;

    let mut mac = mac_for(secret)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| CodecError::InvalidSignature)?;

    decode_payload(payload_b64)
}

/// Read the claims without verifying the signature.
///
/// For routing decisions on the client side only; never for authorization.
pub fn peek(token: &str) -> Result<ShareClaims, CodecError> {
    let (_, payload_b64, _) = split(token.trim())?;
    decode_payload(payload_b64)
}
