//! Issuing and validating share tokens.

use std::fmt;
use std::sync::Arc;

use super::{codec, now_millis, ResourceType, ShareClaims, TokenError, MILLIS_PER_MINUTE};

/// Source of the current time, epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

/// HMAC key used to sign share tokens. Read-only once constructed.
#[derive(Clone)]
pub struct ShareSecret(Arc<[u8]>);

impl ShareSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let bytes = secret.as_ref();
        if bytes.is_empty() {
            return Err(TokenError::MissingField("secret"));
        }
        Ok(Self(Arc::from(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ShareSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShareSecret(<redacted>)")
    }
}

/// Issues and validates share tokens. Stateless apart from the secret.
#[derive(Clone)]
pub struct TokenService {
    secret: ShareSecret,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: ShareSecret) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: ShareSecret, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    /// Issue a token for `resource_id` valid for `ttl_minutes` from now.
    pub fn issue(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        ttl_minutes: u64,
    ) -> Result<String, TokenError> {
        self.issue_at(resource_id, resource_type, ttl_minutes, self.clock.now_millis())
    }

    /// Issue a token as if the current time were `now_ms`.
    pub fn issue_at(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        ttl_minutes: u64,
        now_ms: i64,
    ) -> Result<String, TokenError> {
        let resource_id = resource_id.trim();
        if resource_id.is_empty() {
            return Err(TokenError::MissingField("resourceId"));
        }
        if ttl_minutes == 0 {
            return Err(TokenError::InvalidTtl);
        }

        let ttl_ms = i64::try_from(ttl_minutes)
            .ok()
            .and_then(|m| m.checked_mul(MILLIS_PER_MINUTE))
            .ok_or(TokenError::InvalidTtl)?;

        let claims = ShareClaims {
            resource_id: resource_id.to_string(),
            resource_type,
            exp: now_ms.saturating_add(ttl_ms),
            iat: now_ms,
        };

        codec::encode(&claims, self.secret.as_bytes()).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate `token` against the current time.
    pub fn validate(&self, token: &str) -> Result<ShareClaims, TokenError> {
        self.validate_at(token, self.clock.now_millis())
    }

    /// Validate `token` as if the current time were `now_ms`.
    ///
    /// A bad signature or corrupted token is `InvalidToken`; a correctly
    /// signed token whose expiry is not after `now_ms` is `Expired`.
    pub fn validate_at(&self, token: &str, now_ms: i64) -> Result<ShareClaims, TokenError> {
        let claims = codec::decode(token, self.secret.as_bytes())?;
        if !claims.is_live_at(now_ms) {
            return Err(TokenError::Expired {
                expires_at: claims.exp,
            });
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CodecError;
    use std::sync::atomic::{AtomicI64, Ordering};

    const T0: i64 = 1_700_000_000_000;

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance_minutes(&self, minutes: i64) {
            self.0.fetch_add(minutes * MILLIS_PER_MINUTE, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn service() -> TokenService {
        TokenService::new(ShareSecret::new("service-test-secret").unwrap())
    }

    #[test]
    fn test_issue_then_validate() {
        let svc = service();
        for (id, kind, ttl) in [
            ("file-1", ResourceType::File, 1u64),
            ("folder-xyz", ResourceType::Folder, 60),
            ("1a2B3c", ResourceType::File, 60 * 24 * 7),
        ] {
            let token = svc.issue_at(id, kind, ttl, T0).unwrap();
            let claims = svc.validate_at(&token, T0).unwrap();
            assert_eq!(claims.resource_id, id);
            assert_eq!(claims.resource_type, kind);
            assert_eq!(claims.iat, T0);
            assert_eq!(claims.exp, T0 + ttl as i64 * MILLIS_PER_MINUTE);
        }
    }

    #[test]
    fn test_issue_with_system_clock() {
        let svc = service();
        let before = now_millis();
        let token = svc.issue("file-1", ResourceType::File, 5).unwrap();
        let after = now_millis();
        let claims = svc.validate(&token).unwrap();
        assert!(claims.iat >= before && claims.iat <= after);
        assert_eq!(claims.exp - claims.iat, 5 * MILLIS_PER_MINUTE);
    }

    #[test]
    fn test_issue_rejects_bad_input() {
        let svc = service();
        assert_eq!(
            svc.issue_at("", ResourceType::File, 5, T0),
            Err(TokenError::MissingField("resourceId"))
        );
        assert_eq!(
            svc.issue_at("   ", ResourceType::File, 5, T0),
            Err(TokenError::MissingField("resourceId"))
        );
        assert_eq!(
            svc.issue_at("id", ResourceType::File, 0, T0),
            Err(TokenError::InvalidTtl)
        );
    }

    #[test]
    fn test_expiry_with_simulated_clock() {
        let clock = Arc::new(ManualClock(AtomicI64::new(T0)));
        let svc = TokenService::with_clock(
            ShareSecret::new("service-test-secret").unwrap(),
            clock.clone(),
        );
        let token = svc.issue("folder-1", ResourceType::Folder, 30).unwrap();

        clock.advance_minutes(29);
        assert!(svc.validate(&token).is_ok());

        clock.advance_minutes(2);
        let err = svc.validate(&token).unwrap_err();
        assert!(err.is_expired());
        assert_eq!(
            err,
            TokenError::Expired {
                expires_at: T0 + 30 * MILLIS_PER_MINUTE
            }
        );
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let svc = service();
        let token = svc.issue_at("f", ResourceType::File, 1, T0).unwrap();
        let exp = T0 + MILLIS_PER_MINUTE;
        assert!(svc.validate_at(&token, exp - 1).is_ok());
        assert!(svc.validate_at(&token, exp).unwrap_err().is_expired());
    }

    #[test]
    fn test_invalid_signature_is_not_expired() {
        let svc = service();
        let token = svc.issue_at("f", ResourceType::File, 1, T0).unwrap();
        let other = TokenService::new(ShareSecret::new("another-secret").unwrap());
        // Far in the future: a stale but forged token still reports InvalidToken.
        let err = other.validate_at(&token, T0 + 10_000 * MILLIS_PER_MINUTE).unwrap_err();
        assert_eq!(err, TokenError::InvalidToken(CodecError::InvalidSignature));
        assert!(!err.is_expired());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(ShareSecret::new("").is_err());
        let secret = ShareSecret::new("k").unwrap();
        assert_eq!(format!("{:?}", secret), "ShareSecret(<redacted>)");
    }
}
