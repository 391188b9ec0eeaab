//! services/api/src/security/token.rs
//!
//! Issues and verifies signed, time-limited bearer tokens (JWT, HMAC).
//!
//! Tokens are stateless: there is no server-side registry and expiry is the
//! only way a token stops being valid.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Token has expired")]
    Expired,
    #[error("Token has no subject")]
    MissingSubject,
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    default_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, algorithm: Algorithm, default_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            default_ttl,
        }
    }

    /// Issues a token for `subject`, valid for `ttl` or the configured default.
    pub fn issue(&self, subject: &str, ttl: Option<Duration>) -> Result<String, TokenError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        let claims = Claims {
            sub: Some(subject.to_string()),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verifies signature and expiry and returns the subject claim.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        // Expiry is checked below against `now`, without leeway.
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if now.timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        data.claims.sub.ok_or(TokenError::MissingSubject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn service() -> TokenService {
        TokenService::new("test-secret", Algorithm::HS256, Duration::minutes(30))
    }

    #[rstest]
    fn issued_token_verifies_immediately(service: TokenService) {
        let token = service.issue("alice", None).unwrap();
        assert_eq!(service.verify(&token).unwrap(), "alice");
    }

    #[rstest]
    fn token_fails_once_the_default_lifetime_has_elapsed(service: TokenService) {
        let issued_at = Utc::now();
        let token = service.issue_at("alice", None, issued_at).unwrap();

        assert!(service.verify_at(&token, issued_at + Duration::minutes(29)).is_ok());
        assert_eq!(
            service.verify_at(&token, issued_at + Duration::minutes(31)),
            Err(TokenError::Expired)
        );
    }

    #[rstest]
    fn explicit_ttl_overrides_the_default(service: TokenService) {
        let issued_at = Utc::now();
        let token = service
            .issue_at("bob", Some(Duration::minutes(5)), issued_at)
            .unwrap();
        assert_eq!(
            service.verify_at(&token, issued_at + Duration::minutes(6)),
            Err(TokenError::Expired)
        );
    }

    #[rstest]
    fn token_signed_with_another_secret_is_rejected(service: TokenService) {
        let other = TokenService::new("other-secret", Algorithm::HS256, Duration::minutes(30));
        let token = other.issue("alice", None).unwrap();
        assert!(matches!(service.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[rstest]
    fn malformed_token_is_rejected(service: TokenService) {
        assert!(matches!(service.verify("not.a.jwt"), Err(TokenError::Invalid(_))));
    }

    #[rstest]
    fn token_without_subject_is_rejected(service: TokenService) {
        let claims = Claims {
            sub: None,
            exp: (Utc::now() + Duration::minutes(10)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert_eq!(service.verify(&token), Err(TokenError::MissingSubject));
    }
}
