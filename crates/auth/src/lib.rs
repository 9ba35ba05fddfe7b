use std::time::Duration;

use http::header;
use http::HeaderMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

/// Claims carried in every session token. `sub` is the user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens from a single shared secret.
#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("validation", &self.validation)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        if secret.trim().is_empty() {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "jwt secret must be non-empty".to_string(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|_| AuthError {
            code: "ERR_INTERNAL",
            message: "failed to sign session token".to_string(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError {
                    code: "ERR_AUTH_EXPIRED",
                    message: "session token has expired".to_string(),
                },
                _ => AuthError {
                    code: "ERR_AUTH_INVALID",
                    message: "session token validation failed".to_string(),
                },
            })
    }

    /// Bearer extraction plus verification in one step for request handlers.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let token = bearer_token(headers)?;
        self.verify(&token)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError {
            code: "ERR_AUTH_REQUIRED",
            message: "missing Authorization header".to_string(),
        })?;

    let token = authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .ok_or_else(|| AuthError {
            code: "ERR_AUTH_INVALID",
            message: "Authorization must be a Bearer token".to_string(),
        })?;

    if token.trim().is_empty() {
        return Err(AuthError {
            code: "ERR_AUTH_INVALID",
            message: "Bearer token is empty".to_string(),
        });
    }

    Ok(token.to_string())
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST).map_err(|_| AuthError {
        code: "ERR_INTERNAL",
        message: "failed to hash password".to_string(),
    })
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(plain, hash).map_err(|_| AuthError {
        code: "ERR_INTERNAL",
        message: "failed to verify password".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_map(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn issued_token_round_trips() {
        let auth = Authenticator::new("test-secret", Duration::from_secs(3600)).unwrap();
        let user_id = Uuid::new_v4();

        let token = auth.issue(user_id, "dev@example.com").unwrap();
        let claims = auth.verify(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "dev@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err = Authenticator::new("  ", Duration::from_secs(3600)).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let issuer = Authenticator::new("secret-a", Duration::from_secs(3600)).unwrap();
        let verifier = Authenticator::new("secret-b", Duration::from_secs(3600)).unwrap();

        let token = issuer.issue(Uuid::new_v4(), "dev@example.com").unwrap();
        let err = verifier.verify(&token).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_INVALID");
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let auth = Authenticator::new("test-secret", Duration::from_secs(3600)).unwrap();
        let now = chrono::Utc::now().timestamp();
        let stale = Claims {
            sub: Uuid::new_v4(),
            email: "dev@example.com".to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &stale,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = auth.verify(&token).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_EXPIRED");
    }

    #[test]
    fn bearer_extraction_accepts_both_prefixes() {
        assert_eq!(bearer_token(&header_map("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&header_map("bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn missing_and_malformed_headers_are_distinct() {
        let err = bearer_token(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_REQUIRED");

        let err = bearer_token(&header_map("Basic abc")).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_INVALID");

        let err = bearer_token(&header_map("Bearer  ")).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_INVALID");
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = bcrypt::hash("s3cret", 4).unwrap();
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
