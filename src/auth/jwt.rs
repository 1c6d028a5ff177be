//! HS256 access and refresh tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::AuthError;
use crate::domain::aggregates::UserRole;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: UserRole,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> { self.sub.parse().map_err(|_| AuthError::InvalidToken) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl JwtKeys {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, user_id: i64, role: UserRole, kind: TokenKind) -> Result<String, AuthError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims { sub: user_id.to_string(), role, kind, iat: now.timestamp(), exp: (now + ttl).timestamp() };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Encode)
    }

    pub fn issue_pair(&self, user_id: i64, role: UserRole) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(user_id, role, TokenKind::Access)?,
            refresh_token: self.issue(user_id, role, TokenKind::Refresh)?,
        })
    }

    /// Decodes `token` and checks that it is of the expected kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })?
            .claims;
        if claims.kind != kind {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys { JwtKeys::new(b"test-secret", Duration::minutes(5), Duration::days(1)) }

    #[test]
    fn pair_round_trips_with_kind_check() {
        let keys = keys();
        let pair = keys.issue_pair(42, UserRole::Supplier).unwrap();

        let claims = keys.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, UserRole::Supplier);
        assert!(matches!(keys.verify(&pair.access_token, TokenKind::Refresh), Err(AuthError::InvalidToken)));
        assert!(keys.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let other = JwtKeys::new(b"another-secret", Duration::minutes(5), Duration::days(1));
        let token = other.issue(1, UserRole::Admin, TokenKind::Access).unwrap();
        assert!(matches!(keys().verify(&token, TokenKind::Access), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new(b"test-secret", Duration::minutes(-10), Duration::days(1));
        let token = keys.issue(1, UserRole::Customer, TokenKind::Access).unwrap();
        assert!(matches!(keys.verify(&token, TokenKind::Access), Err(AuthError::Expired)));
    }

    #[test]
    fn debug_hides_secret() {
        assert!(format!("{:?}", keys()).contains("<redacted>"));
    }
}
