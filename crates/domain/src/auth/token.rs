//! HS256 bearer tokens.

use chrono::{Duration, Utc};
use common::UserId;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use store::{Role, User};

use crate::error::CommerceError;

/// Default token lifetime: seven days.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24 * 7;

/// Longest accepted token lifetime: ten years.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The user id.
    pub sub: i64,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        UserId::new(self.sub)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Issues and verifies access tokens with a shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issues a token for `user` valid from now.
    pub fn issue(&self, user: &User) -> Result<String, CommerceError> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| CommerceError::Internal("Token lifetime out of range".to_string()))?;
        let claims = Claims {
            sub: user.id.as_i64(),
            role: user.role,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CommerceError::Internal(format!("Failed to issue token: {e}")))
    }

    /// Verifies the signature and expiry of a token.
    pub fn verify(&self, token: &str) -> Result<Claims, CommerceError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected access token");
                CommerceError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(7),
            first_name: "Sari".to_string(),
            last_name: "Wulandari".to_string(),
            email: "sari@example.com".to_string(),
            password_hash: String::new(),
            phone: None,
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn out_of_range_lifetime_is_an_error() {
        let issuer = TokenIssuer::new("test-secret", Duration::MAX);
        let err = issuer.issue(&user(Role::User)).unwrap_err();
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn issued_token_verifies() {
        let issuer = TokenIssuer::new("test-secret", Duration::hours(1));
        let token = issuer.issue(&user(Role::Admin)).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.user_id(), UserId::new(7));
        assert!(claims.is_admin());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = TokenIssuer::new("one", Duration::hours(1))
            .issue(&user(Role::User))
            .unwrap();

        let err = TokenIssuer::new("two", Duration::hours(1))
            .verify(&token)
            .unwrap_err();
        assert!(matches!(err, CommerceError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let issuer = TokenIssuer::new("test-secret", Duration::hours(-2));
        let token = issuer.issue(&user(Role::User)).unwrap();

        assert!(matches!(
            issuer.verify(&token),
            Err(CommerceError::Unauthorized(_))
        ));
    }

    #[test]
    fn garbage_is_unauthorized() {
        let issuer = TokenIssuer::new("test-secret", Duration::hours(1));
        assert!(issuer.verify("not.a.token").is_err());
    }
}
