//! Signed access tokens (HS256 JWT).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use cravecart_core::{Role, UserId};

use super::AuthError;
use crate::models::User;

/// Claims carried in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i32,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        UserId::new(self.sub)
    }
}

/// Issues and validates access tokens.
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenManager {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl,
        }
    }

    /// Sign a token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenIssue` if encoding fails.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.id.as_i32(),
            email: user.email.as_str().to_owned(),
            role: user.role,
            iat: now,
            exp: now.saturating_add(ttl),
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(AuthError::TokenIssue)
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for bad signatures, malformed tokens
    /// and expired tokens.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected access token");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cravecart_core::Email;

    fn user(role: Role) -> User {
        User {
            id: UserId::new(7),
            email: Email::parse("ada@example.com").unwrap(),
            name: "Ada".to_string(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn manager(secret: &str) -> TokenManager {
        TokenManager::new(&SecretString::from(secret), Duration::from_secs(3600))
    }

    #[test]
    fn issued_tokens_verify() {
        let tokens = manager("k9#Qv2!mZ7@pL4$wX8^tR1&yB6*nC3%h");
        let token = tokens.issue(&user(Role::Admin)).unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.user_id(), UserId::new(7));
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = manager("k9#Qv2!mZ7@pL4$wX8^tR1&yB6*nC3%h")
            .issue(&user(Role::Customer))
            .unwrap();
        let err = manager("Zx8&Wq3#Lm5!Rt9@Kp2$Vb7^Nc4*Hd6%")
            .verify(&token)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn garbage_is_rejected() {
        let tokens = manager("k9#Qv2!mZ7@pL4$wX8^tR1&yB6*nC3%h");
        assert!(matches!(
            tokens.verify("not.a.token"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let tokens = manager("k9#Qv2!mZ7@pL4$wX8^tR1&yB6*nC3%h");
        let now = Utc::now().timestamp();
        let stale = Claims {
            sub: 7,
            email: "ada@example.com".to_string(),
            role: Role::Customer,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(&Header::default(), &stale, &tokens.encoding).unwrap();
        assert!(matches!(tokens.verify(&token), Err(AuthError::InvalidToken)));
    }
}
