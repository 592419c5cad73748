use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::AppConfig;

/// TokenKind
///
/// Access tokens authenticate requests; refresh tokens can only be exchanged
/// for a new access token at `/token/refresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of every token this service signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenKind,
    pub user_id: i64,
    /// Unique per token, so two tokens minted in the same second still differ.
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Encode(jsonwebtoken::errors::Error),
    /// Bad signature, malformed, or expired.
    #[error("token is invalid or expired")]
    Invalid,
    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },
}

/// TokenService
///
/// Signs and verifies HS256 token pairs with the configured secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    pub fn issue(&self, user_id: i64, kind: TokenKind) -> Result<String, TokenError> {
        self.issue_at(user_id, kind, Utc::now())
    }

    /// Signs a token as if it had been issued at `now`.
    pub fn issue_at(
        &self,
        user_id: i64,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let iat = now.timestamp().max(0) as usize;
        let claims = Claims {
            token_type: kind,
            user_id,
            jti: Uuid::new_v4(),
            iat,
            exp: iat + ttl.as_secs() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Encode)
    }

    /// Returns `(refresh, access)` for a freshly authenticated user.
    pub fn issue_pair(&self, user_id: i64) -> Result<(String, String), TokenError> {
        Ok((
            self.issue(user_id, TokenKind::Refresh)?,
            self.issue(user_id, TokenKind::Access)?,
        ))
    }

    /// verify
    ///
    /// Checks signature and expiry, then that the token is of the `expected`
    /// kind. An access token is never accepted where a refresh token is required,
    /// and vice versa.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!("token rejected: {:?}", e.kind());
            TokenError::Invalid
        })?;

        if data.claims.token_type != expected {
            return Err(TokenError::WrongKind { expected });
        }
        Ok(data.claims)
    }

    /// Exchanges a valid refresh token for a new access token.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        self.issue(claims.user_id, TokenKind::Access)
    }
}
