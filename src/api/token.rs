//! HS256 bearer tokens.

use crate::errors::{Error, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Which identity table a token refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Row in `users`
    Student,
    /// Row in `mentors`
    Mentor,
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Student or mentor id
    pub sub: i64,
    /// Email at the time of issue
    pub email: String,
    /// Identity table
    pub role: Role,
    /// Issued at (seconds since the epoch)
    pub iat: usize,
    /// Expiry (seconds since the epoch)
    pub exp: usize,
}

/// Signs a token valid for `ttl_hours`.
///
/// # Errors
/// Returns `Token` if signing fails.
pub fn issue_token(
    id: i64,
    email: &str,
    role: Role,
    secret: &[u8],
    ttl_hours: i64,
) -> Result<String> {
    let now = chrono::Utc::now();
    let expires = now + chrono::Duration::hours(ttl_hours);
    let claims = Claims {
        sub: id,
        email: email.to_string(),
        role,
        iat: usize::try_from(now.timestamp()).unwrap_or_default(),
        exp: usize::try_from(expires.timestamp()).unwrap_or_default(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).map_err(|e| {
        Error::Token {
            message: e.to_string(),
        }
    })
}

/// Verifies signature and expiry and returns the claims.
///
/// # Errors
/// Returns `Token` for a malformed, forged or expired token.
pub fn decode_token(token: &str, secret: &[u8]) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| Error::Token {
        message: e.to_string(),
    })
}
