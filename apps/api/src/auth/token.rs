//! Access token creation and validation.
//!
//! Tokens are JWTs signed with HS256 using the `SECRET_KEY` environment
//! variable. The subject claim carries the user id; expiry is 30 minutes.

use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("{0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid user id in token subject")]
    BadSubject,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id as a UUID string.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Issues an access token for the given user.
pub fn create_access_token(secret: &str, user_id: Uuid) -> Result<String, TokenError> {
    let expiry = Utc::now() + Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiry.timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Validates a token's signature and expiry, returning the user id it names.
pub fn verify_access_token(secret: &str, token: &str) -> Result<Uuid, TokenError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::BadSubject)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = create_access_token(SECRET, user_id).unwrap();
        assert_eq!(token.matches('.').count(), 2); // JWT has 3 parts
        assert_eq!(verify_access_token(SECRET, &token).unwrap(), user_id);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let token = create_access_token(SECRET, Uuid::new_v4()).unwrap();
        let tampered = format!("{}x", token);
        assert!(verify_access_token(SECRET, &tampered).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_access_token(SECRET, Uuid::new_v4()).unwrap();
        assert!(verify_access_token("other-secret", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: (Utc::now() - Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_access_token(SECRET, &token).is_err());
    }
}
