//! Bearer-token identity glue
//!
//! Identity is an external collaborator; the API surface only validates the
//! HS256 tokens it issues and extracts the caller id the playback engine
//! authorizes against.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use roomplay_core::models::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Caller's user id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_duration: Duration,
}

impl JwtService {
    #[must_use]
    pub fn new(secret: &str, token_duration_hours: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            token_duration: Duration::hours(token_duration_hours as i64),
        }
    }

    /// Sign a token for a user (used by tooling and tests; production tokens
    /// come from the identity collaborator sharing the same secret).
    pub fn sign(&self, user_id: &UserId) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_duration).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Validate a token and extract the caller id.
    pub fn verify(&self, token: &str) -> Result<UserId, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(UserId::from_string(data.claims.sub))
    }
}
