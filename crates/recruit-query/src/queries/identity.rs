//! Bearer token verification.
//!
//! Tokens are HS256-signed JWTs carrying the subject and a space delimited
//! `scope` claim. Unknown scopes are ignored. The raw token is kept on the
//! resulting [`Caller`] so it can be forwarded to the scoring service.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::access::{Caller, Scope};
use super::scoring::Credential;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub scope: String,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("missing bearer token")]
    MissingBearer,
    #[error("invalid bearer token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Caller, IdentityError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        let scopes = data
            .claims
            .scope
            .split_whitespace()
            .filter_map(Scope::parse);

        Ok(Caller::new(
            data.claims.sub.clone(),
            scopes,
            Credential::bearer(token),
        ))
    }

    pub fn caller(&self, headers: &HeaderMap) -> Result<Caller, IdentityError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(IdentityError::MissingBearer)?;

        self.verify(token)
    }
}
