//! Bearer-token authentication. Tokens are issued by the authentication service; this crate
//! only verifies them and extracts the caller's identity.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

/// HS256 secret shared with the authentication service.
#[derive(Clone)]
pub struct JwtSecret(pub Arc<String>);

impl JwtSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::new(secret.into()))
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    JwtSecret: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let secret = JwtSecret::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing credentials".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

        let claims = decode_token(secret.0.as_str(), token)?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        let message = match e.kind() {
            ErrorKind::ExpiredSignature => "Expired token",
            _ => "Invalid credentials",
        };
        AppError::Unauthorized(message.to_string())
    })
}

/// Issues a token the extractor accepts. Used by tooling and tests.
pub fn encode_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    ttl: chrono::Duration,
) -> Result<String, AppError> {
    let exp = (Utc::now() + ttl).timestamp().max(0) as usize;
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))
}
