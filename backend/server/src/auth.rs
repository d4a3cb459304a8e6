//! # Auth
//!
//! - Passwords: bcrypt, hashed on the blocking pool
//! - Sessions: HS256 JWT in `Authorization: Bearer`, holding the customer id and role
//! - Every authenticated request reloads the customer, so deactivating or demoting
//!   someone takes effect before their token expires
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use shop::models::{Customer, Role};
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::{
    error::AppError,
    state::AppState,
    store::collections::CUSTOMERS,
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub fn issue_token(state: &AppState, customer: &Customer) -> Result<String, AppError> {
    let claims = Claims {
        sub: customer.id.clone(),
        role: customer.role,
        exp: (Utc::now() + Duration::hours(state.config.token_ttl_hours)).timestamp(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &state.keys.encoding).map_err(AppError::internal)
}

pub fn verify_token(keys: &TokenKeys, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(token, &keys.decoding, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims)
        .map_err(|e| {
            warn!("Rejected token: {e}");
            AppError::Unauthorized
        })
}

pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)
}

pub fn check_password_strength(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::MalformedPayload(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    Ok(())
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Any signed-in, active customer.
pub struct AuthUser(pub Customer);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(AppError::Unauthorized)?;
        let claims = verify_token(&state.keys, token)?;

        let customer: Customer = state
            .db
            .load(CUSTOMERS, &claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !customer.active {
            return Err(AppError::Forbidden);
        }

        Ok(AuthUser(customer))
    }
}

/// Signed-in customer with `role == admin`.
pub struct AdminUser(pub Customer);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(customer) = AuthUser::from_request_parts(parts, state).await?;

        if customer.role != Role::Admin {
            return Err(AppError::Forbidden);
        }

        Ok(AdminUser(customer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip_and_tamper() {
        let keys = TokenKeys::new(b"secret");
        let claims = Claims {
            sub: "c1".to_string(),
            role: Role::Admin,
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();

        let decoded = verify_token(&keys, &token).unwrap();
        assert_eq!(decoded.sub, "c1");
        assert_eq!(decoded.role, Role::Admin);

        let other = TokenKeys::new(b"other");
        assert!(verify_token(&other, &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = TokenKeys::new(b"secret");
        let claims = Claims {
            sub: "c1".to_string(),
            role: Role::Customer,
            exp: (Utc::now() - Duration::hours(2)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();

        assert!(verify_token(&keys, &token).is_err());
    }

    #[tokio::test]
    async fn test_password_hash() {
        let hash = hash_password("correct horse".to_string(), 4).await.unwrap();

        assert!(verify_password("correct horse".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_string(), hash).await.unwrap());
    }
}
