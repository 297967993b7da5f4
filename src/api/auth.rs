//! Bearer / cookie JWT authentication.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::AppState;
use crate::EcommerceError;

const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Buyer,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default)]
    pub role: Role,
}

pub struct JwtKeys { decoding: DecodingKey, validation: Validation }

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self { decoding: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::new(Algorithm::HS256) }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, EcommerceError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| EcommerceError::Unauthorized(e.to_string()))
    }
}

/// The authenticated buyer.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser { pub user_id: Uuid }

/// A caller allowed to write the catalog.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser { pub user_id: Uuid }

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim)
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers.get_all(COOKIE).iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value)
}

fn claims(headers: &HeaderMap, keys: &JwtKeys) -> Result<Claims, EcommerceError> {
    let header = bearer(headers);
    let cookie = cookie_token(headers);
    if let (Some(h), Some(c)) = (header, cookie) {
        if h != c { warn!("authorization header and token cookie differ, using the header"); }
    }
    let token = header.or(cookie).ok_or_else(|| EcommerceError::Unauthorized("missing token".to_string()))?;
    keys.verify(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = claims(&parts.headers, &state.jwt)?;
        Ok(AuthUser { user_id: claims.sub })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = claims(&parts.headers, &state.jwt)?;
        if claims.role != Role::Admin {
            warn!(user_id = %claims.sub, "catalog write refused for non-admin token");
            return Err(EcommerceError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminUser { user_id: claims.sub })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; token=abc.def.ghi"));
        assert_eq!(cookie_token(&headers), Some("abc.def.ghi"));
        assert_eq!(bearer(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(bearer(&headers), Some("xyz"));
    }

    #[test]
    fn test_role_defaults_to_buyer() {
        let claims: Claims = serde_json::from_value(serde_json::json!({"sub": Uuid::new_v4(), "exp": 1})).unwrap();
        assert_eq!(claims.role, Role::Buyer);
        let claims: Claims = serde_json::from_value(serde_json::json!({"sub": Uuid::new_v4(), "exp": 1, "role": "admin"})).unwrap();
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let keys = JwtKeys::new("0123456789abcdef0123456789abcdef");
        assert!(matches!(keys.verify("not-a-jwt"), Err(EcommerceError::Unauthorized(_))));
    }
}
