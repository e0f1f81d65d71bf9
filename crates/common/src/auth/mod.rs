//! Session resolution
//!
//! Provides:
//! - Bearer token extraction
//! - Local validation of provider-issued access tokens (HS256)
//! - The `SessionContext` extractor handed to every authenticated handler

use crate::errors::{AppError, Result};
use crate::identity::{AuthUser, IdentityProvider};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Audience the identity provider stamps on signed-in user tokens
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Session of the caller, resolved per request from its bearer token
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Tenant ID (equal to the identity provider's user id)
    pub tenant_id: Uuid,

    /// Email on the identity account, when the token carries it
    pub email: Option<String>,

    /// The bearer token itself, needed for sign-out
    pub access_token: String,

    /// Request ID for tracing
    pub request_id: String,
}

/// Access token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (identity user ID)
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,

    pub aud: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Verifies access tokens signed with the identity provider's shared secret
#[derive(Clone)]
pub struct JwtManager {
    decoding_key: DecodingKey,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid session token".to_string(),
                },
            })
    }
}

/// Extract the token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Turns bearer tokens into identity users
#[derive(Clone)]
pub struct SessionResolver {
    identity: Arc<dyn IdentityProvider>,
    jwt: Option<JwtManager>,
}

impl SessionResolver {
    /// With a secret, tokens are verified locally; otherwise the provider is asked
    pub fn new(identity: Arc<dyn IdentityProvider>, jwt_secret: Option<&str>) -> Self {
        Self {
            identity,
            jwt: jwt_secret.map(JwtManager::new),
        }
    }

    pub async fn resolve(&self, token: &str) -> Result<AuthUser> {
        if let Some(jwt) = &self.jwt {
            let claims = jwt.validate_token(token)?;
            let id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized {
                message: "Invalid session token".to_string(),
            })?;
            return Ok(AuthUser {
                id,
                email: claims.email,
            });
        }

        self.identity
            .get_session(token)
            .await?
            .ok_or_else(|| AppError::Unauthorized {
                message: "No active session".to_string(),
            })
    }
}

/// Axum extractor for SessionContext
impl<S> FromRequestParts<S> for SessionContext
where
    SessionResolver: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let access_token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer)
            .map(String::from)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing bearer token".to_string(),
            })?;

        let user = SessionResolver::from_ref(state).resolve(&access_token).await?;

        Ok(SessionContext {
            tenant_id: user.id,
            email: user.email,
            access_token,
            request_id,
        })
    }
}
