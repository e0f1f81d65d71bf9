//! Account handlers: signup, login, logout and the current profile

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use fareinn_common::{
    auth::SessionContext,
    db::{PropertyOwner, Tenant},
    errors::{AppError, Result},
    identity::AuthSession,
    workflows::{self, SignupRequest},
};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Tokens plus the tenant they belong to
#[derive(Serialize)]
pub struct SessionResponse {
    pub tenant: Tenant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl SessionResponse {
    fn new(tenant: Tenant, session: Option<AuthSession>) -> Self {
        match session {
            Some(s) => Self {
                tenant,
                access_token: Some(s.access_token),
                refresh_token: s.refresh_token,
                expires_in: s.expires_in,
            },
            None => Self {
                tenant,
                access_token: None,
                refresh_token: None,
                expires_in: None,
            },
        }
    }
}

#[derive(Serialize)]
pub struct MeResponse {
    pub tenant: Tenant,
    pub host: Option<PropertyOwner>,
}

/// Register a tenant
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let result = workflows::signup(&state.services, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::new(result.tenant, result.session)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    request.validate()?;

    let result = workflows::login(&state.services, request.email.trim(), &request.password).await?;
    Ok(Json(SessionResponse::new(result.tenant, Some(result.session))))
}

pub async fn logout(State(state): State<AppState>, session: SessionContext) -> Result<StatusCode> {
    workflows::logout(&state.services, &session.access_token).await?;

    tracing::info!(tenant_id = %session.tenant_id, request_id = %session.request_id, "Signed out");
    Ok(StatusCode::NO_CONTENT)
}

/// Profile of the caller, including their host record once they have listed
pub async fn me(State(state): State<AppState>, session: SessionContext) -> Result<Json<MeResponse>> {
    let store = &state.services.store;
    let (tenant, host) = futures::try_join!(
        store.find_tenant(session.tenant_id),
        store.find_host_by_tenant(session.tenant_id),
    )?;

    let tenant = tenant.ok_or_else(|| AppError::NotFound {
        resource_type: "User profile".to_string(),
        id: session.tenant_id.to_string(),
    })?;

    Ok(Json(MeResponse { tenant, host }))
}
