//! Login and logout
//!
//! The identity provider is the source of truth for passwords. The secondary
//! credential table is only consulted, when enabled, to log whether a
//! rejected password would have matched the legacy hash.

use crate::db::Tenant;
use crate::errors::{AppError, Result};
use crate::identity::AuthSession;
use crate::workflows::Services;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub session: AuthSession,
    pub tenant: Tenant,
}

/// Sign in with email and password and load the tenant profile
pub async fn login(services: &Services, email: &str, password: &str) -> Result<LoginResult> {
    let session = match services.identity.sign_in_with_password(email, password).await {
        Ok(session) => session,
        Err(AppError::InvalidCredentials) => {
            if services.workflow.legacy_credentials {
                check_legacy_credential(services, email, password).await;
            }
            return Err(AppError::InvalidCredentials);
        }
        Err(e) => return Err(e),
    };

    let tenant = services
        .store
        .find_tenant(session.user.id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %session.user.id, "Signed in without a tenant profile");
            AppError::NotFound {
                resource_type: "User profile".to_string(),
                id: email.to_string(),
            }
        })?;

    tracing::info!(tenant_id = %tenant.id, "Tenant signed in");
    Ok(LoginResult { session, tenant })
}

async fn legacy_match(
    services: &Services,
    email: &str,
    password: &str,
) -> Result<Option<(Uuid, bool)>> {
    let Some(tenant) = services.store.find_tenant_by_email(email).await? else {
        return Ok(None);
    };
    let Some(credential) = services.store.find_credential(tenant.id).await? else {
        return Ok(None);
    };
    let matched = services
        .passwords
        .verify_async(password, &credential.password_hash)
        .await?;
    Ok(Some((tenant.id, matched)))
}

/// Compare against the legacy hash and log the outcome. Never grants access.
async fn check_legacy_credential(services: &Services, email: &str, password: &str) {
    match legacy_match(services, email, password).await {
        Ok(Some((tenant_id, true))) => tracing::warn!(
            tenant_id = %tenant_id,
            "Legacy credential matched a password the identity provider rejected"
        ),
        Ok(Some((tenant_id, false))) => {
            tracing::debug!(tenant_id = %tenant_id, "Legacy credential mismatch")
        }
        Ok(None) => tracing::debug!("No legacy credential for login attempt"),
        Err(e) => tracing::warn!(error = %e, "Legacy credential check failed"),
    }
}

/// End the session behind an access token
pub async fn logout(services: &Services, access_token: &str) -> Result<()> {
    services.identity.sign_out(access_token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::identity::{IdentityProvider, SignUpAttributes};
    use crate::workflows::signup::{signup, SignupRequest};
    use crate::workflows::testing::Harness;
    use chrono::NaiveDate;

    fn request() -> SignupRequest {
        SignupRequest {
            name: "Ada".to_string(),
            email: "a@b.com".to_string(),
            phone: "555-0001".to_string(),
            address: "1 Analytical Way".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            verification_id: "DL-1".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_after_signup() {
        let h = Harness::new();
        let registered = signup(&h.services, request()).await.unwrap();

        let result = login(&h.services, "a@b.com", "secret1").await.unwrap();
        assert_eq!(result.tenant.id, registered.tenant.id);

        let user = h.identity.get_session(&result.session.access_token).await.unwrap();
        assert_eq!(user.map(|u| u.id), Some(registered.tenant.id));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let h = Harness::new();
        signup(&h.services, request()).await.unwrap();

        let err = login(&h.services, "a@b.com", "wrong-password").await.unwrap_err();
        assert_eq!(err.to_string(), "Email or password is incorrect");
    }

    #[tokio::test]
    async fn test_legacy_path_never_grants_access() {
        let h = Harness::with_workflow(WorkflowConfig {
            legacy_credentials: true,
            ..WorkflowConfig::default()
        });
        signup(&h.services, request()).await.unwrap();

        let err = login(&h.services, "a@b.com", "wrong-password").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_account_without_profile() {
        let h = Harness::new();
        h.identity
            .sign_up("ghost@b.com", "secret1", &SignUpAttributes { name: "Ghost".to_string() })
            .await
            .unwrap();

        let err = login(&h.services, "ghost@b.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let h = Harness::new();
        signup(&h.services, request()).await.unwrap();
        let result = login(&h.services, "a@b.com", "secret1").await.unwrap();

        logout(&h.services, &result.session.access_token).await.unwrap();
        let user = h.identity.get_session(&result.session.access_token).await.unwrap();
        assert!(user.is_none());
    }
}
