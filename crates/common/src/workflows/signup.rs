//! Account registration
//!
//! identity account → tenant row → password hash → credential row.
//! A failed credential write deletes the tenant row again. The identity
//! account is never removed: the provider offers no delete for it.

use crate::db::{DataStore, NewTenant, Tenant};
use crate::errors::{AppError, Result};
use crate::identity::{AuthSession, IdentityProvider, SignUpAttributes, SignUpOutcome};
use crate::password::PasswordService;
use crate::saga::{Saga, SagaStep};
use crate::workflows::Services;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use validator::Validate;

/// Candidate profile submitted at signup
#[derive(Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 50))]
    pub phone: String,
    #[validate(length(min = 1, max = 500))]
    pub address: String,
    pub date_of_birth: NaiveDate,
    #[validate(length(min = 1, max = 100))]
    pub verification_id: String,
    pub password: String,
    pub confirm_password: String,
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl SignupRequest {
    /// Local checks, run before any remote call
    pub fn check(&self, min_password_length: usize) -> Result<()> {
        if self.password != self.confirm_password {
            return Err(AppError::Validation {
                message: "Passwords do not match".to_string(),
                field: Some("confirm_password".to_string()),
            });
        }

        if self.password.chars().count() < min_password_length {
            return Err(AppError::Validation {
                message: format!("Password must be at least {} characters", min_password_length),
                field: Some("password".to_string()),
            });
        }

        self.validate()?;
        Ok(())
    }
}

/// A registered tenant and, when the provider issued one, its session
#[derive(Debug, Clone)]
pub struct SignupResult {
    pub tenant: Tenant,
    pub session: Option<AuthSession>,
}

struct SignupContext {
    request: SignupRequest,
    account: Option<SignUpOutcome>,
    tenant: Option<Tenant>,
    password_hash: Option<String>,
}

impl SignupContext {
    fn tenant(&self) -> Result<&Tenant> {
        self.tenant.as_ref().ok_or_else(|| AppError::Internal {
            message: "tenant row missing from signup context".to_string(),
        })
    }
}

struct CreateIdentity {
    identity: Arc<dyn IdentityProvider>,
}

#[async_trait]
impl SagaStep<SignupContext> for CreateIdentity {
    fn name(&self) -> &'static str {
        "create_identity"
    }

    async fn execute(&self, ctx: &mut SignupContext) -> Result<()> {
        let attributes = SignUpAttributes {
            name: ctx.request.name.clone(),
        };
        let outcome = self
            .identity
            .sign_up(&ctx.request.email, &ctx.request.password, &attributes)
            .await?;

        tracing::info!(user_id = %outcome.user.id, "Identity account created");
        ctx.account = Some(outcome);
        Ok(())
    }
}

struct InsertTenant {
    store: Arc<dyn DataStore>,
}

#[async_trait]
impl SagaStep<SignupContext> for InsertTenant {
    fn name(&self) -> &'static str {
        "insert_tenant"
    }

    async fn execute(&self, ctx: &mut SignupContext) -> Result<()> {
        let user_id = ctx
            .account
            .as_ref()
            .map(|a| a.user.id)
            .ok_or_else(|| AppError::Internal {
                message: "identity account missing from signup context".to_string(),
            })?;

        let request = &ctx.request;
        let tenant = self
            .store
            .insert_tenant(NewTenant {
                id: user_id,
                name: request.name.clone(),
                email: request.email.clone(),
                phone: request.phone.clone(),
                address: request.address.clone(),
                date_of_birth: request.date_of_birth,
                verification_id: request.verification_id.clone(),
            })
            .await?;

        tracing::info!(tenant_id = %tenant.id, "Tenant created");
        ctx.tenant = Some(tenant);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SignupContext) -> Result<()> {
        let tenant_id = ctx.tenant()?.id;
        self.store.delete_tenant(tenant_id).await?;
        tracing::warn!(tenant_id = %tenant_id, "Tenant row rolled back");
        Ok(())
    }
}

struct HashPassword {
    passwords: PasswordService,
}

#[async_trait]
impl SagaStep<SignupContext> for HashPassword {
    fn name(&self) -> &'static str {
        "hash_password"
    }

    async fn execute(&self, ctx: &mut SignupContext) -> Result<()> {
        ctx.password_hash = Some(self.passwords.hash_async(&ctx.request.password).await?);
        Ok(())
    }
}

struct StoreCredential {
    store: Arc<dyn DataStore>,
}

#[async_trait]
impl SagaStep<SignupContext> for StoreCredential {
    fn name(&self) -> &'static str {
        "store_credential"
    }

    async fn execute(&self, ctx: &mut SignupContext) -> Result<()> {
        let tenant_id = ctx.tenant()?.id;
        let hash = ctx.password_hash.take().ok_or_else(|| AppError::Internal {
            message: "password hash missing from signup context".to_string(),
        })?;

        self.store.insert_credential(tenant_id, hash).await?;
        Ok(())
    }
}

fn signup_saga(services: &Services) -> Saga<SignupContext> {
    Saga::new("signup")
        .step(CreateIdentity {
            identity: services.identity.clone(),
        })
        .step(InsertTenant {
            store: services.store.clone(),
        })
        .step(HashPassword {
            passwords: services.passwords.clone(),
        })
        .step(StoreCredential {
            store: services.store.clone(),
        })
}

/// Register a new tenant
pub async fn signup(services: &Services, request: SignupRequest) -> Result<SignupResult> {
    request.check(services.workflow.min_password_length)?;

    let mut ctx = SignupContext {
        request,
        account: None,
        tenant: None,
        password_hash: None,
    };

    signup_saga(services).run(&mut ctx).await?;

    let session = ctx.account.and_then(|a| a.session);
    let tenant = ctx.tenant.ok_or_else(|| AppError::Internal {
        message: "signup finished without a tenant".to_string(),
    })?;

    Ok(SignupResult { tenant, session })
}
