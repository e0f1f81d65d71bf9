//! Identity provider abstraction
//!
//! Wraps sign-up, password sign-in, session lookup and sign-out against an
//! external auth service:
//! - GoTrue-compatible REST API (the hosted backend's `/auth/v1`)
//! - In-memory provider for local runs and tests

use crate::config::IdentityConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Message reported when the provider already knows the email
pub const DUPLICATE_ACCOUNT_MESSAGE: &str = "An account with this email already exists";

/// A user as seen by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

/// Result of a sign-up. `session` is absent when the provider requires email confirmation.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<AuthSession>,
}

/// Profile attributes stored alongside the provider account
#[derive(Debug, Clone, Serialize)]
pub struct SignUpAttributes {
    pub name: String,
}

/// Trait for the external identity service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &SignUpAttributes,
    ) -> Result<SignUpOutcome>;

    /// Exchange email and password for a session
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Resolve an access token to its user, `None` if the token is not a live session
    async fn get_session(&self, access_token: &str) -> Result<Option<AuthUser>>;

    /// Invalidate the session behind an access token
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

/// GoTrue REST client
pub struct GoTrueClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a SignUpAttributes,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

/// Sign-up returns a session when auto-confirm is on, a bare user otherwise
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(AuthSession),
    User(AuthUser),
}

#[derive(Deserialize, Default)]
struct GoTrueError {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl GoTrueError {
    fn text(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error_description.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }

    fn is_duplicate(&self) -> bool {
        self.error_code.as_deref() == Some("user_already_exists")
            || self.text().contains("already registered")
    }
}

impl GoTrueClient {
    /// Create a new client for `{base_url}/auth/v1`
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: format!("{}/auth/v1", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    async fn error_from(response: reqwest::Response) -> GoTrueError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str(&body).unwrap_or_else(|_| GoTrueError {
            msg: Some(format!("{} {}", status, body)),
            ..Default::default()
        })
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &SignUpAttributes,
    ) -> Result<SignUpOutcome> {
        let response = self
            .client
            .post(format!("{}/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&SignUpRequest {
                email,
                password,
                data: attributes,
            })
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let err = Self::error_from(response).await;
            if err.is_duplicate() {
                return Err(AppError::Duplicate {
                    message: DUPLICATE_ACCOUNT_MESSAGE.to_string(),
                });
            }
            return Err(AppError::IdentityProvider { message: err.text() });
        }

        let parsed: SignUpResponse = response.json().await.map_err(|e| {
            AppError::IdentityProvider {
                message: format!("Failed to parse sign-up response: {}", e),
            }
        })?;

        Ok(match parsed {
            SignUpResponse::Session(session) => SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            },
            SignUpResponse::User(user) => SignUpOutcome { user, session: None },
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let response = self
            .client
            .post(format!("{}/token?grant_type=password", self.base_url))
            .header("apikey", &self.api_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider {
                message: format!("Request failed: {}", e),
            })?;

        match response.status().as_u16() {
            200..=299 => response.json().await.map_err(|e| AppError::IdentityProvider {
                message: format!("Failed to parse session: {}", e),
            }),
            400 | 401 => {
                let err = Self::error_from(response).await;
                tracing::debug!(error = %err.text(), "Password sign-in rejected");
                Err(AppError::InvalidCredentials)
            }
            _ => Err(AppError::IdentityProvider {
                message: Self::error_from(response).await.text(),
            }),
        }
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let response = self
            .client
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider {
                message: format!("Request failed: {}", e),
            })?;

        match response.status().as_u16() {
            200..=299 => response.json().await.map(Some).map_err(|e| {
                AppError::IdentityProvider {
                    message: format!("Failed to parse user: {}", e),
                }
            }),
            401 | 403 => Ok(None),
            _ => Err(AppError::IdentityProvider {
                message: Self::error_from(response).await.text(),
            }),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider {
                message: format!("Request failed: {}", e),
            })?;

        // An already-dead session is as good as a signed-out one
        if response.status().is_success() || response.status().as_u16() == 401 {
            Ok(())
        } else {
            Err(AppError::IdentityProvider {
                message: Self::error_from(response).await.text(),
            })
        }
    }
}

#[derive(Clone)]
struct MockAccount {
    user: AuthUser,
    password: String,
}

/// In-memory identity provider
#[derive(Default)]
pub struct MockIdentityProvider {
    accounts: RwLock<HashMap<String, MockAccount>>,
    sessions: RwLock<HashMap<String, AuthUser>>,
    unavailable: RwLock<bool>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the provider were down
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    async fn check_available(&self) -> Result<()> {
        if *self.unavailable.read().await {
            return Err(AppError::IdentityProvider {
                message: "identity provider unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn open_session(&self, user: &AuthUser) -> AuthSession {
        let token = format!("mock_{}", Uuid::new_v4().simple());
        self.sessions.write().await.insert(token.clone(), user.clone());
        AuthSession {
            access_token: token,
            refresh_token: None,
            expires_in: Some(3600),
            user: user.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _attributes: &SignUpAttributes,
    ) -> Result<SignUpOutcome> {
        self.check_available().await?;

        let user = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(email) {
                return Err(AppError::Duplicate {
                    message: DUPLICATE_ACCOUNT_MESSAGE.to_string(),
                });
            }
            let user = AuthUser {
                id: Uuid::new_v4(),
                email: Some(email.to_string()),
            };
            accounts.insert(
                email.to_string(),
                MockAccount {
                    user: user.clone(),
                    password: password.to_string(),
                },
            );
            user
        };

        let session = self.open_session(&user).await;
        Ok(SignUpOutcome {
            user,
            session: Some(session),
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.check_available().await?;

        let account = self.accounts.read().await.get(email).cloned();
        match account {
            Some(account) if account.password == password => Ok(self.open_session(&account.user).await),
            _ => Err(AppError::InvalidCredentials),
        }
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<AuthUser>> {
        self.check_available().await?;
        Ok(self.sessions.read().await.get(access_token).cloned())
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.sessions.write().await.remove(access_token);
        Ok(())
    }
}

/// Create an identity provider based on configuration
pub fn create_identity_provider(config: &IdentityConfig) -> Result<Arc<dyn IdentityProvider>> {
    match config.provider.as_str() {
        "gotrue" => {
            let base_url = config.base_url.as_deref().ok_or_else(|| AppError::Configuration {
                message: "identity.base_url is required for the gotrue provider".to_string(),
            })?;
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "identity.api_key is required for the gotrue provider".to_string(),
            })?;
            Ok(Arc::new(GoTrueClient::new(
                base_url,
                api_key,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "memory" => Ok(Arc::new(MockIdentityProvider::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown identity provider: {}", other),
        }),
    }
}
