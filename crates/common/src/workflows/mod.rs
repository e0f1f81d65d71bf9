//! Business workflows
//!
//! Multi-step operations that span the data store, the identity provider and
//! object storage. Each write sequence is expressed as a [`Saga`](crate::saga::Saga)
//! so partial failures unwind through compensating actions.

pub mod booking;
pub mod listing;
pub mod session;
pub mod signup;

use crate::chat::{create_chat_model, ChatModel};
use crate::config::{AppConfig, WorkflowConfig};
use crate::db::DataStore;
use crate::errors::Result;
use crate::identity::{create_identity_provider, IdentityProvider};
use crate::password::PasswordService;
use crate::storage::{create_object_storage, ObjectStorage};
use std::sync::Arc;

pub use booking::{
    confirmation, create_booking, format_cents, is_available, quote, validate_dates,
    BookingConfirmation, BookingRequest, BookingResult, CardDetails, PaymentChoice, Quote,
};
pub use listing::{create_listing, ImageUpload, ListingRequest, ListingResult};
pub use session::{login, logout, LoginResult};
pub use signup::{signup, SignupRequest, SignupResult};

/// Collaborators shared by every workflow
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DataStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub chat: Arc<dyn ChatModel>,
    pub passwords: PasswordService,
    pub workflow: WorkflowConfig,
}

impl Services {
    /// Build the remote clients named by configuration around an existing store
    pub fn from_config(config: &AppConfig, store: Arc<dyn DataStore>) -> Result<Self> {
        let identity = create_identity_provider(&config.identity)?;
        let storage = create_object_storage(&config.storage, config.request_timeout())?;
        let chat = create_chat_model(&config.chat)?;

        Ok(Self {
            store,
            identity,
            storage,
            chat,
            passwords: PasswordService::new(&config.password),
            workflow: config.workflow.clone(),
        })
    }
}
