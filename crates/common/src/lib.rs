//! FareInn Common Library
//!
//! Shared code for the FareInn services including:
//! - Database models and the data store seam
//! - Identity provider, object storage and chat model clients
//! - Saga-based booking, listing and signup workflows
//! - Error types and handling
//! - Configuration management
//! - Session resolution
//! - Metrics and observability

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod metrics;
pub mod password;
pub mod saga;
pub mod storage;
pub mod workflows;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DataStore, MemoryStore, Repository};
pub use errors::{AppError, Result};
pub use workflows::Services;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
