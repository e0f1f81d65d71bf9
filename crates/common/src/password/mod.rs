//! Password hashing for the secondary credential table
//!
//! Argon2id in PHC string format. Independent of the identity provider's
//! own credential store.

use crate::config::PasswordConfig;
use crate::errors::{AppError, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// One-way hash and verify service
#[derive(Clone, Default)]
pub struct PasswordService {
    pepper: Option<String>,
}

impl PasswordService {
    pub fn new(config: &PasswordConfig) -> Self {
        Self {
            pepper: config.pepper.clone(),
        }
    }

    fn peppered(&self, plaintext: &str) -> String {
        match self.pepper {
            Some(ref p) => format!("{p}{plaintext}"),
            None => plaintext.to_string(),
        }
    }

    /// Hash a plaintext password with a fresh salt
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(self.peppered(plaintext).as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal {
                message: format!("Password hashing failed: {}", e),
            })
    }

    /// Verify a plaintext password against a stored digest.
    ///
    /// `Ok(false)` on mismatch; `Err` only when the digest is malformed.
    pub fn verify(&self, plaintext: &str, digest: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest).map_err(|e| AppError::Internal {
            message: format!("Invalid password hash: {}", e),
        })?;

        match Argon2::default().verify_password(self.peppered(plaintext).as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal {
                message: format!("Password verification failed: {}", e),
            }),
        }
    }

    /// Hash on the blocking pool; Argon2 is deliberately slow
    pub async fn hash_async(&self, plaintext: &str) -> Result<String> {
        let service = self.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || service.hash(&plaintext))
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Hashing task failed: {}", e),
            })?
    }

    /// Verify on the blocking pool
    pub async fn verify_async(&self, plaintext: &str, digest: &str) -> Result<bool> {
        let service = self.clone();
        let plaintext = plaintext.to_string();
        let digest = digest.to_string();
        tokio::task::spawn_blocking(move || service.verify(&plaintext, &digest))
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Verification task failed: {}", e),
            })?
    }
}
