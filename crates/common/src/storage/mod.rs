//! Object storage for listing images
//!
//! - Storage REST API of the hosted backend (`/storage/v1`)
//! - In-memory bucket for local runs and tests

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::RwLock;

/// Trait for a public object bucket
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload bytes under `key`. Fails if the key already exists.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Public URL for an object
    fn public_url(&self, key: &str) -> Result<String>;
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[/\\]").expect("static pattern"))
}

/// Object key for a listing image: the trimmed address with path separators
/// replaced by `-`, plus the uploaded file's extension.
pub fn object_key_for_address(address: &str, file_name: &str) -> String {
    let address = separator_pattern().replace_all(address.trim(), "-");
    let extension = file_name.rsplit('.').next().unwrap_or(file_name);
    format!("{}.{}", address, extension)
}

fn object_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AppError::Configuration {
            message: format!("storage base URL cannot be a base: {}", base),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Storage REST client
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    bucket: String,
    cache_control_secs: u64,
}

impl HttpObjectStorage {
    pub fn new(
        base_url: &str,
        api_key: String,
        bucket: String,
        cache_control_secs: u64,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| AppError::Configuration {
            message: format!("Invalid storage base URL: {}", e),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            bucket,
            cache_control_secs,
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = object_url(&self.base_url, &["storage", "v1", "object", &self.bucket, key])?;

        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Content-Type", content_type)
            .header("Cache-Control", format!("max-age={}", self.cache_control_secs))
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Upload request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage {
                message: format!("Upload rejected {}: {}", status, body),
            });
        }

        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String> {
        object_url(
            &self.base_url,
            &["storage", "v1", "object", "public", &self.bucket, key],
        )
        .map(String::from)
    }
}

/// In-memory bucket
pub struct MemoryStorage {
    bucket: String,
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
    failing: RwLock<bool>,
}

impl MemoryStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
            failing: RwLock::new(false),
        }
    }

    /// Make every upload fail
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        if *self.failing.read().await {
            return Err(AppError::Storage {
                message: "storage unavailable".to_string(),
            });
        }

        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(AppError::Storage {
                message: format!("The resource already exists: {}", key),
            });
        }
        objects.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String> {
        Ok(format!("memory://{}/{}", self.bucket, key))
    }
}

/// Create object storage based on configuration
pub fn create_object_storage(
    config: &StorageConfig,
    timeout: Duration,
) -> Result<Arc<dyn ObjectStorage>> {
    match config.provider.as_str() {
        "http" => {
            let base_url = config.base_url.as_deref().ok_or_else(|| AppError::Configuration {
                message: "storage.base_url is required for the http provider".to_string(),
            })?;
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "storage.api_key is required for the http provider".to_string(),
            })?;
            Ok(Arc::new(HttpObjectStorage::new(
                base_url,
                api_key,
                config.bucket.clone(),
                config.cache_control_secs,
                timeout,
            )?))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new(config.bucket.clone()))),
        other => Err(AppError::Configuration {
            message: format!("Unknown storage provider: {}", other),
        }),
    }
}
