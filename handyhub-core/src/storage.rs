use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Blob storage with publicly retrievable URLs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `path`, replacing any previous object, and return its public URL
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> CoreResult<String>;

    async fn delete(&self, path: &str) -> CoreResult<()>;
}

/// Map an accepted image content type to its file extension
pub fn image_extension(content_type: &str) -> CoreResult<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/webp" => Ok("webp"),
        other => Err(CoreError::ValidationError(format!(
            "unsupported image type '{}' (png, jpeg or webp)",
            other
        ))),
    }
}

/// `providers/{provider_id}/{random}.{ext}`
pub fn provider_image_path(provider_id: Uuid, extension: &str) -> String {
    format!("providers/{}/{}.{}", provider_id, Uuid::new_v4(), extension)
}

#[derive(Default)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, path: &str) -> Option<(String, Vec<u8>)> {
        self.objects.read().await.get(path).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> CoreResult<String> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), path))
    }

    async fn delete(&self, path: &str) -> CoreResult<()> {
        self.objects.write().await.remove(path);
        Ok(())
    }
}
