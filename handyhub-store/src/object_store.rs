use async_trait::async_trait;
use handyhub_core::storage::ObjectStore;
use handyhub_core::{CoreError, CoreResult};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Objects as files under `root`, served back from `public_base_url`
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> CoreResult<PathBuf> {
        let relative = Path::new(path);
        let safe = relative.components().all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(CoreError::ValidationError(format!("invalid object path '{}'", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> CoreResult<String> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::InternalError(format!("create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| CoreError::InternalError(format!("write {}: {}", target.display(), e)))?;
        debug!("Stored object {}", target.display());

        Ok(format!("{}/{}", self.public_base_url.trim_end_matches('/'), path))
    }

    async fn delete(&self, path: &str) -> CoreResult<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::InternalError(format!("delete {}: {}", target.display(), e))),
        }
    }
}
