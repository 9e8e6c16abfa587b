use async_trait::async_trait;
use log::warn;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhotoStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed storage for order photos. Keys are sha256 hex digests so
/// re-uploading the same file is detected instead of duplicated.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), PhotoStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), PhotoStoreError>;
    async fn delete(&self, hash: &str) -> Result<(), PhotoStoreError>;
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Filesystem store rooted at PHOTO_DIR (default ./data/photos), fanned out by
/// the first two hash characters.
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn from_env() -> anyhow::Result<Self> {
        let root =
            PathBuf::from(std::env::var("PHOTO_DIR").unwrap_or_else(|_| "data/photos".into()));
        std::fs::create_dir_all(&root)
            .map_err(|e| anyhow::anyhow!("cannot create photo dir {}: {e}", root.display()))?;
        Ok(Self { root })
    }

    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        let fan = hash.get(0..2).unwrap_or("00");
        self.root.join(fan).join(hash)
    }
}

#[async_trait]
impl PhotoStore for FsPhotoStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), PhotoStoreError> {
        let path = self.path_for(hash);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PhotoStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PhotoStoreError::Other(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| PhotoStoreError::Other(e.to_string()))
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), PhotoStoreError> {
        let path = self.path_for(hash);
        let bytes = tokio::fs::read(&path).await.map_err(|_| PhotoStoreError::NotFound)?;
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, hash: &str) -> Result<(), PhotoStoreError> {
        // Best-effort delete: treat not found as success
        if let Err(e) = tokio::fs::remove_file(self.path_for(hash)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to delete photo {hash}: {e}");
            }
        }
        Ok(())
    }
}

// Factory helper used in main; panic early if the photo dir is unusable.
pub fn build_photo_store() -> Arc<dyn PhotoStore> {
    match FsPhotoStore::from_env() {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("Failed to initialize photo store: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_and_duplicate_detection() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPhotoStore::at(dir.path().to_path_buf());
        let bytes = b"\x89PNG\r\n\x1a\nfakepng";
        let hash = content_hash(bytes);

        store.save(&hash, "image/png", bytes).await.unwrap();
        assert!(matches!(
            store.save(&hash, "image/png", bytes).await,
            Err(PhotoStoreError::Duplicate)
        ));

        let (loaded, mime) = store.load(&hash).await.unwrap();
        assert_eq!(loaded, bytes);
        assert_eq!(mime, "image/png");

        store.delete(&hash).await.unwrap();
        assert!(matches!(store.load(&hash).await, Err(PhotoStoreError::NotFound)));
    }
}
