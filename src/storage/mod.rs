// Object storage for item photos.

pub mod s3;

pub use s3::S3Backend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Prefix shared by every item photo key.
pub const ITEM_KEY_PREFIX: &str = "items";

/// Raw blob store operations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    fn bucket(&self) -> &str;
}

/// Where an uploaded photo ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub url: String,
}

/// Uploads photos under collision-free keys and hands back their public URLs.
#[derive(Clone)]
pub struct ObjectStoreGateway {
    backend: Arc<dyn StorageBackend>,
    timeout: Duration,
}

impl ObjectStoreGateway {
    pub fn new(backend: Arc<dyn StorageBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn store(
        &self,
        data: &[u8],
        content_type: &str,
        filename: &str,
    ) -> AppResult<StoredObject> {
        let key = object_key(filename);

        tokio::time::timeout(self.timeout, self.backend.upload(&key, data, content_type))
            .await
            .map_err(|_| {
                AppError::Storage(format!(
                    "upload of {} timed out after {:?}",
                    key, self.timeout
                ))
            })??;

        let bucket = self.backend.bucket().to_string();
        let url = public_url(&bucket, &key);
        tracing::info!("Stored image: key={}, size={}, url={}", key, data.len(), url);

        Ok(StoredObject { bucket, key, url })
    }

    /// Best-effort removal used to undo uploads of a failed request.
    pub async fn discard(&self, objects: &[StoredObject]) {
        for object in objects {
            match tokio::time::timeout(self.timeout, self.backend.delete(&object.key)).await {
                Ok(Ok(())) => tracing::info!("Discarded orphaned upload: key={}", object.key),
                Ok(Err(e)) => {
                    tracing::warn!("Failed to discard upload {}: {}", object.key, e)
                }
                Err(_) => tracing::warn!("Timed out discarding upload {}", object.key),
            }
        }
    }
}

/// `items/{uuid}_{filename}` with any directory part of the filename dropped.
pub fn object_key(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{}/{}_{}", ITEM_KEY_PREFIX, Uuid::new_v4(), base)
}

/// `https://{bucket}.s3.amazonaws.com/{key}` with each key segment percent-encoded.
pub fn public_url(bucket: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("https://{}.s3.amazonaws.com/{}", bucket, encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStorage;

    #[test]
    fn test_object_key_layout() {
        let key = object_key("wallet photo.jpg");
        assert!(key.starts_with("items/"));
        assert!(key.ends_with("_wallet photo.jpg"));

        let uuid_part = &key["items/".len()..key.len() - "_wallet photo.jpg".len()];
        assert!(Uuid::parse_str(uuid_part).is_ok());
    }

    #[test]
    fn test_object_key_is_unique_and_strips_directories() {
        assert_ne!(object_key("a.png"), object_key("a.png"));
        assert!(object_key("C:\\Users\\me\\a.png").ends_with("_a.png"));
        assert!(object_key("../../etc/a.png").ends_with("_a.png"));
        assert!(object_key("").ends_with("_image"));
    }

    #[test]
    fn test_public_url_encodes_segments_but_keeps_slashes() {
        assert_eq!(
            public_url("lf-bucket", "items/abc_my bag.jpg"),
            "https://lf-bucket.s3.amazonaws.com/items/abc_my%20bag.jpg"
        );
    }

    #[tokio::test]
    async fn test_store_and_discard() {
        let storage = Arc::new(MemoryStorage::new("lf-bucket"));
        let gateway = ObjectStoreGateway::new(storage.clone(), Duration::from_secs(5));

        let stored = gateway.store(b"bytes", "image/png", "cat.png").await.unwrap();
        assert_eq!(stored.bucket, "lf-bucket");
        assert!(storage.contains(&stored.key));
        assert_eq!(stored.url, public_url("lf-bucket", &stored.key));

        gateway.discard(std::slice::from_ref(&stored)).await;
        assert!(!storage.contains(&stored.key));
    }

    #[tokio::test]
    async fn test_store_surfaces_upload_failure() {
        let storage = Arc::new(MemoryStorage::new("lf-bucket"));
        storage.fail_uploads(true);
        let gateway = ObjectStoreGateway::new(storage, Duration::from_secs(5));

        let result = gateway.store(b"bytes", "image/png", "cat.png").await;
        assert!(matches!(result, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_store_times_out() {
        let storage = Arc::new(MemoryStorage::new("lf-bucket"));
        storage.set_delay(Duration::from_millis(500));
        let gateway = ObjectStoreGateway::new(storage, Duration::from_millis(20));

        let result = gateway.store(b"bytes", "image/png", "cat.png").await;
        assert!(matches!(result, Err(AppError::Storage(msg)) if msg.contains("timed out")));
    }
}
