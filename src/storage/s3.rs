use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::Region;

use crate::error::{AppError, AppResult};

use super::StorageBackend;

pub struct S3Backend {
    bucket: Box<Bucket>,
    bucket_name: String,
}

impl S3Backend {
    /// Without explicit keys the credentials come from the default AWS chain
    /// (environment, profile, instance metadata).
    pub fn new(
        bucket_name: String,
        region: &str,
        access_key: Option<String>,
        secret_key: Option<String>,
    ) -> AppResult<Self> {
        let region: Region = region
            .parse()
            .map_err(|e| AppError::Storage(format!("S3 region error: {}", e)))?;

        let credentials = Credentials::new(
            access_key.as_deref(),
            secret_key.as_deref(),
            None, // security token
            None, // session token
            None, // profile
        )
        .map_err(|e| AppError::Storage(format!("S3 credentials error: {}", e)))?;

        let bucket = Bucket::new(&bucket_name, region, credentials)
            .map_err(|e| AppError::Storage(format!("S3 bucket error: {}", e)))?;

        Ok(Self {
            bucket,
            bucket_name,
        })
    }
}

fn ensure_success(operation: &str, key: &str, status: u16) -> AppResult<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(AppError::Storage(format!(
            "S3 {} of {} returned HTTP {}",
            operation, key, status
        )))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<()> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {}", e)))?;
        ensure_success("upload", key, response.status_code())?;

        tracing::info!("S3 upload: bucket={}, key={}", self.bucket_name, key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {}", e)))?;
        ensure_success("delete", key, response.status_code())?;

        tracing::info!("S3 delete: bucket={}, key={}", self.bucket_name, key);
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }
}
