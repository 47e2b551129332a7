//! Object storage implementation using S3/MinIO
//!
//! Holds the source videos and the per-second still frames the extractor
//! produces. Frames are keyed `<video_object_key>/<frame_file>` so one
//! video's frames share a listable prefix.

use crate::{StorageError, StorageResult};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// S3/MinIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket holding uploaded source videos
    pub video_bucket: String,

    /// Bucket holding extracted still frames
    pub image_bucket: String,

    /// AWS region (e.g., "us-west-2") or "us-east-1" for `MinIO`
    pub region: String,

    /// S3 endpoint (custom for `MinIO`, empty for AWS S3)
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            video_bucket: std::env::var("VIDEO_BUCKET")
                .unwrap_or_else(|_| "video-narrative-videos".to_string()),
            image_bucket: std::env::var("IMAGE_BUCKET")
                .unwrap_or_else(|_| "video-narrative-images".to_string()),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

/// Object storage trait
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an object from bytes
    async fn store_file(&self, key: &str, data: &[u8]) -> StorageResult<String>;

    /// Store an object from a local path
    async fn store_file_from_path(&self, key: &str, path: &Path) -> StorageResult<String>;

    /// Retrieve an object as bytes
    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Retrieve an object and save it to a local path
    async fn retrieve_file_to_path(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// List object keys with a prefix
    async fn list_files(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// S3/MinIO object storage implementation, bound to one bucket
pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
}

impl S3ObjectStorage {
    /// Create a client bound to the given bucket
    pub fn new(config: &S3Config, bucket: impl Into<String>) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "video-narrative-storage",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Custom endpoint for MinIO
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Client for the video bucket
    #[must_use]
    pub fn videos(config: &S3Config) -> Self {
        Self::new(config, config.video_bucket.clone())
    }

    /// Client for the image bucket
    #[must_use]
    pub fn images(config: &S3Config) -> Self {
        Self::new(config, config.image_bucket.clone())
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn store_file(&self, key: &str, data: &[u8]) -> StorageResult<String> {
        let byte_stream = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(byte_stream)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(key.to_string())
    }

    async fn store_file_from_path(&self, key: &str, path: &Path) -> StorageResult<String> {
        let data = tokio::fs::read(path).await?;
        self.store_file(key, &data).await
    }

    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3Error(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn retrieve_file_to_path(&self, key: &str, path: &Path) -> StorageResult<()> {
        let data = self.retrieve_file(key).await?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(std::string::ToString::to_string))
            .collect();

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_config_default_buckets() {
        let config = S3Config::default();
        assert_eq!(config.video_bucket, "video-narrative-videos");
        assert_eq!(config.image_bucket, "video-narrative-images");
        assert_eq!(config.endpoint, None);
    }

    #[test]
    fn test_s3_config_with_minio() {
        let config = S3Config {
            video_bucket: "videos".to_string(),
            image_bucket: "images".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
        };

        assert_eq!(config.endpoint, Some("http://localhost:9000".to_string()));
    }

    #[test]
    fn test_bucket_binding() {
        let config = S3Config {
            video_bucket: "videos".to_string(),
            image_bucket: "images".to_string(),
            ..S3Config::default()
        };

        let videos = S3ObjectStorage::videos(&config);
        let images = S3ObjectStorage::images(&config);
        assert_eq!(videos.bucket, "videos");
        assert_eq!(images.bucket, "images");
    }
}
