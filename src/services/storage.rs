use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Abstracted blob storage for input photos and generated assets.
/// Writes are overwrite-safe; retrying the same key is harmless.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist bytes under `key` and return the stable public URL.
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Cloudflare R2 object storage (S3-compatible) fronted by a public bucket
/// domain for asset URLs.
pub struct R2Client {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl BlobStore for R2Client {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.bucket
            .put_object_with_content_type(key, bytes, content_type)
            .await?;
        Ok(self.public_url(key))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await?;
        Ok(response.to_vec())
    }
}
