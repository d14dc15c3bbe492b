use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("S3 error: {0}")]
    S3(String),
}

/// Where composited covers are written so Path U ends with a reference like Path S.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put_cover(&self, session_id: &str, png: Vec<u8>) -> Result<String, StoreError>;
}

/// S3 / MinIO backed store. References are `<endpoint>/<bucket>/<key>`.
#[derive(Clone)]
pub struct S3ImageStore {
    client: S3Client,
    bucket: String,
    endpoint: String,
}

impl S3ImageStore {
    pub fn new(client: S3Client, bucket: String, endpoint: String) -> Self {
        Self {
            client,
            bucket,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

pub fn cover_key(session_id: &str) -> String {
    format!("covers/{session_id}/{}.png", Uuid::new_v4())
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put_cover(&self, session_id: &str, png: Vec<u8>) -> Result<String, StoreError> {
        let key = cover_key(session_id);
        let size = png.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("image/png")
            .body(ByteStream::from(png))
            .send()
            .await
            .map_err(|e| StoreError::S3(e.to_string()))?;

        info!(session = session_id, bytes = size, "Stored composited cover {key}");
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, key))
    }
}
