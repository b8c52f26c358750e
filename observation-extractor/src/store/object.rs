use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use aws_sdk_s3::operation::get_object::GetObjectError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;
use tokio::io::AsyncRead;

/// The body of a retrieved object, decoded one chunk at a time.
pub type ObjectStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store request failed: {0}")]
    OperationFailed(String),
}

/// Retrieval of a source file from one bucket, either in the clear or with a
/// per-file key supplied alongside the request.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<ObjectStream, StoreError>;

    async fn get_with_key(&self, key: &str, psk: &[u8]) -> Result<ObjectStream, StoreError>;
}

/// Real object store backed by one S3 bucket. Keyed retrieval hands the key
/// to S3 as an SSE-C customer key, so the body streams back decrypted.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn map_sdk_error(
        key: &str,
        error: aws_sdk_s3::error::SdkError<GetObjectError>,
    ) -> StoreError {
        let message = format!("failed to get object from S3: {error:?}");
        if matches!(error.into_service_error(), GetObjectError::NoSuchKey(_)) {
            StoreError::NotFound(key.to_string())
        } else {
            StoreError::OperationFailed(message)
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<ObjectStream, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(key, e))?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn get_with_key(&self, key: &str, psk: &[u8]) -> Result<ObjectStream, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .sse_customer_algorithm("AES256")
            .sse_customer_key(BASE64.encode(psk))
            .sse_customer_key_md5(BASE64.encode(md5::compute(psk).0))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(key, e))?;

        Ok(Box::pin(output.body.into_async_read()))
    }
}

/// In-memory object store for testing, always available.
#[derive(Default)]
pub struct MockObjectStore {
    objects: HashMap<String, Vec<u8>>,
    // When set, plain retrieval fails and keyed retrieval must present
    // exactly this key.
    required_key: Option<Vec<u8>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, key: &str, content: impl Into<Vec<u8>>) -> Self {
        self.objects.insert(key.to_string(), content.into());
        self
    }

    pub fn requiring_key(mut self, psk: impl Into<Vec<u8>>) -> Self {
        self.required_key = Some(psk.into());
        self
    }

    fn stream_for(&self, key: &str) -> Result<ObjectStream, StoreError> {
        match self.objects.get(key) {
            Some(content) => Ok(Box::pin(std::io::Cursor::new(content.clone()))),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn get(&self, key: &str) -> Result<ObjectStream, StoreError> {
        if self.required_key.is_some() {
            return Err(StoreError::OperationFailed(format!(
                "object {key} requires a key"
            )));
        }
        self.stream_for(key)
    }

    async fn get_with_key(&self, key: &str, psk: &[u8]) -> Result<ObjectStream, StoreError> {
        match &self.required_key {
            Some(required) if required == psk => self.stream_for(key),
            Some(_) => Err(StoreError::OperationFailed(format!(
                "wrong key presented for object {key}"
            ))),
            None => self.stream_for(key),
        }
    }
}
