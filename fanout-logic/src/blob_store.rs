//! The `BlobStore` collaborator seam: `get`, `delete`, `head` against an
//! S3-compatible bucket. Unlike the fixed-bucket client this crate's
//! teacher used, each call here takes its own `(bucket, key)` pair, since
//! every pointer carries its own bucket coordinates.

use async_trait::async_trait;
use minio::s3;
use minio::s3::types::S3Api;
use serde::Deserialize;
use std::{collections::HashMap, sync::Mutex};
use thiserror::Error;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlobStoreSettings {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub create_bucket: Option<String>,
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found")]
    NotFound,
    #[error("blob store error: {0}")]
    Other(#[from] anyhow::Error),
}

impl BlobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches the object. `NotFound` must be distinguished from any other
    /// error: it is the only outcome that acks-without-emitting-an-ack at
    /// the consumer, everything else is a requeue.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Idempotent delete: deleting an already-missing key is success, not
    /// an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobError>;

    /// Used only by the reconciliation job to decide whether a retry is
    /// still needed.
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, BlobError>;
}

#[derive(Clone)]
pub struct S3BlobStore {
    client: s3::Client,
}

impl std::fmt::Debug for S3BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BlobStore").finish_non_exhaustive()
    }
}

impl S3BlobStore {
    pub async fn new(settings: BlobStoreSettings) -> anyhow::Result<Self> {
        use anyhow::Context;

        let credentials = s3::creds::StaticProvider::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
        );
        let client = s3::Client::new(
            settings
                .endpoint
                .parse()
                .context("parsing blob store endpoint into url failed")?,
            Some(Box::new(credentials)),
            None,
            None,
        )
        .context("blob store client initialization failed")?;

        if let Some(bucket) = &settings.create_bucket {
            match client.create_bucket(bucket).send().await {
                Ok(_) => {}
                Err(s3::error::Error::S3Error(error))
                    if error.code == s3::error::ErrorCode::BucketAlreadyOwnedByYou => {}
                Err(error) => return Err(error).context("bucket initialization failed"),
            }
        }

        Ok(Self { client })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        use anyhow::Context;

        let result = self.client.get_object(bucket, key).send().await;
        match result {
            Ok(response) => {
                let content = response
                    .content
                    .to_segmented_bytes()
                    .await
                    .context("download object content")?;
                Ok(content.to_bytes().to_vec())
            }
            Err(s3::error::Error::S3Error(error)) if is_missing(&error.code) => {
                Err(BlobError::NotFound)
            }
            Err(error) => Err(BlobError::Other(error.into())),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobError> {
        let result = self.client.remove_object(bucket, key).send().await;
        match result {
            Ok(_) => Ok(()),
            // Idempotent delete: a missing key is success, not an error.
            Err(s3::error::Error::S3Error(error)) if is_missing(&error.code) => Ok(()),
            Err(error) => Err(BlobError::Other(error.into())),
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        let result = self.client.stat_object(bucket, key).send().await;
        match result {
            Ok(_) => Ok(true),
            Err(s3::error::Error::S3Error(error)) if is_missing(&error.code) => Ok(false),
            Err(error) => Err(BlobError::Other(error.into())),
        }
    }
}

fn is_missing(code: &s3::error::ErrorCode) -> bool {
    matches!(
        code,
        s3::error::ErrorCode::NoSuchKey
            | s3::error::ErrorCode::NoSuchObject
            | s3::error::ErrorCode::NotFound
    )
}

/// In-memory fake used by `fanout-logic`'s own unit tests and by the
/// consumer protocol tests, so the ACK-handler/consumer state machines can
/// be exercised without a live MinIO.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, content: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), content);
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or(BlobError::NotFound)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobError> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }
}
