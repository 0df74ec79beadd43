//! Artifact publishing to object storage.

mod s3;
mod sigv4;

pub use s3::S3ObjectStore;

use crate::encode::EncodedStem;
use crate::error::UploadError;
use crate::job::StorageTarget;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A stem reachable at a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    /// Stem name.
    pub stem: String,
    /// URL usable without further authentication.
    pub url: String,
}

/// Object storage collaborator.
pub trait ObjectStore: Send + Sync {
    /// Upload `local_path` to `bucket`/`key`, returning the consumer URL.
    fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> impl Future<Output = Result<String, UploadError>> + Send;
}

impl<S: ObjectStore> ObjectStore for Arc<S> {
    fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> impl Future<Output = Result<String, UploadError>> + Send {
        self.as_ref().upload(local_path, bucket, key, content_type)
    }
}

/// Object key for a stem: `{prefix}/{job_id}/{stem}.{ext}`.
///
/// An empty prefix drops the leading segment.
pub fn object_key(prefix: &str, job_id: &str, stem: &str, extension: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{job_id}/{stem}.{extension}")
    } else {
        format!("{prefix}/{job_id}/{stem}.{extension}")
    }
}

/// Uploads encoded stems and removes local copies once stored.
#[derive(Debug)]
pub struct ArtifactPublisher<S> {
    store: S,
}

impl<S: ObjectStore> ArtifactPublisher<S> {
    /// Publisher over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upload one stem under the job's key space.
    pub async fn publish(
        &self,
        stem: &EncodedStem,
        target: &StorageTarget,
        job_id: &str,
    ) -> Result<PublishedArtifact, UploadError> {
        let key = object_key(&target.prefix, job_id, &stem.stem, stem.extension);
        let url = self
            .store
            .upload(&stem.path, &target.bucket, &key, stem.content_type)
            .await?;
        info!("Published '{}' to s3://{}/{key}", stem.stem, target.bucket);

        if let Err(e) = tokio::fs::remove_file(&stem.path).await {
            warn!("Failed to remove {}: {e}", stem.path.display());
        }

        Ok(PublishedArtifact {
            stem: stem.stem.clone(),
            url,
        })
    }
}
