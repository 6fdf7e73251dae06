//! The narrow slice of object-store calls `StorageService` relies on.
//!
//! Production uses [`S3ClientFactory`](super::s3_client::S3ClientFactory);
//! tests plug in an in-memory store.

use crate::{
    config::StoreConfig,
    models::object::{ObjectBody, ObjectListing},
    services::storage_service::StorageResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// `Ok(false)` when the store answers that the bucket does not exist.
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    /// Create `bucket`; an empty region leaves the choice to the store.
    async fn create_bucket(&self, bucket: &str, region: &str) -> StorageResult<()>;

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: ObjectBody,
    ) -> StorageResult<()>;

    /// Fetch one page of the bucket listing, starting after `continuation_token`.
    async fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ObjectListing>;
}

/// Opens an [`ObjectClient`] for a parsed endpoint.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, endpoint: &Url, config: &StoreConfig)
    -> StorageResult<Arc<dyn ObjectClient>>;
}
