//! src/services/storage_service.rs
//!
//! StorageService — the single gateway between HTTP handlers and the object
//! store. The store connection is opened lazily on first use: the endpoint is
//! parsed, a client is built, the bucket is created if missing and made
//! publicly readable. A failed attempt is not remembered, so the next call
//! runs the whole sequence again; a successful one is reused for the life of
//! the process.

use crate::{
    config::StoreConfig,
    models::{
        bucket::{BucketUsage, public_read_policy},
        object::ObjectBody,
    },
    services::{
        object_client::{ClientFactory, ObjectClient},
        s3_client::S3ClientFactory,
    },
};
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("bucket unavailable: {0}")]
    BucketUnavailable(String),
    #[error("{op}: {message}")]
    Backend { op: &'static str, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Facade over the backing object store.
///
/// Cloning is cheap; all clones share one lazily opened connection.
#[derive(Clone)]
pub struct StorageService {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    factory: Box<dyn ClientFactory>,
    connection: OnceCell<Connection>,
}

/// An opened client plus the base URL public object links are built from.
struct Connection {
    client: Arc<dyn ObjectClient>,
    base_url: Url,
}

impl StorageService {
    /// Create a StorageService that talks S3 to the configured endpoint.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_factory(config, S3ClientFactory)
    }

    pub fn with_factory(config: StoreConfig, factory: impl ClientFactory + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                factory: Box::new(factory),
                connection: OnceCell::new(),
            }),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.inner.config.bucket
    }

    /// Return the shared connection, opening it if this is the first use.
    ///
    /// Concurrent first callers wait on the same attempt, so the bucket is
    /// provisioned at most once per successful initialization.
    async fn connection(&self) -> StorageResult<&Connection> {
        self.inner
            .connection
            .get_or_try_init(|| self.connect())
            .await
    }

    async fn connect(&self) -> StorageResult<Connection> {
        let config = &self.inner.config;
        let base_url = parse_endpoint(&config.endpoint)?;
        let client = self.inner.factory.connect(&base_url, config)?;

        if client.bucket_exists(&config.bucket).await? {
            debug!("bucket {} already exists", config.bucket);
        } else {
            info!(
                "creating bucket {} (region: {:?})",
                config.bucket, config.region
            );
            client.create_bucket(&config.bucket, &config.region).await?;
        }

        client
            .set_bucket_policy(&config.bucket, &public_read_policy(&config.bucket))
            .await?;

        info!("object store ready at {} bucket={}", base_url, config.bucket);
        Ok(Connection { client, base_url })
    }

    /// Stream `body` into the bucket under `name` and return its public URL.
    ///
    /// No retry is attempted; the caller decides what to surface.
    pub async fn put(
        &self,
        name: &str,
        content_type: Option<&str>,
        body: ObjectBody,
    ) -> StorageResult<Url> {
        let conn = self.connection().await?;
        conn.client
            .put_object(self.bucket(), name, content_type, body)
            .await?;
        Ok(object_url(&conn.base_url, self.bucket(), name))
    }

    /// Verify the configured bucket currently exists.
    pub async fn health_check(&self) -> StorageResult<()> {
        let conn = self.connection().await?;
        if conn.client.bucket_exists(self.bucket()).await? {
            Ok(())
        } else {
            Err(StorageError::BucketUnavailable(self.bucket().to_string()))
        }
    }

    /// Count every object in the bucket and sum their sizes.
    ///
    /// Walks the full listing page by page on each call, so cost grows
    /// linearly with the number of stored objects.
    pub async fn aggregate_metrics(&self) -> StorageResult<BucketUsage> {
        let conn = self.connection().await?;
        let mut usage = BucketUsage::default();
        let mut token = None;
        loop {
            let page = conn.client.list_objects(self.bucket(), token).await?;
            usage.add_page(&page.sizes);
            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(usage)
    }
}

/// Parse the configured endpoint into the scheme+host base used for links.
fn parse_endpoint(endpoint: &str) -> StorageResult<Url> {
    let invalid = |reason: &str| StorageError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Public URL of `key` in `bucket`: the endpoint origin with path `/bucket/key`.
pub fn object_url(base: &Url, bucket: &str, key: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("{}/{}", bucket.trim_matches('/'), key));
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_client::{MemoryFactory, body_from};
    use std::sync::atomic::Ordering;

    fn config() -> StoreConfig {
        StoreConfig {
            endpoint: "https://store.example".into(),
            region: "eu-west-1".into(),
            bucket: "mybucket".into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
        }
    }

    fn service() -> (StorageService, MemoryFactory) {
        let factory = MemoryFactory::new();
        (
            StorageService::with_factory(config(), factory.clone()),
            factory,
        )
    }

    #[test]
    fn object_url_joins_origin_bucket_and_key() {
        let base = parse_endpoint("https://store.example/some/prefix?x=1#frag").unwrap();
        let url = object_url(&base, "mybucket", "abc-123");
        assert_eq!(url.as_str(), "https://store.example/mybucket/abc-123");

        let base = parse_endpoint("http://localhost:9000").unwrap();
        let url = object_url(&base, "/b/", "k");
        assert_eq!(url.as_str(), "http://localhost:9000/b/k");
    }

    #[test]
    fn endpoint_must_be_http_with_host() {
        assert!(matches!(
            parse_endpoint("ftp://store.example"),
            Err(StorageError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            parse_endpoint("store.example"),
            Err(StorageError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn first_use_creates_bucket_and_sets_public_policy() {
        let (service, factory) = service();
        service.health_check().await.unwrap();

        let client = factory.client();
        assert_eq!(client.bucket_region("mybucket").as_deref(), Some("eu-west-1"));
        assert_eq!(
            client.bucket_policy("mybucket"),
            Some(public_read_policy("mybucket"))
        );
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_bucket_is_not_recreated() {
        let (service, factory) = service();
        factory.client().insert_bucket("mybucket", "us-east-1");

        service.health_check().await.unwrap();
        let client = factory.client();
        assert_eq!(client.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.bucket_region("mybucket").as_deref(), Some("us-east-1"));
        assert!(client.bucket_policy("mybucket").is_some());
    }

    #[tokio::test]
    async fn put_stores_bytes_and_returns_url() {
        let (service, factory) = service();
        let url = service
            .put("obj-1", Some("text/plain"), body_from(&["hel", "lo"]))
            .await
            .unwrap();

        assert_eq!(url.as_str(), "https://store.example/mybucket/obj-1");
        let stored = factory.client().object("mybucket", "obj-1").unwrap();
        assert_eq!(stored.data, "hello");
        assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn failed_initialization_is_retried_on_next_call() {
        let (service, factory) = service();
        factory.fail_next_connects(1);

        let err = service.health_check().await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { op: "connect", .. }));

        service.health_check().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);

        service.health_check().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_first_calls_initialize_once() {
        let (service, factory) = service();
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .put(&format!("obj-{}", i), None, body_from(&["x"]))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let client = factory.client();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
        assert_eq!(client.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.object_count("mybucket"), 16);
    }

    #[tokio::test]
    async fn health_check_reports_missing_bucket() {
        let (service, factory) = service();
        service.health_check().await.unwrap();

        factory.client().remove_bucket("mybucket");
        let err = service.health_check().await.unwrap_err();
        assert_eq!(err.to_string(), "bucket unavailable: mybucket");
    }

    #[tokio::test]
    async fn aggregate_walks_every_page() {
        let (service, factory) = service();
        factory.client().set_page_size(2);
        for (i, body) in ["a", "bb", "ccc", "dddd", "eeeee"].iter().enumerate() {
            service
                .put(&format!("k{}", i), None, body_from(&[*body]))
                .await
                .unwrap();
        }

        let usage = service.aggregate_metrics().await.unwrap();
        assert_eq!(usage, BucketUsage { objects: 5, bytes: 15 });
    }

    #[tokio::test]
    async fn put_failure_is_returned() {
        let (service, factory) = service();
        factory.client().fail_puts.store(true, Ordering::SeqCst);

        let err = service.put("k", None, body_from(&["x"])).await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { op: "put_object", .. }));
        assert_eq!(factory.client().object_count("mybucket"), 0);
    }
}
