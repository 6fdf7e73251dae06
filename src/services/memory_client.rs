//! In-memory `ObjectClient` used by the test suite.

use crate::{
    config::StoreConfig,
    models::object::{ObjectBody, ObjectListing},
    services::{
        object_client::{ClientFactory, ObjectClient},
        storage_service::{StorageError, StorageResult},
    },
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use url::Url;

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Default)]
struct MemoryBucket {
    region: String,
    policy: Option<String>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Default)]
pub struct MemoryClient {
    buckets: Mutex<HashMap<String, MemoryBucket>>,
    /// Objects per listing page, 0 for unlimited.
    page_size: AtomicUsize,
    pub fail_puts: AtomicBool,
    pub fail_lists: AtomicBool,
    pub create_calls: AtomicUsize,
}

impl MemoryClient {
    pub fn insert_bucket(&self, bucket: &str, region: &str) {
        self.buckets.lock().unwrap().insert(
            bucket.to_string(),
            MemoryBucket {
                region: region.to_string(),
                ..MemoryBucket::default()
            },
        );
    }

    pub fn remove_bucket(&self, bucket: &str) {
        self.buckets.lock().unwrap().remove(bucket);
    }

    pub fn set_page_size(&self, size: usize) {
        self.page_size.store(size, Ordering::SeqCst);
    }

    pub fn bucket_region(&self, bucket: &str) -> Option<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|b| b.region.clone())
    }

    pub fn bucket_policy(&self, bucket: &str) -> Option<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.policy.clone())
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.objects.get(key).cloned())
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map_or(0, |b| b.objects.len())
    }
}

fn no_such_bucket(op: &'static str, bucket: &str) -> StorageError {
    StorageError::Backend {
        op,
        message: format!("NoSuchBucket: {}", bucket),
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.buckets.lock().unwrap().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> StorageResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_insert_with(|| MemoryBucket {
                region: region.to_string(),
                ..MemoryBucket::default()
            });
        Ok(())
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("put_bucket_policy", bucket))?;
        entry.policy = Some(policy.to_string());
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        mut body: ObjectBody,
    ) -> StorageResult<()> {
        let mut data = BytesMut::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                op: "put_object",
                message: "simulated store failure".into(),
            });
        }

        let mut buckets = self.buckets.lock().unwrap();
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("put_object", bucket))?;
        entry.objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.map(str::to_string),
                data: data.freeze(),
            },
        );
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ObjectListing> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                op: "list_objects_v2",
                message: "simulated listing failure".into(),
            });
        }

        let buckets = self.buckets.lock().unwrap();
        let entry = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("list_objects_v2", bucket))?;
        let page_size = match self.page_size.load(Ordering::SeqCst) {
            0 => usize::MAX,
            n => n,
        };

        let mut remaining = entry
            .objects
            .iter()
            .filter(|(key, _)| continuation_token.as_ref().is_none_or(|t| *key > t))
            .peekable();
        let mut sizes = Vec::new();
        let mut last_key = None;
        while sizes.len() < page_size {
            match remaining.next() {
                Some((key, obj)) => {
                    sizes.push(obj.data.len() as u64);
                    last_key = Some(key.clone());
                }
                None => break,
            }
        }
        let next_continuation_token = remaining.peek().and(last_key);

        Ok(ObjectListing {
            sizes,
            next_continuation_token,
        })
    }
}

/// Hands out one shared [`MemoryClient`] and counts connection attempts.
#[derive(Clone, Default)]
pub struct MemoryFactory {
    client: Arc<MemoryClient>,
    pub connects: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> Arc<MemoryClient> {
        Arc::clone(&self.client)
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

impl ClientFactory for MemoryFactory {
    fn connect(
        &self,
        _endpoint: &Url,
        _config: &StoreConfig,
    ) -> StorageResult<Arc<dyn ObjectClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Backend {
                op: "connect",
                message: "simulated connection failure".into(),
            });
        }
        let client: Arc<dyn ObjectClient> = self.client.clone();
        Ok(client)
    }
}

/// Build an upload body from string chunks.
pub fn body_from(chunks: &[&'static str]) -> ObjectBody {
    let chunks: Vec<io::Result<Bytes>> = chunks
        .iter()
        .map(|c| Ok(Bytes::from_static(c.as_bytes())))
        .collect();
    stream::iter(chunks).boxed()
}
