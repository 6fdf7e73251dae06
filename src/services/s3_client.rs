//! `ObjectClient` speaking the S3 API through `aws-sdk-s3`.
//!
//! Uploads are forwarded in parts of at most [`PART_SIZE`] bytes: a body that
//! fits in one part goes out as a single `PutObject`, anything larger becomes a
//! multipart upload. Memory use per request is bounded by the part size.

use crate::{
    config::StoreConfig,
    models::object::{ObjectBody, ObjectListing},
    services::{
        object_client::{ClientFactory, ObjectClient},
        storage_service::{StorageError, StorageResult},
    },
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{
        BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region, retry::RetryConfig,
    },
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration,
    },
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::{io, sync::Arc};
use tracing::{debug, warn};
use url::Url;

/// Size of each forwarded part. S3 requires at least 5 MiB for all but the last.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Region used for request signing when none is configured.
const DEFAULT_SIGNING_REGION: &str = "us-east-1";

/// Builds [`S3Client`]s from the store configuration.
pub struct S3ClientFactory;

impl ClientFactory for S3ClientFactory {
    fn connect(
        &self,
        endpoint: &Url,
        config: &StoreConfig,
    ) -> StorageResult<Arc<dyn ObjectClient>> {
        Ok(Arc::new(S3Client::new(
            Client::from_conf(s3_config(endpoint, config).build()),
            PART_SIZE,
        )))
    }
}

/// SDK configuration for `endpoint` with static credentials.
fn s3_config(endpoint: &Url, config: &StoreConfig) -> S3ConfigBuilder {
    let credentials = Credentials::new(
        &config.access_key,
        &config.secret_key,
        None,
        None,
        "upload-gateway",
    );
    let region = if config.region.is_empty() {
        DEFAULT_SIGNING_REGION.to_string()
    } else {
        config.region.clone()
    };

    // The scheme of the origin decides whether TLS is used. Failures are
    // reported to the caller as-is, without SDK retries.
    S3ConfigBuilder::new()
        .behavior_version(BehaviorVersion::latest())
        .retry_config(RetryConfig::disabled())
        .region(Region::new(region))
        .credentials_provider(credentials)
        .endpoint_url(endpoint.origin().ascii_serialization())
        .force_path_style(true)
}

pub struct S3Client {
    client: Client,
    part_size: usize,
}

fn sdk_error(op: &'static str, err: impl std::error::Error) -> StorageError {
    StorageError::Backend {
        op,
        message: DisplayErrorContext(err).to_string(),
    }
}

impl S3Client {
    pub fn new(client: Client, part_size: usize) -> Self {
        Self { client, part_size }
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> StorageResult<()> {
        debug!("put_object: bucket={} key={} size={}", bucket, key, data.len());
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_error("put_object", e))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        first: Bytes,
        second: Bytes,
        rest: PartReader,
    ) -> StorageResult<()> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("create_multipart_upload", e))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StorageError::Backend {
                op: "create_multipart_upload",
                message: "response carried no upload id".into(),
            })?
            .to_string();
        debug!("multipart upload started: key={} upload_id={}", key, upload_id);

        match self
            .upload_parts(bucket, key, &upload_id, first, second, rest)
            .await
        {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| sdk_error("complete_multipart_upload", e))?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "could not abort multipart upload {}: {}",
                        upload_id,
                        DisplayErrorContext(abort_err)
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first: Bytes,
        second: Bytes,
        mut rest: PartReader,
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut completed = vec![
            self.upload_part(bucket, key, upload_id, 1, first).await?,
            self.upload_part(bucket, key, upload_id, 2, second).await?,
        ];
        while let Some(data) = rest.next_part().await? {
            let number = completed.len() as i32 + 1;
            completed.push(self.upload_part(bucket, key, upload_id, number, data).await?);
        }
        Ok(completed)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        number: i32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_error("upload_part", e))?;
        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(number)
            .build())
    }
}

#[async_trait]
impl ObjectClient for S3Client {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err.as_service_error().is_some_and(|e| e.is_not_found())
                    || err.raw_response().map(|r| r.status().as_u16()) == Some(404);
                if not_found {
                    Ok(false)
                } else {
                    Err(sdk_error("head_bucket", err))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> StorageResult<()> {
        // us-east-1 is the implicit default and must not be sent as a constraint.
        let configuration = (!region.is_empty() && region != DEFAULT_SIGNING_REGION).then(|| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build()
        });

        match self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(configuration)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(err) => Err(sdk_error("create_bucket", err)),
        }
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| sdk_error("put_bucket_policy", e))?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: ObjectBody,
    ) -> StorageResult<()> {
        let mut parts = PartReader::new(body, self.part_size);
        let first = parts.next_part().await?.unwrap_or_default();
        let second = if first.len() < self.part_size {
            None
        } else {
            parts.next_part().await?
        };

        match second {
            None => self.put_single(bucket, key, content_type, first).await,
            Some(second) => {
                self.put_multipart(bucket, key, content_type, first, second, parts)
                    .await
            }
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ObjectListing> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| sdk_error("list_objects_v2", e))?;

        let sizes = output
            .contents()
            .iter()
            .map(|obj| obj.size().unwrap_or(0).max(0) as u64)
            .collect();
        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectListing {
            sizes,
            next_continuation_token,
        })
    }
}

/// Regroups an arbitrarily chunked body into parts of `part_size` bytes.
///
/// Every part except the last is exactly `part_size` long.
pub struct PartReader {
    body: ObjectBody,
    buffer: BytesMut,
    part_size: usize,
    finished: bool,
}

impl PartReader {
    pub fn new(body: ObjectBody, part_size: usize) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            part_size,
            finished: false,
        }
    }

    pub async fn next_part(&mut self) -> io::Result<Option<Bytes>> {
        while !self.finished && self.buffer.len() < self.part_size {
            match self.body.next().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk?),
                None => self.finished = true,
            }
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let len = self.buffer.len().min(self.part_size);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }
}
