//! Object store access

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::config::ProbeConfig;
use crate::error::ProbeError;

/// An entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
}

/// Metadata of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
}

/// The calls the probe makes against the bucket
#[automock]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProbeError>;
    /// Every object in the bucket, recursively
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ProbeError>;
    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, ProbeError>;
}

/// S3-compatible store (MinIO, localstack, AWS)
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &ProbeConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "scribe-storage-probe",
        );
        // MinIO serves buckets by path, not by virtual host
        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self { client: Client::from_conf(s3_config) }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProbeError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(ProbeError::HeadBucket {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(err).to_string(),
            }),
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ProbeError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|err| ProbeError::ListObjects {
                    bucket: bucket.to_string(),
                    message: DisplayErrorContext(err).to_string(),
                })?;

            objects.extend(response.contents().iter().filter_map(|object| {
                object.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        log::debug!("Listed {} object(s) in {}", objects.len(), bucket);
        Ok(objects)
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, ProbeError> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ProbeError::StatObject {
                key: key.to_string(),
                message: DisplayErrorContext(err).to_string(),
            })?;

        Ok(ObjectStat {
            size: response.content_length().unwrap_or_default(),
            last_modified: response
                .last_modified()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
            content_type: response.content_type().map(str::to_string),
        })
    }
}
