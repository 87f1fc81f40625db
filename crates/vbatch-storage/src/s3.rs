//! S3-compatible staging bucket (AWS S3, Alibaba OSS, Cloudflare R2).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::stager::{content_type_for, ObjectStager};

/// Default lifetime of presigned download URLs.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Configuration for the S3-compatible staging bucket.
#[derive(Debug, Clone)]
pub struct S3StagingConfig {
    /// Custom endpoint (OSS, R2, MinIO); `None` for AWS
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
    /// Path-style addressing (R2, MinIO). OSS requires virtual-hosted style.
    pub force_path_style: bool,
    /// Lifetime of the URL handed to the remote service
    pub presign_ttl: Duration,
}

impl S3StagingConfig {
    /// Create config from `STAGING_S3_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("STAGING_S3_ENDPOINT_URL").ok(),
            access_key_id: std::env::var("STAGING_S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("STAGING_S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("STAGING_S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("STAGING_S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("STAGING_S3_BUCKET")
                .map_err(|_| StorageError::config_error("STAGING_S3_BUCKET not set"))?,
            region: std::env::var("STAGING_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            force_path_style: std::env::var("STAGING_S3_PATH_STYLE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            presign_ttl: Duration::from_secs(
                std::env::var("STAGING_S3_PRESIGN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PRESIGN_TTL.as_secs()),
            ),
        })
    }
}

/// Stages files in an S3-compatible bucket and hands out presigned GET URLs.
#[derive(Clone)]
pub struct S3Stager {
    client: Client,
    bucket: String,
    presign_ttl: Duration,
}

impl S3Stager {
    pub fn new(config: S3StagingConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vbatch-staging",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket_name,
            presign_ttl: config.presign_ttl,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3StagingConfig::from_env()?))
    }

    /// Generate a presigned GET URL for `key`.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config =
            PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

#[async_trait]
impl ObjectStager for S3Stager {
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String> {
        debug!("Uploading {} to s3://{}/{}", path.display(), self.bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(path))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to s3://{}/{}", path.display(), self.bucket, key);
        self.presign_get(key, self.presign_ttl).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting s3://{}/{}", self.bucket, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}
