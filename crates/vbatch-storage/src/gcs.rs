//! Google Cloud Storage staging bucket (JSON API).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Body, Client, StatusCode};
use tracing::{debug, info};

use crate::auth::AccessTokenSource;
use crate::error::{StorageError, StorageResult};
use crate::stager::{content_type_for, ObjectStager};

pub const DEFAULT_GCS_BUCKET: &str = "video-slice-bucket";
const DEFAULT_GCS_BASE_URL: &str = "https://storage.googleapis.com";

/// Configuration for the GCS staging bucket.
#[derive(Debug, Clone)]
pub struct GcsStagingConfig {
    pub bucket: String,
    /// API root, overridable for emulators
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GcsStagingConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_GCS_BUCKET.to_string(),
            base_url: DEFAULT_GCS_BASE_URL.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl GcsStagingConfig {
    pub fn from_env() -> Self {
        Self {
            bucket: std::env::var("STAGING_GCS_BUCKET").unwrap_or_else(|_| DEFAULT_GCS_BUCKET.to_string()),
            base_url: std::env::var("STAGING_GCS_BASE_URL").unwrap_or_else(|_| DEFAULT_GCS_BASE_URL.to_string()),
            timeout: Duration::from_secs(
                std::env::var("STAGING_GCS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Stages files in a GCS bucket and hands out `gs://` URIs.
pub struct GcsStager {
    http: Client,
    tokens: Arc<dyn AccessTokenSource>,
    config: GcsStagingConfig,
}

impl GcsStager {
    pub fn new(config: GcsStagingConfig, tokens: Arc<dyn AccessTokenSource>) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vbatch-storage/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, tokens, config })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.config.base_url,
            self.config.bucket,
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl ObjectStager for GcsStager {
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String> {
        debug!("Uploading {} to gs://{}/{}", path.display(), self.config.bucket, key);

        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.config.base_url,
            self.config.bucket,
            urlencoding::encode(key)
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(path))
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(Body::from(file))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        info!(size, "Uploaded {} to gs://{}/{}", path.display(), self.config.bucket, key);
        Ok(format!("gs://{}/{}", self.config.bucket, key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let token = self.tokens.access_token().await?;
        let response = self.http.delete(self.object_url(key)).bearer_auth(token).send().await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(key, "Staged object already gone");
                Ok(())
            }
            s => Err(StorageError::delete_failed(format!(
                "{}: {}",
                s,
                response.text().await.unwrap_or_default()
            ))),
        }
    }

    fn backend(&self) -> &'static str {
        "gcs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stager(server: &MockServer) -> GcsStager {
        let config = GcsStagingConfig {
            bucket: "test-bucket".into(),
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        };
        GcsStager::new(config, Arc::new(StaticToken("tok".into()))).unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_gs_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/test-bucket/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "video-analysis/a.mp4"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"0123456789").unwrap();

        let uri = stager(&server).upload(&file, "video-analysis/a.mp4").await.unwrap();
        assert_eq!(uri, "gs://test-bucket/video-analysis/a.mp4");
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/b/test-bucket/o/video-analysis%2Fa.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        stager(&server).delete("video-analysis/a.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"data").unwrap();

        let err = stager(&server).upload(&file, "k").await.unwrap_err();
        assert!(matches!(err, StorageError::Http { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
