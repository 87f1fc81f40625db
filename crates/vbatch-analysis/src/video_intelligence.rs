//! Google Video Intelligence adapter (shot change and label detection).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vbatch_models::{retry_async, Feature, LabelAnnotation, RetryPolicy, TimeRange};
use vbatch_storage::{with_staged_object, AccessTokenSource, ObjectStager};

use crate::client::{poll_until, transient_retry_policy, AnalysisClient, AnalysisOutput, PollConfig, PollStatus};
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{parse_duration_offset, AnnotateRequest, AnnotateResponse, Operation};

const DEFAULT_BASE_URL: &str = "https://videointelligence.googleapis.com";

/// Inputs above this size are staged to GCS instead of sent inline.
pub const DEFAULT_INLINE_LIMIT_BYTES: u64 = 50 * 1024 * 1024;

/// gRPC status code for UNAVAILABLE.
const CODE_UNAVAILABLE: i32 = 14;

/// Configuration for the Video Intelligence client.
#[derive(Debug, Clone)]
pub struct VideoIntelligenceConfig {
    /// API root, overridable for tests
    pub base_url: String,
    pub poll: PollConfig,
    pub inline_limit_bytes: u64,
    /// Always stage, even small inputs
    pub force_staging: bool,
    /// Timeout for a single HTTP request
    pub request_timeout: Duration,
}

impl Default for VideoIntelligenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll: PollConfig::default(),
            inline_limit_bytes: DEFAULT_INLINE_LIMIT_BYTES,
            force_staging: false,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl VideoIntelligenceConfig {
    /// Create config from `VIDEO_INTELLIGENCE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            base_url: std::env::var("VIDEO_INTELLIGENCE_BASE_URL").unwrap_or(defaults.base_url),
            poll: PollConfig {
                interval: secs("VIDEO_INTELLIGENCE_POLL_INTERVAL_SECS", defaults.poll.interval),
                timeout: secs("VIDEO_INTELLIGENCE_TIMEOUT_SECS", defaults.poll.timeout),
            },
            inline_limit_bytes: std::env::var("VIDEO_INTELLIGENCE_INLINE_LIMIT_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.inline_limit_bytes),
            force_staging: std::env::var("VIDEO_INTELLIGENCE_FORCE_STAGING")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            request_timeout: secs("VIDEO_INTELLIGENCE_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        }
    }
}

/// Client for `videos:annotate` with long-running operation polling.
pub struct VideoIntelligenceClient {
    http: Client,
    tokens: Arc<dyn AccessTokenSource>,
    stager: Option<Arc<dyn ObjectStager>>,
    config: VideoIntelligenceConfig,
    retry: RetryPolicy<AnalysisError>,
}

impl VideoIntelligenceClient {
    pub fn new(
        config: VideoIntelligenceConfig,
        tokens: Arc<dyn AccessTokenSource>,
        stager: Option<Arc<dyn ObjectStager>>,
    ) -> AnalysisResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("vbatch-analysis/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            tokens,
            stager,
            config,
            retry: transient_retry_policy("video_intelligence"),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy<AnalysisError>) -> Self {
        self.retry = retry;
        self
    }

    async fn token(&self) -> AnalysisResult<String> {
        self.tokens
            .access_token()
            .await
            .map_err(|e| AnalysisError::Auth(e.to_string()))
    }

    /// Submit once (retrying transient submit errors), then poll the single
    /// resulting operation under one deadline.
    async fn annotate(&self, request: &AnnotateRequest) -> AnalysisResult<AnnotateResponse> {
        let operation = retry_async(&self.retry, |attempt| async move {
            debug!(attempt, features = ?request.features, "Submitting annotate request");
            self.submit(request).await
        })
        .await
        .into_result()?;
        info!(operation = %operation.name, "Video annotation started");

        if operation.done {
            return finished(operation);
        }

        let name = operation.name;
        let operation = poll_until(self.config.poll, &name, || self.check_operation(&name)).await?;
        finished(operation)
    }

    async fn submit(&self, request: &AnnotateRequest) -> AnalysisResult<Operation> {
        let url = format!("{}/v1/videos:annotate", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token().await?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::from_response(response).await);
        }

        Ok(response.json().await?)
    }

    /// A finished operation is handed back as-is; its error, if any, is
    /// terminal and must not be mistaken for a transient poll failure.
    async fn check_operation(&self, name: &str) -> AnalysisResult<PollStatus<Operation>> {
        let url = format!("{}/v1/{}", self.config.base_url, name);
        let response = self.http.get(&url).bearer_auth(self.token().await?).send().await?;

        if !response.status().is_success() {
            return Err(AnalysisError::from_response(response).await);
        }

        let operation: Operation = response.json().await?;
        if operation.done {
            Ok(PollStatus::Done(operation))
        } else {
            Ok(PollStatus::Pending)
        }
    }
}

#[async_trait]
impl AnalysisClient for VideoIntelligenceClient {
    async fn analyze(&self, path: &Path, features: &[Feature]) -> AnalysisResult<AnalysisOutput> {
        let features = api_features(features)?;
        let size = tokio::fs::metadata(path).await?.len();

        let response = if self.config.force_staging || size > self.config.inline_limit_bytes {
            let stager = self.stager.clone().ok_or_else(|| {
                AnalysisError::config(format!(
                    "{} is {} bytes, above the inline limit, and no staging bucket is configured",
                    path.display(),
                    size
                ))
            })?;

            info!(size, backend = stager.backend(), "Staging input for video annotation");
            with_staged_object(stager, path, staging_key(path), |uri| async move {
                let request = AnnotateRequest {
                    input_uri: Some(uri),
                    input_content: None,
                    features,
                };
                self.annotate(&request).await
            })
            .await?
        } else {
            debug!(size, "Sending input inline");
            let bytes = tokio::fs::read(path).await?;
            let request = AnnotateRequest {
                input_uri: None,
                input_content: Some(STANDARD.encode(bytes)),
                features,
            };
            self.annotate(&request).await?
        };

        let output = parse_annotations(response);
        if let AnalysisOutput::Shots { ranges, labels } = &output {
            info!(shots = ranges.len(), labels = labels.len(), "Video annotation complete");
        }
        Ok(output)
    }

    fn service(&self) -> &'static str {
        "video_intelligence"
    }
}

fn finished(operation: Operation) -> AnalysisResult<AnnotateResponse> {
    match operation.error {
        Some(e) if e.code == CODE_UNAVAILABLE => Err(AnalysisError::ServiceUnavailable(e.message)),
        Some(e) => Err(AnalysisError::operation_failed(format!("{} (code {})", e.message, e.code))),
        None => Ok(operation.response.unwrap_or_default()),
    }
}

/// Map requested features to API feature names.
fn api_features(features: &[Feature]) -> AnalysisResult<Vec<String>> {
    if features.is_empty() {
        return Ok(vec!["SHOT_CHANGE_DETECTION".to_string()]);
    }

    features
        .iter()
        .map(|f| match f {
            Feature::ShotDetection => Ok("SHOT_CHANGE_DETECTION".to_string()),
            Feature::LabelDetection => Ok("LABEL_DETECTION".to_string()),
            Feature::FaceDetection => Ok("FACE_DETECTION".to_string()),
            Feature::TextDetection => Ok("TEXT_DETECTION".to_string()),
            Feature::Transcription => Err(AnalysisError::Unsupported(
                "transcription is not available from video intelligence".to_string(),
            )),
        })
        .collect()
}

fn staging_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let short_id = Uuid::new_v4().simple().to_string();
    format!(
        "video-analysis/slice_analysis_{}_{}_{}",
        Utc::now().timestamp(),
        &short_id[..8],
        name
    )
}

/// Shots become ranges labelled `shot N`; labels keep their best confidence.
fn parse_annotations(response: AnnotateResponse) -> AnalysisOutput {
    let mut ranges = Vec::new();
    let mut labels: Vec<LabelAnnotation> = Vec::new();

    for result in response.annotation_results {
        for shot in result.shot_annotations {
            let number = ranges.len() as u32 + 1;
            let start = parse_duration_offset(shot.start_time_offset.as_deref());
            let end = parse_duration_offset(shot.end_time_offset.as_deref());

            match (start, end) {
                (Some(start), Some(end)) => {
                    match TimeRange::new(number, start, end, format!("shot {}", number), 1.0) {
                        Ok(range) => ranges.push(range),
                        Err(e) => warn!(shot = number, "Skipping shot: {}", e),
                    }
                }
                _ => warn!(shot = number, "Skipping shot with unparsable offsets"),
            }
        }

        for label in result.segment_label_annotations {
            if label.entity.description.is_empty() {
                continue;
            }
            let confidence = label
                .segments
                .iter()
                .map(|s| s.confidence)
                .fold(0.0_f64, f64::max);
            labels.push(LabelAnnotation {
                description: label.entity.description,
                confidence,
            });
        }
    }

    AnalysisOutput::Shots { ranges, labels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vbatch_models::Backoff;
    use vbatch_storage::{StaticToken, StorageResult};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingStager {
        uploads: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStager for RecordingStager {
        async fn upload(&self, _path: &Path, key: &str) -> StorageResult<String> {
            self.uploads.lock().unwrap().push(key.to_string());
            Ok(format!("gs://bucket/{}", key))
        }

        async fn delete(&self, key: &str) -> StorageResult<()> {
            self.deletes.lock().unwrap().push(key.to_string());
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "recording"
        }
    }

    fn config(server: &MockServer) -> VideoIntelligenceConfig {
        VideoIntelligenceConfig {
            base_url: server.uri(),
            poll: PollConfig {
                interval: Duration::from_millis(10),
                timeout: Duration::from_secs(5),
            },
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn client(config: VideoIntelligenceConfig, stager: Option<Arc<dyn ObjectStager>>) -> VideoIntelligenceClient {
        let policy = RetryPolicy::new("test", 3, Backoff::Fixed(Duration::ZERO), AnalysisError::is_transient);
        VideoIntelligenceClient::new(config, Arc::new(StaticToken("tok".into())), stager)
            .unwrap()
            .with_retry_policy(policy)
    }

    fn input_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, vec![0u8; 64]).unwrap();
        file
    }

    fn done_operation() -> serde_json::Value {
        serde_json::json!({
            "name": "projects/p/locations/l/operations/1",
            "done": true,
            "response": {
                "annotationResults": [{
                    "shotAnnotations": [
                        {"endTimeOffset": "4.5s"},
                        {"startTimeOffset": "4.5s", "endTimeOffset": "9s"},
                        {"startTimeOffset": "9s", "endTimeOffset": "9s"}
                    ],
                    "segmentLabelAnnotations": [{
                        "entity": {"description": "beach"},
                        "segments": [{"confidence": 0.4}, {"confidence": 0.85}]
                    }]
                }]
            }
        })
    }

    #[test]
    fn test_api_features() {
        assert_eq!(api_features(&[]).unwrap(), vec!["SHOT_CHANGE_DETECTION"]);
        assert_eq!(
            api_features(&[Feature::ShotDetection, Feature::LabelDetection]).unwrap(),
            vec!["SHOT_CHANGE_DETECTION", "LABEL_DETECTION"]
        );
        assert!(matches!(
            api_features(&[Feature::Transcription]),
            Err(AnalysisError::Unsupported(_))
        ));
    }

    #[test]
    fn test_staging_key_shape() {
        let key = staging_key(Path::new("/data/my clip.mp4"));
        assert!(key.starts_with("video-analysis/slice_analysis_"));
        assert!(key.ends_with("_my clip.mp4"));
    }

    #[tokio::test]
    async fn test_inline_annotate_and_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos:annotate"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({"features": ["SHOT_CHANGE_DETECTION"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/p/locations/l/operations/1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/p/locations/l/operations/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(done_operation()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = client(config(&server), None)
            .analyze(&input_file(&dir), &[Feature::ShotDetection])
            .await
            .unwrap();

        let AnalysisOutput::Shots { ranges, labels } = output else {
            panic!("expected shots");
        };
        // The zero-length third shot is dropped.
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start, 0.0);
        assert_eq!(ranges[0].end, 4.5);
        assert_eq!(ranges[1].label, "shot 2");
        assert_eq!(ranges[1].confidence, 1.0);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].confidence, 0.85);
    }

    #[tokio::test]
    async fn test_retries_transient_submit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("temporarily unavailable"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(done_operation()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = client(config(&server), None)
            .analyze(&input_file(&dir), &[])
            .await
            .unwrap();
        assert_eq!(output.segment_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_poll_error_does_not_resubmit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos:annotate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/p/locations/l/operations/1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("temporarily unavailable"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(done_operation()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = client(config(&server), None)
            .analyze(&input_file(&dir), &[])
            .await
            .unwrap();
        assert_eq!(output.segment_count(), 2);

        let requests = server.received_requests().await.unwrap();
        let posts = requests.iter().filter(|r| r.method.to_string() == "POST").count();
        let gets = requests.iter().filter(|r| r.method.to_string() == "GET").count();
        assert_eq!(posts, 1);
        assert_eq!(gets, 2);
    }

    #[tokio::test]
    async fn test_failed_operation_during_poll_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "operations/4"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/operations/4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/4",
                "done": true,
                "error": {"code": 14, "message": "backend unavailable"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(config(&server), None)
            .analyze(&input_file(&dir), &[])
            .await
            .unwrap_err();
        // Left to the item-level retry rather than resubmitted here.
        assert!(matches!(err, AnalysisError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_non_transient_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(config(&server), None)
            .analyze(&input_file(&dir), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::RequestFailed { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_operation_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/9",
                "done": true,
                "error": {"code": 3, "message": "Invalid video"}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(config(&server), None)
            .analyze(&input_file(&dir), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::OperationFailed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_large_input_is_staged_and_released() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"features": ["SHOT_CHANGE_DETECTION"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(done_operation()))
            .mount(&server)
            .await;

        let stager = Arc::new(RecordingStager::default());
        let mut config = config(&server);
        config.inline_limit_bytes = 16;

        let dir = tempfile::tempdir().unwrap();
        client(config, Some(stager.clone() as Arc<dyn ObjectStager>))
            .analyze(&input_file(&dir), &[])
            .await
            .unwrap();

        let uploads = stager.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(*stager.deletes.lock().unwrap(), uploads);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["inputUri"], format!("gs://bucket/{}", uploads[0]));
        assert!(body.get("inputContent").is_none());
    }

    #[tokio::test]
    async fn test_staged_object_released_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let stager = Arc::new(RecordingStager::default());
        let mut config = config(&server);
        config.force_staging = true;

        let dir = tempfile::tempdir().unwrap();
        let result = client(config, Some(stager.clone() as Arc<dyn ObjectStager>)).analyze(&input_file(&dir), &[]).await;

        assert!(result.is_err());
        assert_eq!(stager.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_staging_required_without_stager() {
        let server = MockServer::start().await;
        let mut config = config(&server);
        config.force_staging = true;

        let dir = tempfile::tempdir().unwrap();
        let err = client(config, None).analyze(&input_file(&dir), &[]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }
}
