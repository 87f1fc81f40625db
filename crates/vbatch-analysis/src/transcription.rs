//! DashScope file transcription adapter.
//!
//! The audio file is staged to an S3-compatible bucket and handed to the
//! service as a presigned URL. The task is submitted asynchronously, polled
//! until it settles, and each finished subtask's transcript document is
//! downloaded and flattened into raw segments.
//!
//! When hot words are configured and no preset vocabulary is given, a
//! vocabulary is created once per client and reused for every task.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vbatch_models::{retry_async, Feature, RawTranscriptSegment, RetryPolicy};
use vbatch_storage::{with_staged_object, ObjectStager};

use crate::client::{poll_until, transient_retry_policy, AnalysisClient, AnalysisOutput, PollConfig, PollStatus};
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{
    Hotword, SubtaskResult, TaskOutput, TaskResponse, TaskStatus, TranscriptionDocument, TranscriptionInput,
    TranscriptionParameters, TranscriptionRequest, VocabularyInput, VocabularyRequest, VocabularyResponse,
};

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";
const DEFAULT_MODEL: &str = "paraformer-v2";
const VOCABULARY_MODEL: &str = "speech-biasing";
const DEFAULT_HOTWORD_WEIGHT: u8 = 4;

/// Configuration for the DashScope client.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub language_hints: Vec<String>,
    /// Preset hot-word vocabulary; takes precedence over `hotwords`
    pub vocabulary_id: Option<String>,
    /// Words to bias recognition towards
    pub hotwords: Vec<String>,
    /// 1 to 5
    pub hotword_weight: u8,
    /// Label each sentence with a speaker index
    pub diarization: bool,
    /// Expected number of speakers, a hint for diarization
    pub speaker_count: Option<u32>,
    pub poll: PollConfig,
    pub request_timeout: Duration,
    /// Timeout for fetching one transcript document
    pub download_timeout: Duration,
}

impl TranscriptionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            language_hints: vec!["zh".to_string(), "en".to_string()],
            vocabulary_id: None,
            hotwords: Vec::new(),
            hotword_weight: DEFAULT_HOTWORD_WEIGHT,
            diarization: false,
            speaker_count: None,
            poll: PollConfig::default(),
            request_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(30),
        }
    }

    /// Create config from `DASHSCOPE_*` environment variables.
    pub fn from_env() -> AnalysisResult<Self> {
        let api_key = std::env::var("DASHSCOPE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AnalysisError::config("DASHSCOPE_API_KEY not set"))?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("DASHSCOPE_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("DASHSCOPE_MODEL") {
            config.model = model;
        }
        if let Ok(hints) = std::env::var("DASHSCOPE_LANGUAGE_HINTS") {
            let hints = split_list(&hints);
            if !hints.is_empty() {
                config.language_hints = hints;
            }
        }
        config.vocabulary_id = std::env::var("DASHSCOPE_VOCABULARY_ID").ok().filter(|v| !v.is_empty());
        if let Ok(words) = std::env::var("DASHSCOPE_HOTWORDS") {
            config.hotwords = split_list(&words);
        }
        if let Ok(weight) = std::env::var("DASHSCOPE_HOTWORD_WEIGHT") {
            config.hotword_weight = weight
                .parse::<u8>()
                .ok()
                .filter(|w| (1..=5).contains(w))
                .ok_or_else(|| AnalysisError::config(format!("DASHSCOPE_HOTWORD_WEIGHT must be 1-5, got '{}'", weight)))?;
        }
        config.diarization = std::env::var("DASHSCOPE_DIARIZATION")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config.speaker_count = std::env::var("DASHSCOPE_SPEAKER_COUNT").ok().and_then(|s| s.parse().ok());
        if let Some(secs) = std::env::var("DASHSCOPE_POLL_INTERVAL_SECS").ok().and_then(|s| s.parse().ok()) {
            config.poll.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = std::env::var("DASHSCOPE_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.poll.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Client for the DashScope asynchronous transcription API.
pub struct DashScopeClient {
    http: Client,
    stager: Arc<dyn ObjectStager>,
    config: TranscriptionConfig,
    retry: RetryPolicy<AnalysisError>,
    vocabulary: OnceCell<Option<String>>,
}

impl DashScopeClient {
    pub fn new(config: TranscriptionConfig, stager: Arc<dyn ObjectStager>) -> AnalysisResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("vbatch-analysis/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            stager,
            config,
            retry: transient_retry_policy("dashscope"),
            vocabulary: OnceCell::new(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy<AnalysisError>) -> Self {
        self.retry = retry;
        self
    }

    fn request_for(&self, file_url: &str, vocabulary_id: Option<String>) -> TranscriptionRequest {
        TranscriptionRequest {
            model: self.config.model.clone(),
            input: TranscriptionInput {
                file_urls: vec![file_url.to_string()],
            },
            parameters: TranscriptionParameters {
                language_hints: self.config.language_hints.clone(),
                enable_words: true,
                enable_punctuation_prediction: true,
                enable_inverse_text_normalization: true,
                enable_disfluency: false,
                vocabulary_id,
                diarization_enabled: self.config.diarization,
                speaker_count: self.config.speaker_count.filter(|_| self.config.diarization),
            },
        }
    }

    /// The preset vocabulary, else one created from the hot words.
    ///
    /// A failed creation is logged and transcription proceeds without one.
    async fn vocabulary_id(&self) -> Option<String> {
        self.vocabulary
            .get_or_init(|| async {
                if let Some(preset) = &self.config.vocabulary_id {
                    info!(vocabulary_id = %preset, "Using preset hot-word vocabulary");
                    return Some(preset.clone());
                }
                if self.config.hotwords.is_empty() {
                    return None;
                }

                let created = retry_async(&self.retry, |attempt| async move {
                    debug!(attempt, hotwords = self.config.hotwords.len(), "Creating hot-word vocabulary");
                    self.create_vocabulary().await
                })
                .await
                .into_result();

                match created {
                    Ok(id) => {
                        info!(vocabulary_id = %id, hotwords = self.config.hotwords.len(), "Hot-word vocabulary created");
                        Some(id)
                    }
                    Err(e) => {
                        warn!("Hot-word vocabulary creation failed, continuing without: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn create_vocabulary(&self) -> AnalysisResult<String> {
        let url = format!("{}/api/v1/services/audio/asr/customization", self.config.base_url);
        let request = VocabularyRequest {
            model: VOCABULARY_MODEL.to_string(),
            input: VocabularyInput::CreateVocabulary {
                target_model: self.config.model.clone(),
                prefix: "vbatch".to_string(),
                vocabulary: self
                    .config
                    .hotwords
                    .iter()
                    .map(|text| Hotword {
                        text: text.clone(),
                        weight: self.config.hotword_weight,
                    })
                    .collect(),
            },
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::from_response(response).await);
        }

        let created: VocabularyResponse = response.json().await?;
        Ok(created.output.vocabulary_id)
    }

    /// Submit once (retrying transient submit errors), poll that one task
    /// under a single deadline, then download each finished subtask.
    async fn transcribe(&self, file_url: &str) -> AnalysisResult<Vec<RawTranscriptSegment>> {
        let request = self.request_for(file_url, self.vocabulary_id().await);
        let request = &request;

        let submitted = retry_async(&self.retry, |attempt| async move {
            debug!(attempt, model = %request.model, "Submitting transcription task");
            self.submit(request).await
        })
        .await
        .into_result()?;

        let task_id = submitted.output.task_id.clone();
        info!(task_id = %task_id, request_id = ?submitted.request_id, "Transcription task submitted");

        let output = if submitted.output.task_status.is_finished() {
            submitted.output
        } else {
            poll_until(self.config.poll, &task_id, || self.check_task(&task_id)).await?
        };
        let results = completed(output)?;

        let mut segments = Vec::new();
        let mut succeeded = 0usize;
        for result in &results {
            match (&result.subtask_status, &result.transcription_url) {
                (TaskStatus::Succeeded, Some(url)) => {
                    let document = retry_async(&self.retry, |_| self.download(url)).await.into_result()?;
                    segments.extend(flatten(document));
                    succeeded += 1;
                }
                (status, _) => warn!(
                    task_id = %task_id,
                    status = ?status,
                    code = ?result.code,
                    "Transcription subtask did not succeed: {}",
                    result.message.as_deref().unwrap_or("no message")
                ),
            }
        }

        if succeeded == 0 {
            return Err(AnalysisError::operation_failed(format!(
                "task {} produced no successful transcription",
                task_id
            )));
        }

        info!(task_id = %task_id, segments = segments.len(), "Transcription complete");
        Ok(segments)
    }

    async fn submit(&self, request: &TranscriptionRequest) -> AnalysisResult<TaskResponse> {
        let url = format!("{}/api/v1/services/audio/asr/transcription", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("X-DashScope-Async", "enable")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::from_response(response).await);
        }

        Ok(response.json().await?)
    }

    /// Finished tasks come back whole, failures included, so a terminal
    /// failure is never mistaken for a transient poll error.
    async fn check_task(&self, task_id: &str) -> AnalysisResult<PollStatus<TaskOutput>> {
        let url = format!("{}/api/v1/tasks/{}", self.config.base_url, task_id);
        let response = self.http.get(&url).bearer_auth(&self.config.api_key).send().await?;

        if !response.status().is_success() {
            return Err(AnalysisError::from_response(response).await);
        }

        let task: TaskResponse = response.json().await?;
        if task.output.task_status.is_finished() {
            Ok(PollStatus::Done(task.output))
        } else {
            Ok(PollStatus::Pending)
        }
    }

    async fn download(&self, url: &str) -> AnalysisResult<TranscriptionDocument> {
        let response = self
            .http
            .get(url)
            .timeout(self.config.download_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::from_response(response).await);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AnalysisClient for DashScopeClient {
    async fn analyze(&self, path: &Path, features: &[Feature]) -> AnalysisResult<AnalysisOutput> {
        if let Some(other) = features.iter().find(|f| **f != Feature::Transcription) {
            return Err(AnalysisError::Unsupported(format!(
                "{} is not available from dashscope",
                other
            )));
        }
        if !path.is_file() {
            return Err(AnalysisError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("audio file not found: {}", path.display()),
            )));
        }

        let segments = with_staged_object(Arc::clone(&self.stager), path, staging_key(path), |url| async move {
            self.transcribe(&url).await
        })
        .await?;

        Ok(AnalysisOutput::Transcript { segments })
    }

    fn service(&self) -> &'static str {
        "dashscope"
    }
}

/// Subtask results of a finished task; failed and cancelled tasks are errors.
fn completed(output: TaskOutput) -> AnalysisResult<Vec<SubtaskResult>> {
    match output.task_status {
        TaskStatus::Succeeded => Ok(output.results),
        status => Err(AnalysisError::operation_failed(format!(
            "task {} {:?}: {} {}",
            output.task_id,
            status,
            output.code.unwrap_or_default(),
            output.message.unwrap_or_default()
        ))),
    }
}

fn staging_key(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("audio_transcription/{}{}", Uuid::new_v4(), ext)
}

/// Sentences in millisecond offsets become raw segments in seconds.
fn flatten(document: TranscriptionDocument) -> Vec<RawTranscriptSegment> {
    document
        .transcripts
        .into_iter()
        .flat_map(|t| t.sentences)
        .map(|s| RawTranscriptSegment {
            start: s.begin_time.map(|ms| ms / 1000.0),
            end: s.end_time.map(|ms| ms / 1000.0),
            text: s.text,
            confidence: None,
            speaker: s.speaker_id,
        })
        .collect()
}
