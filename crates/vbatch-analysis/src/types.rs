//! Wire types for the remote analysis services.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Google Video Intelligence (v1 REST)
// ---------------------------------------------------------------------------

/// Body of `POST /v1/videos:annotate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateRequest {
    /// `gs://` URI of a staged input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_uri: Option<String>,
    /// Base64 encoded input bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_content: Option<String>,
    /// Feature names, e.g. `SHOT_CHANGE_DETECTION`
    pub features: Vec<String>,
}

/// A long-running operation handle, as returned by submit and poll.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<AnnotateResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateResponse {
    #[serde(default)]
    pub annotation_results: Vec<AnnotationResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationResult {
    #[serde(default)]
    pub shot_annotations: Vec<VideoSegment>,
    #[serde(default)]
    pub segment_label_annotations: Vec<LabelAnnotationWire>,
}

/// Offsets are protobuf durations (`"12.480s"`). Zero offsets are omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSegment {
    #[serde(default)]
    pub start_time_offset: Option<String>,
    #[serde(default)]
    pub end_time_offset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelAnnotationWire {
    pub entity: Entity,
    #[serde(default)]
    pub segments: Vec<LabelSegment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelSegment {
    #[serde(default)]
    pub segment: VideoSegment,
    #[serde(default)]
    pub confidence: f64,
}

/// Parse a protobuf JSON duration (`"3.5s"`) into seconds.
pub fn parse_duration_offset(raw: Option<&str>) -> Option<f64> {
    match raw {
        None => Some(0.0),
        Some(s) => s.trim().strip_suffix('s')?.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

// ---------------------------------------------------------------------------
// DashScope file transcription
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/services/audio/asr/transcription`.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionRequest {
    pub model: String,
    pub input: TranscriptionInput,
    pub parameters: TranscriptionParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionInput {
    pub file_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionParameters {
    pub language_hints: Vec<String>,
    pub enable_words: bool,
    pub enable_punctuation_prediction: bool,
    pub enable_inverse_text_normalization: bool,
    pub enable_disfluency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_id: Option<String>,
    pub diarization_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_count: Option<u32>,
}

/// Envelope returned by submit and task queries.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub output: TaskOutput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskOutput {
    pub task_id: String,
    pub task_status: TaskStatus,
    #[serde(default)]
    pub results: Vec<SubtaskResult>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskResult {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub transcription_url: Option<String>,
    pub subtask_status: TaskStatus,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Document behind a `transcription_url`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionDocument {
    #[serde(default)]
    pub transcripts: Vec<Transcript>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

/// One recognised sentence. Times are milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sentence {
    #[serde(default)]
    pub begin_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    /// Present when diarization is enabled
    #[serde(default)]
    pub speaker_id: Option<u32>,
}

// ---------------------------------------------------------------------------
// DashScope hot-word vocabularies
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/services/audio/asr/customization`.
#[derive(Debug, Clone, Serialize)]
pub struct VocabularyRequest {
    pub model: String,
    pub input: VocabularyInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VocabularyInput {
    CreateVocabulary {
        target_model: String,
        prefix: String,
        vocabulary: Vec<Hotword>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotword {
    pub text: String,
    pub weight: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VocabularyResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub output: VocabularyOutput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VocabularyOutput {
    pub vocabulary_id: String,
}
