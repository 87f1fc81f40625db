//! Transcript segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A validated transcript segment, times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Diarized speaker index, when the service labelled one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<u32>,
}

impl TranscriptSegment {
    /// Create a segment, enforcing `start >= 0`, `end > start` and non-blank text.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> ModelResult<Self> {
        let text = text.into();
        if !(start >= 0.0) {
            return Err(ModelError::invalid_segment(format!("negative start {start}")));
        }
        if !(end > start) {
            return Err(ModelError::invalid_segment(format!("end {end} not after start {start}")));
        }
        if text.trim().is_empty() {
            return Err(ModelError::invalid_segment("empty text"));
        }
        Ok(Self {
            start,
            end,
            text,
            confidence: None,
            speaker: None,
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_speaker(mut self, speaker: u32) -> Self {
        self.speaker = Some(speaker);
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A segment as returned by a transcription service, before validation.
///
/// Any field may be missing; the transcript quality gate decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawTranscriptSegment {
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub speaker: Option<u32>,
}

impl RawTranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            text: Some(text.into()),
            confidence: None,
            speaker: None,
        }
    }

    /// True when start, end and text are all present.
    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some() && self.text.is_some()
    }
}

impl TryFrom<&RawTranscriptSegment> for TranscriptSegment {
    type Error = ModelError;

    fn try_from(raw: &RawTranscriptSegment) -> ModelResult<Self> {
        match (raw.start, raw.end, raw.text.as_deref()) {
            (Some(start), Some(end), Some(text)) => {
                let mut segment = TranscriptSegment::new(start, end, text.trim())?;
                segment.confidence = raw.confidence;
                segment.speaker = raw.speaker;
                Ok(segment)
            }
            _ => Err(ModelError::invalid_segment("missing start, end or text")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_constraints() {
        assert!(TranscriptSegment::new(0.0, 1.5, "hello").is_ok());
        assert!(TranscriptSegment::new(-0.1, 1.5, "hello").is_err());
        assert!(TranscriptSegment::new(2.0, 2.0, "hello").is_err());
        assert!(TranscriptSegment::new(0.0, 1.0, "   ").is_err());
    }

    #[test]
    fn test_raw_conversion() {
        let raw = RawTranscriptSegment::new(1.0, 2.0, "  hi there ");
        let seg = TranscriptSegment::try_from(&raw).unwrap();
        assert_eq!(seg.text, "hi there");
        assert_eq!(seg.speaker, None);

        let labelled = RawTranscriptSegment {
            speaker: Some(2),
            ..RawTranscriptSegment::new(3.0, 4.0, "second voice")
        };
        assert_eq!(TranscriptSegment::try_from(&labelled).unwrap().speaker, Some(2));

        let partial = RawTranscriptSegment {
            start: Some(1.0),
            ..Default::default()
        };
        assert!(!partial.is_complete());
        assert!(TranscriptSegment::try_from(&partial).is_err());
    }
}
