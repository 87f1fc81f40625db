//! Analysis features and pipeline selection.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Feature requested from a remote analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ShotDetection,
    LabelDetection,
    FaceDetection,
    TextDetection,
    Transcription,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::ShotDetection => "shot_detection",
            Feature::LabelDetection => "label_detection",
            Feature::FaceDetection => "face_detection",
            Feature::TextDetection => "text_detection",
            Feature::Transcription => "transcription",
        }
    }

    /// Parse a comma separated list, ignoring blanks.
    pub fn parse_list(s: &str) -> Result<Vec<Feature>, ModelError> {
        let mut features = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let feature: Feature = part.parse()?;
            if !features.contains(&feature) {
                features.push(feature);
            }
        }
        Ok(features)
    }
}

impl FromStr for Feature {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "shot_detection" | "shots" => Ok(Feature::ShotDetection),
            "label_detection" | "labels" => Ok(Feature::LabelDetection),
            "face_detection" | "faces" => Ok(Feature::FaceDetection),
            "text_detection" | "text" => Ok(Feature::TextDetection),
            "transcription" => Ok(Feature::Transcription),
            other => Err(ModelError::UnknownFeature(other.to_string())),
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipeline a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    /// Shot detection followed by clip extraction
    #[default]
    Slice,
    /// Speech transcription followed by SRT generation
    Transcribe,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Slice => "slice",
            Pipeline::Transcribe => "transcribe",
        }
    }
}

impl FromStr for Pipeline {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slice" | "slicing" => Ok(Pipeline::Slice),
            "transcribe" | "transcription" | "srt" => Ok(Pipeline::Transcribe),
            other => Err(ModelError::UnknownPipeline(other.to_string())),
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
