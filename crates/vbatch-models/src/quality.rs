//! Quality gate verdicts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Why a quality gate rejected an artifact set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// The input held no segments at all.
    NoSegments,
    ValidRatio { actual: f64, required: f64 },
    ErrorRatio { actual: f64, allowed: f64 },
    MinCount { actual: usize, required: usize },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoSegments => write!(f, "no segments"),
            Rejection::ValidRatio { actual, required } => {
                write!(f, "validRatio {} < {}", round4(*actual), round4(*required))
            }
            Rejection::ErrorRatio { actual, allowed } => {
                write!(f, "errorRatio {} > {}", round4(*actual), round4(*allowed))
            }
            Rejection::MinCount { actual, required } => {
                write!(f, "validCount {} < {}", actual, required)
            }
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Duration statistics over valid artifacts, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DurationStats {
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl DurationStats {
    pub fn from_durations(durations: &[f64]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }
        let total: f64 = durations.iter().sum();
        let min = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let max = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            total,
            mean: total / durations.len() as f64,
            min,
            max,
        }
    }
}

/// Per-kind issue counters. Only the transcript gate fills these in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QualityIssues {
    pub timestamp_errors: usize,
    pub text_missing: usize,
    pub missing_fields: usize,
    /// Counted, never a rejection cause.
    pub overlap_count: usize,
}

/// Immutable verdict produced by a quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityReport {
    pub passed: bool,
    /// Human readable rejection reason
    pub reason: Option<String>,
    pub rejection: Option<Rejection>,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub total_count: usize,
    pub valid_ratio: f64,
    pub error_ratio: f64,
    pub duration_stats: DurationStats,
    #[serde(default)]
    pub issues: QualityIssues,
}

impl QualityReport {
    /// Report for an empty transcript.
    pub fn no_segments() -> Self {
        Self {
            passed: false,
            reason: Some(Rejection::NoSegments.to_string()),
            rejection: Some(Rejection::NoSegments),
            valid_count: 0,
            invalid_count: 0,
            total_count: 0,
            valid_ratio: 0.0,
            error_ratio: 0.0,
            duration_stats: DurationStats::default(),
            issues: QualityIssues::default(),
        }
    }
}
