//! Quality gates for slices and transcripts.
//!
//! Both gates classify each artifact as valid or invalid, count errors, and
//! hand the tally to one verdict function. The first violated check is the
//! rejection reason, so each gate fixes its own check order: slices check
//! valid ratio, error ratio, then minimum count; transcripts check minimum
//! count first. The gates never mutate their input.

use std::path::Path;

use tracing::debug;
use vbatch_models::{
    DurationStats, ExtractionResult, QualityIssues, QualityReport, RawTranscriptSegment, Rejection,
    TranscriptSegment,
};

/// Pass thresholds shared by both gates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateThresholds {
    pub min_valid_ratio: f64,
    pub max_error_ratio: f64,
    pub min_valid_count: usize,
}

impl GateThresholds {
    fn from_env(prefix: &str, defaults: GateThresholds) -> Self {
        let var = |name: &str| std::env::var(format!("{}_{}", prefix, name)).ok();
        Self {
            min_valid_ratio: var("MIN_VALID_RATIO")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_valid_ratio),
            max_error_ratio: var("MAX_ERROR_RATIO")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_error_ratio),
            min_valid_count: var("MIN_VALID_COUNT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_valid_count),
        }
    }
}

/// One threshold comparison made by [`verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCheck {
    ValidRatio,
    ErrorRatio,
    MinCount,
}

pub const SLICE_CHECK_ORDER: [GateCheck; 3] = [GateCheck::ValidRatio, GateCheck::ErrorRatio, GateCheck::MinCount];
pub const TRANSCRIPT_CHECK_ORDER: [GateCheck; 3] = [GateCheck::MinCount, GateCheck::ValidRatio, GateCheck::ErrorRatio];

#[derive(Debug, Default)]
struct Tally {
    total: usize,
    valid: usize,
    errors: usize,
    durations: Vec<f64>,
    issues: QualityIssues,
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn verdict(tally: Tally, thresholds: &GateThresholds, order: &[GateCheck]) -> QualityReport {
    let valid_ratio = ratio(tally.valid, tally.total);
    let error_ratio = ratio(tally.errors, tally.total);

    let rejection = order.iter().find_map(|check| match check {
        GateCheck::ValidRatio if valid_ratio < thresholds.min_valid_ratio => Some(Rejection::ValidRatio {
            actual: valid_ratio,
            required: thresholds.min_valid_ratio,
        }),
        GateCheck::ErrorRatio if error_ratio > thresholds.max_error_ratio => Some(Rejection::ErrorRatio {
            actual: error_ratio,
            allowed: thresholds.max_error_ratio,
        }),
        GateCheck::MinCount if tally.valid < thresholds.min_valid_count => Some(Rejection::MinCount {
            actual: tally.valid,
            required: thresholds.min_valid_count,
        }),
        _ => None,
    });

    QualityReport {
        passed: rejection.is_none(),
        reason: rejection.as_ref().map(ToString::to_string),
        rejection,
        valid_count: tally.valid,
        invalid_count: tally.total - tally.valid,
        total_count: tally.total,
        valid_ratio,
        error_ratio,
        duration_stats: DurationStats::from_durations(&tally.durations),
        issues: tally.issues,
    }
}

/// Gate for extracted slices.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceQualityPolicy {
    pub thresholds: GateThresholds,
    /// A valid slice file is strictly larger than this
    pub min_size_bytes: u64,
    pub max_duration_secs: f64,
}

impl Default for SliceQualityPolicy {
    fn default() -> Self {
        Self {
            thresholds: GateThresholds {
                min_valid_ratio: 0.8,
                max_error_ratio: 0.2,
                min_valid_count: 2,
            },
            min_size_bytes: 1024,
            max_duration_secs: 300.0,
        }
    }
}

impl SliceQualityPolicy {
    /// Create policy from `SLICE_QUALITY_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            thresholds: GateThresholds::from_env("SLICE_QUALITY", defaults.thresholds),
            min_size_bytes: std::env::var("SLICE_QUALITY_MIN_SIZE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_size_bytes),
            max_duration_secs: std::env::var("SLICE_QUALITY_MAX_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_duration_secs),
        }
    }

    /// Evaluate slices, reading file sizes from disk.
    pub fn evaluate(&self, results: &[ExtractionResult]) -> QualityReport {
        self.evaluate_with(results, |path| std::fs::metadata(path).ok().map(|m| m.len()))
    }

    /// Evaluate slices with `file_size` standing in for the filesystem.
    pub fn evaluate_with<F>(&self, results: &[ExtractionResult], file_size: F) -> QualityReport
    where
        F: Fn(&Path) -> Option<u64>,
    {
        let mut tally = Tally {
            total: results.len(),
            ..Default::default()
        };

        for result in results {
            if !result.succeeded {
                tally.errors += 1;
            }

            let size_ok = file_size(&result.output_path).is_some_and(|size| size > self.min_size_bytes);
            let duration_ok = result.duration > 0.0 && result.duration <= self.max_duration_secs;
            if size_ok && duration_ok {
                tally.valid += 1;
                tally.durations.push(result.duration);
            } else {
                debug!(index = result.index, size_ok, duration_ok, "Invalid slice");
            }
        }

        verdict(tally, &self.thresholds, &SLICE_CHECK_ORDER)
    }
}

/// Gate for transcript segments.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptQualityPolicy {
    pub thresholds: GateThresholds,
}

impl Default for TranscriptQualityPolicy {
    fn default() -> Self {
        Self {
            thresholds: GateThresholds {
                min_valid_ratio: 0.9,
                max_error_ratio: 0.1,
                min_valid_count: 1,
            },
        }
    }
}

enum SegmentCheck {
    Valid(f64),
    MissingFields,
    TimestampError,
    TextMissing,
}

fn check_segment(segment: &RawTranscriptSegment) -> SegmentCheck {
    let (Some(start), Some(end), Some(text)) = (segment.start, segment.end, segment.text.as_deref()) else {
        return SegmentCheck::MissingFields;
    };
    if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
        return SegmentCheck::TimestampError;
    }
    if text.trim().is_empty() {
        return SegmentCheck::TextMissing;
    }
    SegmentCheck::Valid(end)
}

impl TranscriptQualityPolicy {
    /// Create policy from `TRANSCRIPT_QUALITY_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            thresholds: GateThresholds::from_env("TRANSCRIPT_QUALITY", Self::default().thresholds),
        }
    }

    pub fn evaluate(&self, segments: &[RawTranscriptSegment]) -> QualityReport {
        if segments.is_empty() {
            return QualityReport::no_segments();
        }

        let mut tally = Tally {
            total: segments.len(),
            ..Default::default()
        };
        let mut previous_end = 0.0_f64;

        for segment in segments {
            match check_segment(segment) {
                SegmentCheck::Valid(end) => {
                    let start = segment.start.unwrap_or_default();
                    if start < previous_end {
                        tally.issues.overlap_count += 1;
                    }
                    previous_end = end;
                    tally.valid += 1;
                    tally.durations.push(end - start);
                }
                SegmentCheck::MissingFields => tally.issues.missing_fields += 1,
                SegmentCheck::TimestampError => tally.issues.timestamp_errors += 1,
                SegmentCheck::TextMissing => tally.issues.text_missing += 1,
            }
        }

        tally.errors = tally.issues.timestamp_errors + tally.issues.text_missing;
        verdict(tally, &self.thresholds, &TRANSCRIPT_CHECK_ORDER)
    }

    /// The segments this gate counts as valid, in input order.
    pub fn accepted_segments(&self, segments: &[RawTranscriptSegment]) -> Vec<TranscriptSegment> {
        segments
            .iter()
            .filter(|s| matches!(check_segment(s), SegmentCheck::Valid(_)))
            .filter_map(|s| TranscriptSegment::try_from(s).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[derive(Debug, Clone, Copy)]
    enum SliceKind {
        Valid,
        Missing,
        Small,
        TooLong,
        Failed,
    }

    fn slice(index: u32, kind: SliceKind) -> (ExtractionResult, Option<u64>) {
        let duration = match kind {
            SliceKind::TooLong => 301.0,
            _ => 5.0,
        };
        let size = match kind {
            SliceKind::Valid | SliceKind::TooLong => Some(4096),
            SliceKind::Small => Some(1024),
            SliceKind::Missing | SliceKind::Failed => None,
        };
        let result = ExtractionResult {
            index,
            output_path: PathBuf::from(format!("/out/seg_{:03}.mp4", index)),
            start: 0.0,
            end: duration,
            duration,
            size_bytes: size.unwrap_or(0),
            processing_time: 0.5,
            succeeded: !matches!(kind, SliceKind::Failed),
            error_detail: matches!(kind, SliceKind::Failed).then(|| "Operation timed out after 120 seconds".into()),
        };
        (result, size)
    }

    fn evaluate(kinds: &[SliceKind]) -> QualityReport {
        let (results, sizes): (Vec<_>, Vec<_>) = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| slice(i as u32 + 1, *k))
            .unzip();
        let sizes: HashMap<PathBuf, u64> = results
            .iter()
            .zip(sizes)
            .filter_map(|(r, s)| s.map(|s| (r.output_path.clone(), s)))
            .collect();
        SliceQualityPolicy::default().evaluate_with(&results, |p| sizes.get(p).copied())
    }

    #[test]
    fn test_four_of_five_with_one_timeout_passes() {
        use SliceKind::*;
        let report = evaluate(&[Valid, Valid, Failed, Valid, Valid]);

        assert!(report.passed);
        assert_eq!(report.valid_ratio, 0.8);
        assert_eq!(report.error_ratio, 0.2);
        assert_eq!(report.valid_count, 4);
        assert_eq!(report.invalid_count, 1);
        assert!(report.reason.is_none());
    }

    #[test]
    fn test_three_of_ten_rejected_on_valid_ratio() {
        use SliceKind::*;
        let report = evaluate(&[Valid, Valid, Valid, Small, Small, Missing, Missing, TooLong, TooLong, Small]);

        assert!(!report.passed);
        assert_eq!(report.reason.as_deref(), Some("validRatio 0.3 < 0.8"));
        assert!(matches!(report.rejection, Some(Rejection::ValidRatio { .. })));
    }

    #[test]
    fn test_error_ratio_checked_after_valid_ratio() {
        use SliceKind::*;
        // All files valid on disk, but two of five encoder runs reported failure.
        let (mut results, _): (Vec<_>, Vec<_>) = (1..=5).map(|i| slice(i, Valid)).unzip();
        results[0].succeeded = false;
        results[1].succeeded = false;
        let report = SliceQualityPolicy::default().evaluate_with(&results, |_| Some(4096));

        assert!(!report.passed);
        assert_eq!(report.valid_ratio, 1.0);
        assert!(matches!(report.rejection, Some(Rejection::ErrorRatio { .. })));

        let single = evaluate(&[Valid]);
        assert!(matches!(single.rejection, Some(Rejection::MinCount { actual: 1, required: 2 })));
    }

    #[test]
    fn test_exactly_min_size_is_invalid() {
        let report = evaluate(&[SliceKind::Small, SliceKind::Small]);
        assert_eq!(report.valid_count, 0);
    }

    #[test]
    fn test_slice_gate_reads_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let mut results = Vec::new();
        for i in 1..=2u32 {
            let (mut r, _) = slice(i, SliceKind::Valid);
            r.output_path = dir.path().join(format!("seg_{}.mp4", i));
            std::fs::write(&r.output_path, vec![0u8; 2048]).unwrap();
            results.push(r);
        }

        let report = SliceQualityPolicy::default().evaluate(&results);
        assert!(report.passed);
        assert_eq!(report.duration_stats.total, 10.0);
    }

    #[test]
    fn test_empty_transcript_rejected_immediately() {
        let report = TranscriptQualityPolicy::default().evaluate(&[]);
        assert!(!report.passed);
        assert_eq!(report.rejection, Some(Rejection::NoSegments));
        assert_eq!(report.reason.as_deref(), Some("no segments"));
    }

    #[test]
    fn test_transcript_issue_counters() {
        let segments = vec![
            RawTranscriptSegment::new(0.0, 2.0, "one"),
            RawTranscriptSegment::new(1.5, 3.0, "overlaps"),
            RawTranscriptSegment::new(4.0, 4.0, "zero length"),
            RawTranscriptSegment::new(5.0, 6.0, "   "),
            RawTranscriptSegment {
                start: Some(7.0),
                end: None,
                text: Some("no end".into()),
                confidence: None,
                speaker: None,
            },
        ];

        let report = TranscriptQualityPolicy::default().evaluate(&segments);
        assert_eq!(report.valid_count, 2);
        assert_eq!(report.issues.overlap_count, 1);
        assert_eq!(report.issues.timestamp_errors, 1);
        assert_eq!(report.issues.text_missing, 1);
        assert_eq!(report.issues.missing_fields, 1);
        // Missing fields are invalid but not errors.
        assert_eq!(report.error_ratio, 2.0 / 5.0);
        assert!(!report.passed);
    }

    #[test]
    fn test_transcript_checks_min_count_first() {
        let segments = vec![
            RawTranscriptSegment::new(2.0, 1.0, "backwards"),
            RawTranscriptSegment::new(3.0, 4.0, "  "),
        ];
        let report = TranscriptQualityPolicy::default().evaluate(&segments);

        assert!(!report.passed);
        assert_eq!(report.valid_ratio, 0.0);
        assert_eq!(report.reason.as_deref(), Some("validCount 0 < 1"));

        // The slice gate reports the same kind of shortfall as a ratio.
        use SliceKind::*;
        let slices = evaluate(&[Small, Missing]);
        assert_eq!(slices.reason.as_deref(), Some("validRatio 0 < 0.8"));
    }

    #[test]
    fn test_transcript_passes_and_accepts_valid_only() {
        let mut segments: Vec<_> = (0..10)
            .map(|i| RawTranscriptSegment::new(i as f64, i as f64 + 0.9, format!(" line {} ", i)))
            .collect();
        segments.push(RawTranscriptSegment::new(20.0, 19.0, "backwards"));

        let policy = TranscriptQualityPolicy::default();
        let report = policy.evaluate(&segments);
        assert!(report.passed, "{:?}", report.reason);

        let accepted = policy.accepted_segments(&segments);
        assert_eq!(accepted.len(), 10);
        assert_eq!(accepted[3].text, "line 3");
    }

    #[test]
    fn test_gate_is_idempotent() {
        use SliceKind::*;
        let kinds = [Valid, Failed, Small, Valid, TooLong, Valid];
        let first = serde_json::to_string(&evaluate(&kinds)).unwrap();
        let second = serde_json::to_string(&evaluate(&kinds)).unwrap();
        assert_eq!(first, second);

        let segments = vec![RawTranscriptSegment::new(0.0, 1.0, "a"), RawTranscriptSegment::new(0.5, 2.0, "")];
        let policy = TranscriptQualityPolicy::default();
        assert_eq!(policy.evaluate(&segments), policy.evaluate(&segments));
    }

    fn slice_kind() -> impl Strategy<Value = SliceKind> {
        prop_oneof![
            4 => Just(SliceKind::Valid),
            1 => Just(SliceKind::Missing),
            1 => Just(SliceKind::Small),
            1 => Just(SliceKind::TooLong),
            1 => Just(SliceKind::Failed),
        ]
    }

    proptest! {
        #[test]
        fn prop_slice_verdict_matches_thresholds(kinds in prop::collection::vec(slice_kind(), 0..40)) {
            let report = evaluate(&kinds);

            let total = kinds.len();
            let valid = kinds.iter().filter(|k| matches!(k, SliceKind::Valid)).count();
            let failed = kinds.iter().filter(|k| matches!(k, SliceKind::Failed)).count();
            let valid_ratio = if total == 0 { 0.0 } else { valid as f64 / total as f64 };
            let error_ratio = if total == 0 { 0.0 } else { failed as f64 / total as f64 };

            prop_assert_eq!(report.valid_count, valid);
            prop_assert_eq!(report.total_count, total);
            prop_assert_eq!(
                report.passed,
                valid_ratio >= 0.8 && error_ratio <= 0.2 && valid >= 2
            );
            prop_assert_eq!(report.passed, report.reason.is_none());
        }

        #[test]
        fn prop_transcript_counts_partition(
            spans in prop::collection::vec((-5.0f64..100.0, -5.0f64..20.0, any::<bool>()), 1..30)
        ) {
            let segments: Vec<_> = spans
                .iter()
                .map(|(start, len, has_text)| {
                    RawTranscriptSegment::new(*start, start + len, if *has_text { "text" } else { "" })
                })
                .collect();
            let report = TranscriptQualityPolicy::default().evaluate(&segments);

            prop_assert_eq!(report.valid_count + report.invalid_count, segments.len());
            prop_assert_eq!(
                report.invalid_count,
                report.issues.timestamp_errors + report.issues.text_missing + report.issues.missing_fields
            );
            prop_assert!(report.issues.overlap_count <= report.valid_count);
        }
    }
}
