//! Uniform ranges for media where shot detection found nothing.

use std::path::Path;

use tracing::{info, warn};
use vbatch_media::DurationProbe;
use vbatch_models::TimeRange;

pub const FALLBACK_CONFIDENCE: f64 = 0.8;

/// Upper bound on synthesized ranges for one item.
pub const MAX_FALLBACK_RANGES: u32 = 10_000;

/// Split `[0, duration)` into ranges of `segment_secs`, truncating the last.
///
/// Ranges are numbered from 1 and labelled `default segment N`.
pub fn fallback_ranges(duration: f64, segment_secs: f64) -> Vec<TimeRange> {
    if !duration.is_finite() || duration <= 0.0 || !segment_secs.is_finite() || segment_secs <= 0.0 {
        return Vec::new();
    }

    let count = (duration / segment_secs).ceil();
    if count > f64::from(MAX_FALLBACK_RANGES) {
        warn!(
            duration,
            segment_secs,
            max = MAX_FALLBACK_RANGES,
            "Fallback would produce too many ranges, skipping"
        );
        return Vec::new();
    }
    // Bounded above, so the cast cannot truncate.
    let count = count as u32;

    (0..count)
        .filter_map(|i| {
            let start = f64::from(i) * segment_secs;
            let end = (start + segment_secs).min(duration);
            let number = i + 1;
            TimeRange::new(number, start, end, format!("default segment {}", number), FALLBACK_CONFIDENCE)
                .map_err(|e| warn!("Skipping fallback range {}: {}", number, e))
                .ok()
        })
        .collect()
}

/// Probe `path` and build fallback ranges. A failed probe yields no ranges.
pub async fn generate_fallback(probe: &dyn DurationProbe, path: &Path, segment_secs: f64) -> Vec<TimeRange> {
    match probe.duration(path).await {
        Ok(duration) => {
            let ranges = fallback_ranges(duration, segment_secs);
            info!(
                duration,
                segment_secs,
                ranges = ranges.len(),
                "Generated fallback ranges for {}",
                path.display()
            );
            ranges
        }
        Err(e) => {
            warn!("Duration probe failed for {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
