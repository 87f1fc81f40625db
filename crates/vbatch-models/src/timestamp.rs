//! Subtitle timestamp formatting and parsing.
//!
//! Timestamps are `HH:MM:SS,mmm` (SRT). A `.` separator is accepted when
//! parsing since some tools emit it.

use thiserror::Error;

/// Timestamp parsing errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TimestampError {
    #[error("Empty timestamp")]
    Empty,
    #[error("Invalid timestamp format: {0}")]
    InvalidFormat(String),
    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),
}

/// Convert seconds to whole milliseconds, rounding to nearest.
pub fn to_millis(seconds: f64) -> u64 {
    if seconds <= 0.0 || !seconds.is_finite() {
        0
    } else {
        (seconds * 1000.0).round() as u64
    }
}

/// Format seconds as `HH:MM:SS,mmm`.
///
/// ```
/// use vbatch_models::timestamp::format_srt_timestamp;
/// assert_eq!(format_srt_timestamp(3661.5), "01:01:01,500");
/// ```
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = to_millis(seconds);
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

/// Parse `HH:MM:SS,mmm` into seconds.
pub fn parse_srt_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let (clock, millis) = ts
        .split_once(',')
        .or_else(|| ts.rsplit_once('.'))
        .ok_or_else(|| TimestampError::InvalidFormat(ts.to_string()))?;

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    let field = |name: &'static str, value: &str| -> Result<u64, TimestampError> {
        value
            .parse::<u64>()
            .map_err(|_| TimestampError::InvalidValue(name, value.to_string()))
    };

    let hours = field("hours", parts[0])?;
    let minutes = field("minutes", parts[1])?;
    let seconds = field("seconds", parts[2])?;
    let millis = field("milliseconds", millis)?;
    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    let total_ms = hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis;
    Ok(total_ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(12.3456), "00:00:12,346");
        assert_eq!(format_srt_timestamp(-3.0), "00:00:00,000");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_srt_timestamp("00:01:02,250").unwrap(), 62.25);
        assert_eq!(parse_srt_timestamp("01:00:00.001").unwrap(), 3600.001);
        assert!(parse_srt_timestamp("1:2").is_err());
        assert!(parse_srt_timestamp("00:61:00,000").is_err());
        assert_eq!(parse_srt_timestamp(""), Err(TimestampError::Empty));
    }
}
