//! SRT subtitle rendering and parsing.

use std::fmt::Write;

use vbatch_models::timestamp::{format_srt_timestamp, parse_srt_timestamp};
use vbatch_models::TranscriptSegment;

use crate::error::{MediaError, MediaResult};

/// Render segments as an SRT document, numbering cues from 1.
///
/// Blank lines inside cue text would end the cue early, so they are dropped.
pub fn to_srt(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{}\n{} --> {}\n{}",
            i + 1,
            format_srt_timestamp(segment.start),
            format_srt_timestamp(segment.end),
            cue_text(&segment.text)
        );
    }
    out
}

fn cue_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse an SRT document into transcript segments.
///
/// Blocks are separated by blank lines. Multi-line cue text is joined with
/// `\n`. A UTF-8 BOM and CRLF line endings are tolerated.
pub fn parse_srt(content: &str) -> MediaResult<Vec<TranscriptSegment>> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut segments = Vec::new();

    for (block_no, block) in content
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .enumerate()
    {
        let block_no = block_no + 1;
        let mut lines = block.lines();

        let mut timing = lines
            .next()
            .ok_or_else(|| MediaError::invalid_subtitle(block_no, "empty block"))?;
        // The cue number line is optional in practice.
        if !timing.contains("-->") {
            timing = lines
                .next()
                .ok_or_else(|| MediaError::invalid_subtitle(block_no, "missing timing line"))?;
        }

        let (start, end) = timing
            .split_once("-->")
            .ok_or_else(|| MediaError::invalid_subtitle(block_no, format!("bad timing line '{}'", timing)))?;
        let start = parse_srt_timestamp(start)
            .map_err(|e| MediaError::invalid_subtitle(block_no, e.to_string()))?;
        // Position hints may follow the end timestamp.
        let end = end.split_whitespace().next().unwrap_or_default();
        let end = parse_srt_timestamp(end)
            .map_err(|e| MediaError::invalid_subtitle(block_no, e.to_string()))?;

        let text = lines.collect::<Vec<_>>().join("\n");
        let segment = TranscriptSegment::new(start, end, text)
            .map_err(|e| MediaError::invalid_subtitle(block_no, e.to_string()))?;
        segments.push(segment);
    }

    Ok(segments)
}
