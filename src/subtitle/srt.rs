// SRT subtitle format
use std::path::Path;

use regex::Regex;
use tracing::debug;

use super::{normalize_cue_text, Cue, SubtitleFormatter, SubtitleTrack};
use crate::error::{Result, SubtitlerError};
use crate::timecode::{format_timecode, parse_timecode};

/// UTF-8 byte order mark. Players use it to detect the encoding of
/// right-to-left and other non-Latin subtitles.
pub const BOM: char = '\u{FEFF}';

pub struct SrtFormatter;

impl SubtitleFormatter for SrtFormatter {
    fn format(&self, track: &SubtitleTrack) -> String {
        track
            .cues
            .iter()
            .map(|cue| {
                format!(
                    "{}\n{} --> {}\n{}\n\n",
                    cue.index,
                    format_timecode(cue.start),
                    format_timecode(cue.end),
                    cue.text
                )
            })
            .collect()
    }
}

/// Write `track` to `path` as BOM-prefixed UTF-8.
///
/// The file is staged next to `path` and renamed into place, so `path`
/// either holds the complete track or does not exist.
pub fn write_srt(track: &SubtitleTrack, path: &Path) -> Result<()> {
    let mut body = String::new();
    body.push(BOM);
    body.push_str(&SrtFormatter.format(track));

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".subtitle-")
        .suffix(".srt.part")
        .tempfile_in(dir)
        .map_err(|e| SubtitlerError::SubtitleBuild(format!("Cannot stage {}: {e}", path.display())))?
        .into_temp_path();

    std::fs::write(&staging, body.as_bytes())
        .map_err(|e| SubtitlerError::SubtitleBuild(format!("Cannot write {}: {e}", path.display())))?;

    staging.persist(path).map_err(|e| {
        SubtitlerError::SubtitleBuild(format!("Cannot store {}: {}", path.display(), e.error))
    })?;

    debug!("Wrote {} cues to {}", track.len(), path.display());
    Ok(())
}

const TIMING_PATTERN: &str =
    r"^\s*(\d+:\d{2}:\d{2}[,.]\d{3})\s*-->\s*(\d+:\d{2}:\d{2}[,.]\d{3})";

/// Parse SRT text (with or without a BOM, LF or CRLF) into a track.
///
/// Cue numbers in the input are ignored and reassigned from 1.
pub fn parse_srt(content: &str) -> Result<SubtitleTrack> {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let content = content.replace("\r\n", "\n");
    let timing = Regex::new(TIMING_PATTERN)
        .map_err(|e| SubtitlerError::SubtitleBuild(format!("Bad timing pattern: {e}")))?;

    let mut cues = Vec::new();

    for (block_no, block) in content.split("\n\n").enumerate() {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }

        // The counter line is optional in the wild; find the timing line.
        let Some(timing_at) = lines.iter().position(|l| timing.is_match(l)) else {
            return Err(SubtitlerError::SubtitleBuild(format!(
                "Block {} has no timing line",
                block_no + 1
            )));
        };

        let caps = timing
            .captures(lines[timing_at])
            .ok_or_else(|| SubtitlerError::SubtitleBuild("Unreadable timing line".to_string()))?;
        let (start, end) = match (parse_timecode(&caps[1]), parse_timecode(&caps[2])) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(SubtitlerError::SubtitleBuild(format!(
                    "Invalid timecode in block {}",
                    block_no + 1
                )))
            }
        };

        cues.push(Cue {
            index: cues.len() + 1,
            start,
            end,
            text: normalize_cue_text(&lines[timing_at + 1..].join("\n")),
        });
    }

    Ok(SubtitleTrack { cues })
}
