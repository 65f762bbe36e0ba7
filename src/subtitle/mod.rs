pub mod srt;

pub use srt::{parse_srt, write_srt, SrtFormatter};

use crate::transcribe::Segment;
use tracing::debug;

/// One numbered subtitle entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Ordered cues with gap-free indices starting at 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleTrack {
    pub cues: Vec<Cue>,
}

impl SubtitleTrack {
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

pub trait SubtitleFormatter {
    fn format(&self, track: &SubtitleTrack) -> String;
}

/// Turn translated segments into cues.
///
/// Segments with unusable timing or blank translated text are skipped, and
/// only emitted cues consume an index.
pub fn build_track(segments: &[Segment]) -> SubtitleTrack {
    let mut cues = Vec::with_capacity(segments.len());

    for segment in segments {
        if !segment.start.is_finite() || !segment.end.is_finite() || segment.start >= segment.end {
            debug!(
                "Skipping segment with bad timing {}..{}",
                segment.start, segment.end
            );
            continue;
        }
        let text = normalize_cue_text(&segment.target_text);
        if text.is_empty() {
            continue;
        }
        cues.push(Cue {
            index: cues.len() + 1,
            start: segment.start.max(0.0),
            end: segment.end,
            text,
        });
    }

    SubtitleTrack { cues }
}

/// Normalise line endings to `\n` and drop blank lines, which would end the
/// cue early.
pub fn normalize_cue_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
