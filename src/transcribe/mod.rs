pub mod fallback;
pub mod service;
pub mod whisper;
pub mod whisper_cpp;

pub use fallback::FallbackTranscriber;
pub use service::{build_transcriber, create_engine, shared_transcriber};
pub use whisper::WhisperClient;
pub use whisper_cpp::WhisperCppTranscriber;

use crate::audio::AudioTrack;
use crate::error::Result;
use async_trait::async_trait;

/// One transcribed utterance. Times are seconds from the start of the video.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub source_text: String,
    /// Filled in by the translator.
    pub target_text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, source_text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            source_text: source_text.into(),
            target_text: String::new(),
        }
    }
}

/// A segment as a recognizer reports it, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub text: String,
}

/// Ordered recognizer output.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
    /// Label of the engine that produced the segments.
    pub engine: String,
    /// True when a fallback engine had to be used.
    pub degraded: bool,
}

/// Anything that turns audio into ordered, timestamped text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioTrack) -> Result<Transcript>;
    fn name(&self) -> String;
}

/// Turn raw recognizer output into valid segments sorted by start.
///
/// A missing start drops the segment. A missing end closes it at the end of
/// the audio. Ends are clamped to `duration`, and anything left with
/// `start >= end` is dropped.
pub fn normalize_segments(raw: Vec<RawSegment>, duration: f64) -> Vec<Segment> {
    let limit = if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        f64::INFINITY
    };

    let mut segments: Vec<Segment> = raw
        .into_iter()
        .filter_map(|seg| {
            let start = seg.start.filter(|s| s.is_finite())?.max(0.0);
            let end = match seg.end {
                Some(e) if e.is_finite() => e.min(limit),
                Some(_) => return None,
                None if limit.is_finite() => limit,
                None => return None,
            };
            (start < end).then(|| Segment::new(start, end, seg.text.trim()))
        })
        .collect();

    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}
