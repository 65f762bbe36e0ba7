pub mod extract;

pub use extract::{check_ffmpeg, check_ffprobe, probe_media, read_wav_header, FfmpegExtractor, MediaProbe};

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Decoded 16-bit PCM audio on disk, owned by the job that extracted it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Duration of the source video in seconds.
    pub duration: f64,
}

/// Demuxes the audio stream of a container into a PCM WAV file.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Decode the audio of `video` into `output`. On error no file is left
    /// at `output`.
    async fn extract(&self, video: &Path, output: &Path) -> Result<AudioTrack>;
}
