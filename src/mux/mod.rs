//! Burning subtitles into the video frames.

pub mod command;

pub use command::{escape_filter_value, force_style, subtitles_filter, MediaCommand};

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{MediaConfig, SubtitleStyle};
use crate::error::{Result, SubtitlerError};

/// Renders a subtitle file into a copy of a video.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Write `video` with `subtitles` burned in to `output`. On error
    /// nothing is left at `output`.
    async fn burn(&self, video: &Path, subtitles: &Path, output: &Path) -> Result<()>;
}

/// Hard-subtitling through ffmpeg's `subtitles` filter (libass).
pub struct FfmpegMuxer {
    ffmpeg_path: String,
    video_codec: String,
    crf: u8,
    extra_options: Vec<String>,
    style: SubtitleStyle,
    timeout: Duration,
}

impl FfmpegMuxer {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            video_codec: config.video_codec.clone(),
            crf: config.crf,
            extra_options: config.extra_options.clone(),
            style: config.style.clone(),
            timeout: Duration::from_secs(config.mux_timeout_secs),
        }
    }

    pub fn build_command(&self, video: &Path, subtitles: &Path, output: &Path) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Subtitle burn-in")
            .batch_mode()
            .input(video)
            .video_filter(subtitles_filter(subtitles, &self.style))
            .video_codec(&self.video_codec)
            .crf(self.crf)
            .copy_audio()
            .args(self.extra_options.iter().cloned())
            .output(output)
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn burn(&self, video: &Path, subtitles: &Path, output: &Path) -> Result<()> {
        for input in [video, subtitles] {
            if !input.is_file() {
                return Err(SubtitlerError::Mux(format!(
                    "Input not found: {}",
                    input.display()
                )));
            }
        }

        // Keep the real extension so ffmpeg picks the right container.
        let extension = output
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".mp4".to_string());
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".burn-")
            .suffix(&extension)
            .tempfile_in(dir)
            .map_err(|e| SubtitlerError::Mux(format!("Cannot stage output: {e}")))?
            .into_temp_path();

        info!("Burning subtitles into {}", video.display());
        self.build_command(video, subtitles, &staging)
            .execute(self.timeout)
            .await?;

        let size = std::fs::metadata(&staging).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(SubtitlerError::Mux("Transcoder produced an empty file".to_string()));
        }

        staging
            .persist(output)
            .map_err(|e| SubtitlerError::Mux(format!("Failed to store video: {}", e.error)))?;

        info!("Burned video written to {} ({} bytes)", output.display(), size);
        Ok(())
    }
}
