use std::path::Path;
use std::process::{Command, Stdio};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, SubtitlerError};

use super::{AudioExtractor, AudioTrack};

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg(binary: &str) -> Result<()> {
    check_tool(binary, "FFmpeg")
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe(binary: &str) -> Result<()> {
    check_tool(binary, "FFprobe")
}

fn check_tool(binary: &str, name: &str) -> Result<()> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            SubtitlerError::Config(format!(
                "{name} not found at '{binary}'. Install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(SubtitlerError::Config(format!("{name} check failed")));
    }

    debug!("{} is available", name);
    Ok(())
}

/// What ffprobe reports about a container.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub duration: Option<f64>,
    /// `(sample_rate, channels)` of the first audio stream.
    pub audio: Option<(u32, u16)>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe duration and first audio stream of `input`.
pub async fn probe_media(ffprobe: &str, input: &Path) -> Result<MediaProbe> {
    let output = tokio::process::Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "format=duration:stream=codec_type,sample_rate,channels",
            "-of",
            "json",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SubtitlerError::Extraction(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SubtitlerError::Extraction(format!(
            "Unreadable container: {}",
            stderr.trim()
        )));
    }

    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe(json: &str) -> Result<MediaProbe> {
    let parsed: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| SubtitlerError::Extraction(format!("Failed to parse FFprobe output: {e}")))?;

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0);

    let audio = parsed
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| {
            let rate = s.sample_rate.and_then(|r| r.parse().ok()).unwrap_or(0);
            (rate, s.channels.unwrap_or(0))
        });

    Ok(MediaProbe { duration, audio })
}

/// Read `(sample_rate, channels, bits_per_sample, duration_secs)` from a WAV file.
pub fn read_wav_header(path: &Path) -> Result<(u32, u16, u16, f64)> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| SubtitlerError::Extraction(format!("Decoded audio is not valid WAV: {e}")))?;
    let spec = reader.spec();
    let duration = if spec.sample_rate > 0 {
        reader.duration() as f64 / spec.sample_rate as f64
    } else {
        0.0
    };
    Ok((spec.sample_rate, spec.channels, spec.bits_per_sample, duration))
}

/// Audio extraction through the ffmpeg/ffprobe command line tools.
pub struct FfmpegExtractor {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    pub fn check_availability(&self) -> Result<()> {
        check_ffmpeg(&self.ffmpeg_path)?;
        check_ffprobe(&self.ffprobe_path)
    }

    /// ffmpeg arguments that decode the first audio stream to 16-bit PCM at
    /// the source rate. Sources with more than two channels are downmixed
    /// to stereo.
    fn decode_args(&self, input: &Path, output: &Path, channels: u16) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().to_string(),
            "-map".into(),
            "0:a:0".into(),
            "-vn".into(),
            "-acodec".into(),
            "pcm_s16le".into(),
        ];
        if channels > 2 {
            args.extend(["-ac".to_string(), "2".to_string()]);
        }
        args.extend([
            "-f".to_string(),
            "wav".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, output: &Path) -> Result<AudioTrack> {
        if !video.exists() {
            return Err(SubtitlerError::FileNotFound(video.display().to_string()));
        }

        info!("Extracting audio from {}", video.display());

        let probe = probe_media(&self.ffprobe_path, video).await?;
        let (_, source_channels) = probe.audio.ok_or_else(|| {
            SubtitlerError::Extraction(format!("No audio stream in {}", video.display()))
        })?;

        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        // Deleted on drop, so neither an ffmpeg failure nor cancellation
        // leaves a half-written file behind.
        let staging = tempfile::Builder::new()
            .prefix(".audio-")
            .suffix(".wav.part")
            .tempfile_in(dir)?
            .into_temp_path();

        let args = self.decode_args(video, &staging, source_channels);
        debug!("Running {} {:?}", self.ffmpeg_path, args);

        let result = tokio::process::Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SubtitlerError::Extraction(format!("Failed to run FFmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SubtitlerError::Extraction(format!(
                "FFmpeg audio extraction failed: {}",
                stderr.trim()
            )));
        }

        let (sample_rate, channels, bits, wav_duration) = read_wav_header(&staging)?;
        if bits != 16 {
            return Err(SubtitlerError::Extraction(format!(
                "Expected 16-bit PCM, got {bits}-bit"
            )));
        }

        staging
            .persist(output)
            .map_err(|e| SubtitlerError::Extraction(format!("Failed to store audio: {}", e.error)))?;

        let duration = probe.duration.unwrap_or(wav_duration);
        info!(
            "Audio extracted to {} ({} Hz, {} ch, {:.1}s)",
            output.display(),
            sample_rate,
            channels,
            duration
        );

        Ok(AudioTrack {
            path: output.to_path_buf(),
            sample_rate,
            channels,
            duration,
        })
    }
}
