use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::audio::AudioTrack;
use crate::config::Device;
use crate::error::{Result, SubtitlerError};
use crate::transcribe::{normalize_segments, RawSegment, Transcriber, Transcript};

/// Sample rate whisper.cpp models are trained on.
const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Local recognizer driving the whisper.cpp command line (`whisper-cli`).
pub struct WhisperCppTranscriber {
    binary_path: String,
    model_path: PathBuf,
    language: Option<String>,
    device: Device,
    ffmpeg_path: String,
}

impl WhisperCppTranscriber {
    pub fn new(binary_path: impl Into<String>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            language: None,
            device: Device::Auto,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg_path: impl Into<String>) -> Self {
        self.ffmpeg_path = ffmpeg_path.into();
        self
    }

    /// Resample to 16 kHz mono, which is all whisper.cpp accepts.
    async fn resample(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.ffmpeg_path)
            .arg("-nostdin")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg(WHISPER_SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg("1")
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SubtitlerError::Transcription(format!("Failed to run FFmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SubtitlerError::Transcription(format!(
                "Resampling for whisper.cpp failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn command_args(&self, audio: &Path, output_base: &Path) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            self.model_path.to_string_lossy().to_string(),
            "-f".to_string(),
            audio.to_string_lossy().to_string(),
            "-oj".to_string(),
            "-of".to_string(),
            output_base.to_string_lossy().to_string(),
        ];
        if let Some(ref lang) = self.language {
            args.extend(["-l".to_string(), lang.clone()]);
        }
        // whisper.cpp uses the GPU when built with it; only opt out explicitly.
        if self.device == Device::Cpu {
            args.push("-ng".to_string());
        }
        args
    }
}

#[derive(Debug, Deserialize)]
struct WhisperCppOutput {
    #[serde(default)]
    result: Option<WhisperCppResult>,
    transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperCppResult {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperCppSegment {
    offsets: WhisperCppOffsets,
    text: String,
}

/// Segment bounds in milliseconds.
#[derive(Debug, Deserialize)]
struct WhisperCppOffsets {
    from: i64,
    to: i64,
}

fn parse_output(json: &str) -> Result<(Vec<RawSegment>, Option<String>)> {
    let output: WhisperCppOutput = serde_json::from_str(json).map_err(|e| {
        SubtitlerError::Transcription(format!("Malformed whisper.cpp output: {e}"))
    })?;

    let raw = output
        .transcription
        .into_iter()
        .map(|seg| RawSegment {
            start: Some(seg.offsets.from as f64 / 1000.0),
            end: Some(seg.offsets.to as f64 / 1000.0),
            text: seg.text,
        })
        .collect();

    Ok((raw, output.result.and_then(|r| r.language)))
}

#[async_trait]
impl Transcriber for WhisperCppTranscriber {
    async fn transcribe(&self, audio: &AudioTrack) -> Result<Transcript> {
        if !self.model_path.exists() {
            return Err(SubtitlerError::Transcription(format!(
                "whisper.cpp model not found: {}",
                self.model_path.display()
            )));
        }

        // Scratch space for the resampled audio and the JSON result. Removed
        // on drop, including when the job is cancelled mid-run.
        let scratch = tempfile::Builder::new()
            .prefix(".whisper-")
            .tempdir_in(audio.path.parent().unwrap_or_else(|| Path::new(".")))?;
        let resampled = scratch.path().join("audio-16k.wav");
        let output_base = scratch.path().join("transcript");

        self.resample(&audio.path, &resampled).await?;

        let args = self.command_args(&resampled, &output_base);
        info!("Running whisper.cpp with {}", self.model_path.display());
        debug!("Running {} {:?}", self.binary_path, args);

        let output = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SubtitlerError::Transcription(format!(
                    "Failed to run {}: {e}",
                    self.binary_path
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubtitlerError::Transcription(format!(
                "whisper.cpp failed: {}",
                stderr.trim()
            )));
        }

        let json = tokio::fs::read_to_string(output_base.with_extension("json"))
            .await
            .map_err(|e| {
                SubtitlerError::Transcription(format!("whisper.cpp wrote no transcript: {e}"))
            })?;
        let (raw, language) = parse_output(&json)?;
        let segments = normalize_segments(raw, audio.duration);

        debug!("{} returned {} segments", self.name(), segments.len());

        Ok(Transcript {
            segments,
            language,
            engine: self.name(),
            degraded: false,
        })
    }

    fn name(&self) -> String {
        format!(
            "whisper-cpp:{}",
            self.model_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        let json = r#"{
            "systeminfo": "AVX = 1",
            "result": {"language": "en"},
            "transcription": [
                {"timestamps": {"from": "00:00:00,000", "to": "00:00:02,500"},
                 "offsets": {"from": 0, "to": 2500}, "text": " Hello there."},
                {"timestamps": {"from": "00:00:02,500", "to": "00:00:04,120"},
                 "offsets": {"from": 2500, "to": 4120}, "text": " General Kenobi."}
            ]
        }"#;
        let (raw, language) = parse_output(json).unwrap();
        assert_eq!(language.as_deref(), Some("en"));
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[1].start, Some(2.5));
        assert_eq!(raw[1].end, Some(4.12));
    }

    #[test]
    fn test_parse_output_malformed() {
        let result = parse_output(r#"{"result": {}}"#);
        assert!(matches!(result, Err(SubtitlerError::Transcription(_))));
    }

    #[test]
    fn test_command_args() {
        let engine = WhisperCppTranscriber::new("whisper-cli", "/models/ggml-base.bin")
            .with_language(Some("en".to_string()))
            .with_device(Device::Cpu);
        let args = engine.command_args(Path::new("/tmp/a.wav"), Path::new("/tmp/out"));
        assert_eq!(&args[..2], ["-m", "/models/ggml-base.bin"]);
        assert!(args.contains(&"-oj".to_string()));
        assert!(args.windows(2).any(|w| w == ["-l", "en"]));
        assert_eq!(args.last().unwrap(), "-ng");

        let gpu = WhisperCppTranscriber::new("whisper-cli", "m.bin").with_device(Device::Gpu);
        assert!(!gpu
            .command_args(Path::new("a.wav"), Path::new("out"))
            .contains(&"-ng".to_string()));
    }

    #[test]
    fn test_name() {
        let engine = WhisperCppTranscriber::new("whisper-cli", "/models/ggml-base.bin");
        assert_eq!(engine.name(), "whisper-cpp:ggml-base.bin");
    }

    #[tokio::test]
    async fn test_missing_model_is_transcription_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = WhisperCppTranscriber::new("whisper-cli", dir.path().join("nope.bin"));
        let audio = AudioTrack {
            path: dir.path().join("a.wav"),
            sample_rate: 16000,
            channels: 1,
            duration: 1.0,
        };
        let result = engine.transcribe(&audio).await;
        assert!(matches!(result, Err(SubtitlerError::Transcription(_))));
    }
}
