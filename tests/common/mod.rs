//! Fake pipeline components shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtitler::audio::{AudioExtractor, AudioTrack};
use subtitler::config::TranslationPolicy;
use subtitler::mux::Muxer;
use subtitler::transcribe::{Segment, Transcriber, Transcript};
use subtitler::translate::Translator;
use subtitler::{PipelineSettings, Result, SubtitlerError};

/// Write a silent 16-bit mono WAV of `seconds` length.
pub fn write_silent_wav(path: &Path, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(seconds * 16000.0) as usize {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// A video file that exists; the fakes never decode it.
pub fn fake_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"fake video container").unwrap();
    path
}

pub fn settings(output_dir: &Path, work_root: &Path) -> PipelineSettings {
    PipelineSettings {
        source_language: "en".to_string(),
        policy: TranslationPolicy::KeepSource,
        concurrency: 4,
        output_dir: output_dir.to_path_buf(),
        work_root: Some(work_root.to_path_buf()),
        show_progress: false,
    }
}

/// Every file below `dir`, recursively.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(files_under(&path));
            } else {
                found.push(path);
            }
        }
    }
    found
}

// ============================================================================
// Extractor
// ============================================================================

/// Writes a short silent WAV instead of decoding the video.
pub struct FakeExtractor {
    pub duration: f64,
    pub fail: bool,
    pub delay: Duration,
    /// Audio paths handed out, in call order.
    pub outputs: Mutex<Vec<PathBuf>>,
}

impl FakeExtractor {
    pub fn new(duration: f64) -> Arc<Self> {
        Arc::new(Self {
            duration,
            fail: false,
            delay: Duration::ZERO,
            outputs: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            duration: 0.0,
            fail: true,
            delay: Duration::ZERO,
            outputs: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(duration: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            fail: false,
            delay,
            outputs: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AudioExtractor for FakeExtractor {
    async fn extract(&self, video: &Path, output: &Path) -> Result<AudioTrack> {
        if self.fail {
            return Err(SubtitlerError::Extraction(format!(
                "No audio stream in {}",
                video.display()
            )));
        }
        write_silent_wav(output, self.duration.min(1.0));
        self.outputs.lock().unwrap().push(output.to_path_buf());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AudioTrack {
            path: output.to_path_buf(),
            sample_rate: 16000,
            channels: 1,
            duration: self.duration,
        })
    }
}

// ============================================================================
// Transcribers
// ============================================================================

pub struct FakeTranscriber {
    pub label: &'static str,
    pub segments: Vec<Segment>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeTranscriber {
    pub fn returning(label: &'static str, segments: Vec<Segment>) -> Arc<Self> {
        Arc::new(Self {
            label,
            segments,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            segments: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: &AudioTrack) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(audio.path.exists(), "audio must exist while transcribing");
        if self.fail {
            return Err(SubtitlerError::Transcription(format!(
                "{}: model weights missing",
                self.label
            )));
        }
        Ok(Transcript {
            segments: self.segments.clone(),
            language: Some("en".to_string()),
            engine: self.label.to_string(),
            degraded: false,
        })
    }

    fn name(&self) -> String {
        self.label.to_string()
    }
}

pub fn hello_segments() -> Vec<Segment> {
    vec![
        Segment::new(1.0, 3.5, "Hello"),
        Segment::new(4.0, 6.0, "Goodbye"),
    ]
}

// ============================================================================
// Translators
// ============================================================================

/// Looks translations up in a fixed table; unknown text fails.
pub struct DictionaryTranslator {
    pub entries: Vec<(&'static str, &'static str)>,
    pub calls: AtomicUsize,
}

impl DictionaryTranslator {
    pub fn arabic() -> Arc<Self> {
        Arc::new(Self {
            entries: vec![("Hello", "مرحبا"), ("Goodbye", "مع السلامة")],
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Translator for DictionaryTranslator {
    async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(target, "ar");
        self.entries
            .iter()
            .find(|(source, _)| *source == text)
            .map(|(_, translated)| translated.to_string())
            .ok_or_else(|| SubtitlerError::Translation(format!("no entry for '{}'", text)))
    }

    fn name(&self) -> &'static str {
        "dictionary"
    }
}

// ============================================================================
// Muxers
// ============================================================================

/// Copies the subtitle file into the output instead of transcoding.
pub struct FakeMuxer {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeMuxer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    async fn burn(&self, video: &Path, subtitles: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(video.exists());
        assert!(subtitles.exists(), "subtitles must exist before muxing");
        if self.fail {
            return Err(SubtitlerError::Mux(
                "Subtitle burn-in failed (exit status: 1): Unable to open font".to_string(),
            ));
        }
        let mut bytes = std::fs::read(video)?;
        bytes.extend(std::fs::read(subtitles)?);
        std::fs::write(output, bytes)?;
        Ok(())
    }
}
