use crate::audio::AudioTrack;
use crate::error::{Result, SubtitlerError};
use crate::transcribe::{normalize_segments, RawSegment, Transcriber, Transcript};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// Path of the transcription endpoint below the server's base URL.
const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 500;

/// Characters of a response body shown in debug logs.
const LOG_EXCERPT_CHARS: usize = 500;

/// Client for an OpenAI-compatible speech recognition server
/// (faster-whisper-server, a transformers pipeline behind a shim, the
/// OpenAI API itself).
pub struct WhisperClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    language: Option<String>,
    max_retries: u32,
}

impl WhisperClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            language: None,
            max_retries: 0,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Set the source language (ISO 639-1 code).
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Build the multipart form for the API request.
    async fn build_form(&self, audio_path: &Path) -> Result<Form> {
        let file_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("audio/wav")?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        Ok(form)
    }

    /// Make the API request (form is consumed, so no retries at this level).
    async fn call_api(&self, form: Form) -> std::result::Result<VerboseResponse, CallError> {
        let url = format!("{}{}", self.base_url, TRANSCRIPTIONS_PATH);
        let mut request = self.client.post(&url).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            CallError::transient(format!("Recognizer unreachable: {e}"))
        })?;

        let status = response.status();
        debug!("Recognizer response status: {}", status);
        let body = response
            .text()
            .await
            .map_err(|e| CallError::transient(format!("Failed to read recognizer response: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|api_error| api_error.error.message)
                .unwrap_or(body);
            let message = format!("Recognizer error ({}): {}", status, detail);
            // Rate limits and server faults may clear up; other client errors will not.
            let retryable = status.is_server_error()
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT;
            return Err(CallError {
                error: SubtitlerError::Transcription(message),
                retryable,
            });
        }

        debug!("Recognizer response: {}", log_excerpt(&body, LOG_EXCERPT_CHARS));
        serde_json::from_str(&body).map_err(|e| CallError {
            error: SubtitlerError::Transcription(format!("Malformed recognizer response: {e}")),
            retryable: false,
        })
    }

    /// Transcribe with retry logic - rebuilds form on each attempt.
    async fn transcribe_with_retry(&self, audio: &AudioTrack) -> Result<VerboseResponse> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let form = self.build_form(&audio.path).await?;

            match self.call_api(form).await {
                Ok(response) => return Ok(response),
                Err(CallError { error, retryable: false }) => return Err(error),
                Err(CallError { error, .. }) => {
                    warn!("Recognizer attempt {} failed: {}", attempt + 1, error);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| SubtitlerError::Transcription("Unknown error".to_string())))
    }
}

/// A failed recognizer call and whether repeating it could help.
#[derive(Debug)]
struct CallError {
    error: SubtitlerError,
    retryable: bool,
}

impl CallError {
    fn transient(message: String) -> Self {
        Self {
            error: SubtitlerError::Transcription(message),
            retryable: true,
        }
    }
}

/// At most `max_chars` characters of `text`, cut on a character boundary.
fn log_excerpt(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| &text[..end])
}

/// Convert a verbose_json response into raw segments.
///
/// Servers disagree on the shape: most return `segments` with `start`/`end`,
/// transformers-style shims return `chunks` with a `[start, end]` timestamp
/// pair where the final end may be null.
fn raw_segments(response: VerboseResponse) -> Result<Vec<RawSegment>> {
    if let Some(segments) = response.segments {
        return Ok(segments
            .into_iter()
            .map(|s| RawSegment {
                start: s.start,
                end: s.end,
                text: s.text,
            })
            .collect());
    }

    if let Some(chunks) = response.chunks {
        return Ok(chunks
            .into_iter()
            .map(|c| RawSegment {
                start: c.timestamp.0,
                end: c.timestamp.1,
                text: c.text,
            })
            .collect());
    }

    match response.text {
        Some(text) if !text.trim().is_empty() => Err(SubtitlerError::Transcription(
            "Recognizer returned text without timestamps".to_string(),
        )),
        // Silence: no text, no segments.
        _ => Ok(Vec::new()),
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: &AudioTrack) -> Result<Transcript> {
        debug!(
            "Transcribing {} with {}",
            audio.path.display(),
            self.name()
        );

        let response = self.transcribe_with_retry(audio).await?;
        let language = response.language.clone();
        let segments = normalize_segments(raw_segments(response)?, audio.duration);

        debug!("{} returned {} segments", self.name(), segments.len());

        Ok(Transcript {
            segments,
            language,
            engine: self.name(),
            degraded: false,
        })
    }

    fn name(&self) -> String {
        format!("http:{}", self.model)
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct VerboseResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    segments: Option<Vec<VerboseSegment>>,
    #[serde(default)]
    chunks: Option<Vec<PipelineChunk>>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: Option<f64>,
    end: Option<f64>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct PipelineChunk {
    timestamp: (Option<f64>, Option<f64>),
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
