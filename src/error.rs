use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubtitlerError {
    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Subtitle build failed: {0}")]
    SubtitleBuild(String),

    #[error("Muxing failed: {0}")]
    Mux(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification surfaced to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExtractionError,
    TranscriptionError,
    TranslationError,
    SubtitleBuildError,
    MuxError,
    Cancelled,
    InvalidRequest,
    InternalError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ExtractionError => "extraction_error",
            ErrorKind::TranscriptionError => "transcription_error",
            ErrorKind::TranslationError => "translation_error",
            ErrorKind::SubtitleBuildError => "subtitle_build_error",
            ErrorKind::MuxError => "mux_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InternalError => "internal_error",
        };
        f.write_str(name)
    }
}

impl SubtitlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubtitlerError::Extraction(_) => ErrorKind::ExtractionError,
            SubtitlerError::Transcription(_) => ErrorKind::TranscriptionError,
            SubtitlerError::Translation(_) => ErrorKind::TranslationError,
            SubtitlerError::SubtitleBuild(_) => ErrorKind::SubtitleBuildError,
            SubtitlerError::Mux(_) => ErrorKind::MuxError,
            SubtitlerError::Cancelled => ErrorKind::Cancelled,
            SubtitlerError::InvalidRequest(_) | SubtitlerError::FileNotFound(_) => {
                ErrorKind::InvalidRequest
            }
            SubtitlerError::Config(_)
            | SubtitlerError::Io(_)
            | SubtitlerError::Http(_)
            | SubtitlerError::Json(_) => ErrorKind::InternalError,
        }
    }
}

pub type Result<T> = std::result::Result<T, SubtitlerError>;
