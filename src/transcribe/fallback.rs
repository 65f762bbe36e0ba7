use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::audio::AudioTrack;
use crate::error::{Result, SubtitlerError};
use crate::transcribe::{Transcriber, Transcript};

/// Tries a primary recognizer and falls back to a second one on any error.
///
/// The substitution is invisible to the caller apart from
/// [`Transcript::degraded`] and a warning in the log.
pub struct FallbackTranscriber {
    primary: Arc<dyn Transcriber>,
    fallback: Arc<dyn Transcriber>,
}

impl FallbackTranscriber {
    pub fn new(primary: Arc<dyn Transcriber>, fallback: Arc<dyn Transcriber>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Transcriber for FallbackTranscriber {
    async fn transcribe(&self, audio: &AudioTrack) -> Result<Transcript> {
        let primary_error = match self.primary.transcribe(audio).await {
            Ok(transcript) => return Ok(transcript),
            // Cancellation is not an engine failure.
            Err(SubtitlerError::Cancelled) => return Err(SubtitlerError::Cancelled),
            Err(e) => e,
        };

        warn!(
            "Primary recognizer {} failed ({}), falling back to {}",
            self.primary.name(),
            primary_error,
            self.fallback.name()
        );

        match self.fallback.transcribe(audio).await {
            Ok(mut transcript) => {
                info!("Fallback recognizer {} succeeded", self.fallback.name());
                transcript.degraded = true;
                Ok(transcript)
            }
            Err(SubtitlerError::Cancelled) => Err(SubtitlerError::Cancelled),
            Err(fallback_error) => Err(SubtitlerError::Transcription(format!(
                "primary {}: {}; fallback {}: {}",
                self.primary.name(),
                primary_error,
                self.fallback.name(),
                fallback_error
            ))),
        }
    }

    fn name(&self) -> String {
        format!("{} (fallback {})", self.primary.name(), self.fallback.name())
    }
}
