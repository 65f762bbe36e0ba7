//! Process-wide recognizer instance.
//!
//! Engines can be expensive to set up (model weights, HTTP connection
//! pools), so the pipeline shares one read-only [`FallbackTranscriber`]
//! across every job instead of building one per job.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{EngineConfig, TranscriberConfig};
use crate::error::Result;
use crate::transcribe::{FallbackTranscriber, Transcriber, WhisperClient, WhisperCppTranscriber};

static SHARED: OnceLock<(TranscriberConfig, Arc<FallbackTranscriber>)> = OnceLock::new();

/// Build a single recognition engine from its configuration.
pub fn create_engine(config: &EngineConfig) -> Result<Arc<dyn Transcriber>> {
    let engine: Arc<dyn Transcriber> = match config {
        EngineConfig::Http {
            endpoint,
            model,
            api_key,
            language,
            max_retries,
            timeout_secs,
        } => Arc::new(
            WhisperClient::new(endpoint.as_str(), model.as_str())
                .with_api_key(api_key.clone())
                .with_language(language.clone())
                .with_retries(*max_retries)
                .with_timeout(Duration::from_secs(*timeout_secs))?,
        ),
        EngineConfig::WhisperCpp {
            binary_path,
            model_path,
            language,
            device,
            ffmpeg_path,
        } => Arc::new(
            WhisperCppTranscriber::new(binary_path.as_str(), model_path.clone())
                .with_language(language.clone())
                .with_device(*device)
                .with_ffmpeg(ffmpeg_path.as_str()),
        ),
    };
    Ok(engine)
}

/// Build the primary/fallback pair without caching it.
pub fn build_transcriber(config: &TranscriberConfig) -> Result<FallbackTranscriber> {
    Ok(FallbackTranscriber::new(
        create_engine(&config.primary)?,
        create_engine(&config.fallback)?,
    ))
}

/// The process-wide transcriber, created on first use.
///
/// Later calls return the same instance. A different configuration passed
/// after initialisation is ignored with a warning.
pub fn shared_transcriber(config: &TranscriberConfig) -> Result<Arc<FallbackTranscriber>> {
    if let Some((existing, transcriber)) = SHARED.get() {
        if existing != config {
            warn!("Recognizer already initialised; ignoring changed configuration");
        }
        return Ok(transcriber.clone());
    }

    let transcriber = Arc::new(build_transcriber(config)?);
    // Another thread may have won the race; keep whichever got there first.
    let (_, shared) = SHARED.get_or_init(|| {
        info!(
            "Recognizer ready: {} with fallback {}",
            config.primary.label(),
            config.fallback.label()
        );
        (config.clone(), transcriber)
    });
    Ok(shared.clone())
}
