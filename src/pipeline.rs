use crate::audio::{AudioExtractor, FfmpegExtractor};
use crate::config::{Config, TranslationPolicy};
use crate::error::{ErrorKind, Result, SubtitlerError};
use crate::job::{
    sanitize_file_name, ArtifactKind, CancelToken, Job, JobId, JobRequest, JobSource,
    JobState,
};
use crate::mux::{FfmpegMuxer, Muxer};
use crate::subtitle::{build_track, write_srt};
use crate::transcribe::{shared_transcriber, Transcriber};
use crate::translate::{translate_segments, LibreTranslator, TranslateOptions, Translator};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Per-process settings shared by every job.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Language spoken in the videos, or `auto`.
    pub source_language: String,
    /// What a failed translation call does to the job.
    pub policy: TranslationPolicy,
    /// Concurrent translation calls per job.
    pub concurrency: usize,
    /// Where finished subtitle files and videos go.
    pub output_dir: PathBuf,
    /// Parent of the scratch directory (system temp dir if unset).
    pub work_root: Option<PathBuf>,
    /// Show progress bars.
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_language: config.translator.source_language.clone(),
            policy: config.translator.policy,
            concurrency: config.translator.concurrency,
            output_dir: config.output.dir.clone(),
            work_root: config.output.work_root.clone(),
            show_progress: true,
        }
    }
}

/// Statistics from one job.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total time taken for the entire job.
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub transcription_time: Duration,
    pub translation_time: Duration,
    pub subtitle_time: Duration,
    /// Only set when a burned video was produced.
    pub mux_time: Option<Duration>,
    /// Duration of the source audio.
    pub audio_duration: Duration,
    /// Segments returned by the recognizer.
    pub segments: usize,
    /// Cues written to the subtitle file.
    pub cues: usize,
    /// Recognizer that produced the transcript.
    pub engine: String,
    /// The fallback recognizer had to be used.
    pub degraded: bool,
    /// Segments that kept their source text after a failed translation.
    pub translation_fallbacks: usize,
    /// Language reported by the recognizer.
    pub detected_language: Option<String>,
}

/// Artifacts of a completed job. The files stay on disk until the caller
/// calls [`JobOutput::discard`] or removes them itself.
#[derive(Debug)]
pub struct JobOutput {
    pub job_id: JobId,
    pub subtitle_path: Option<PathBuf>,
    pub video_path: Option<PathBuf>,
    pub stats: PipelineStats,
}

impl JobOutput {
    /// Remove the retained outputs once they have been handed over.
    pub fn discard(self) -> Result<()> {
        for path in self.subtitle_path.iter().chain(self.video_path.iter()) {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Discarded {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// A job that ended in [`JobState::Failed`]. Its artifacts are already
/// removed.
#[derive(Error, Debug)]
#[error("Job {job_id} failed while {state}: {error}")]
pub struct JobFailure {
    pub job_id: JobId,
    /// State the job was in when the error occurred.
    pub state: JobState,
    #[source]
    pub error: SubtitlerError,
}

/// What a request shell returns to its caller on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub job_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn detail(&self) -> FailureDetail {
        FailureDetail {
            job_id: self.job_id.to_string(),
            kind: self.kind(),
            message: self.error.to_string(),
        }
    }
}

/// Blame plumbing errors (I/O, HTTP, JSON) on the stage they happened in.
fn attribute_to_stage(error: SubtitlerError, state: JobState) -> SubtitlerError {
    if error.kind() != ErrorKind::InternalError || matches!(error, SubtitlerError::Config(_)) {
        return error;
    }
    let message = error.to_string();
    match state {
        JobState::ExtractingAudio => SubtitlerError::Extraction(message),
        JobState::Transcribing => SubtitlerError::Transcription(message),
        JobState::Translating => SubtitlerError::Translation(message),
        JobState::BuildingSubtitles => SubtitlerError::SubtitleBuild(message),
        JobState::Muxing => SubtitlerError::Mux(message),
        _ => error,
    }
}

/// Runs jobs through extraction, transcription, translation, subtitle
/// building and the optional burn-in.
///
/// Engines are shared by all jobs; every file a job writes is scoped by its
/// id, so jobs can run concurrently on one orchestrator.
pub struct PipelineOrchestrator {
    settings: PipelineSettings,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    muxer: Arc<dyn Muxer>,
    work_root: TempDir,
}

impl PipelineOrchestrator {
    pub fn new(
        settings: PipelineSettings,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
        muxer: Arc<dyn Muxer>,
    ) -> Result<Self> {
        if settings.concurrency == 0 {
            return Err(SubtitlerError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        std::fs::create_dir_all(&settings.output_dir)?;

        // Process-scoped scratch space, removed when the orchestrator drops.
        let mut builder = tempfile::Builder::new();
        builder.prefix("subtitler-");
        let work_root = match settings.work_root {
            Some(ref parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!("Using work directory: {:?}", work_root.path());

        Ok(Self {
            settings,
            extractor,
            transcriber,
            translator,
            muxer,
            work_root,
        })
    }

    /// Build the production pipeline: ffmpeg, the shared recognizer pair and
    /// the HTTP translator.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let extractor = FfmpegExtractor::from_config(&config.media);
        extractor.check_availability()?;

        let transcriber = shared_transcriber(&config.transcriber)?;
        let translator = LibreTranslator::from_config(&config.translator)?;
        let muxer = FfmpegMuxer::from_config(&config.media);

        Self::new(
            PipelineSettings::from_config(config),
            Arc::new(extractor),
            transcriber,
            Arc::new(translator),
            Arc::new(muxer),
        )
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.settings.show_progress = show;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Directory holding the per-job workspaces.
    pub fn work_root(&self) -> &Path {
        self.work_root.path()
    }

    pub async fn run(&self, request: JobRequest) -> std::result::Result<JobOutput, JobFailure> {
        self.run_with_cancel(request, &CancelToken::new()).await
    }

    /// Run one job to completion, failure or cancellation.
    ///
    /// On failure every artifact the job created is removed before the
    /// error is returned. On success only the requested outputs remain.
    pub async fn run_with_cancel(
        &self,
        request: JobRequest,
        token: &CancelToken,
    ) -> std::result::Result<JobOutput, JobFailure> {
        let job_id = JobId::new();
        let mut job = Job::create(job_id, self.work_root(), &request.target_language, request.options)
            .map_err(|error| JobFailure {
                job_id,
                state: JobState::Created,
                error,
            })?;

        info!("Job {} started", job.id);

        match self.execute(&mut job, request, token).await {
            Ok(output) => match job.complete() {
                Ok(()) => {
                    info!("Job {} completed", job.id);
                    Ok(output)
                }
                Err(error) => {
                    let state = job.state();
                    job.fail();
                    Err(JobFailure {
                        job_id: job.id,
                        state,
                        error,
                    })
                }
            },
            Err(error) => {
                let state = job.state();
                let error = attribute_to_stage(error, state);
                if matches!(error, SubtitlerError::Cancelled) {
                    warn!("Job {} cancelled while {}, cleaning up", job.id, state);
                } else {
                    warn!("Job {} failed while {}: {}", job.id, state, error);
                }
                job.fail();
                Err(JobFailure {
                    job_id: job.id,
                    state,
                    error,
                })
            }
        }
    }

    async fn execute(
        &self,
        job: &mut Job,
        request: JobRequest,
        token: &CancelToken,
    ) -> Result<JobOutput> {
        let start_time = Instant::now();
        request.validate()?;

        let options = job.options;
        let target_language = job.target_language.clone();
        let stem = request.source.stem();

        let video_path = match request.source {
            JobSource::Path(path) => path,
            JobSource::Upload { file_name, bytes } => {
                let name = sanitize_file_name(&file_name);
                let extension = Path::new(&name)
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| "bin".to_string());
                let path = job.scratch_path("upload", &extension);
                job.track(&path, ArtifactKind::Upload, false);
                tokio::fs::write(&path, &bytes).await?;
                debug!("Job {}: stored upload {} ({} bytes)", job.id, name, bytes.len());
                path
            }
        };

        let mut stats = PipelineStats::default();

        // ═══════════════════════════════════════════════════════════════════
        // Stage 1: Audio Extraction
        // ═══════════════════════════════════════════════════════════════════
        job.advance(JobState::ExtractingAudio)?;
        info!("Stage 1: Extracting audio from {:?}", video_path);
        let stage_start = Instant::now();

        let audio_path = job.scratch_path("audio", "wav");
        job.track(&audio_path, ArtifactKind::Audio, false);
        let audio = token
            .run(self.extractor.extract(&video_path, &audio_path))
            .await?;

        stats.extraction_time = stage_start.elapsed();
        stats.audio_duration = Duration::try_from_secs_f64(audio.duration).unwrap_or_default();

        // ═══════════════════════════════════════════════════════════════════
        // Stage 2: Transcription
        // ═══════════════════════════════════════════════════════════════════
        job.advance(JobState::Transcribing)?;
        info!("Stage 2: Transcribing with {}", self.transcriber.name());
        let stage_start = Instant::now();

        let transcript = token.run(self.transcriber.transcribe(&audio)).await?;

        stats.transcription_time = stage_start.elapsed();
        stats.segments = transcript.segments.len();
        stats.engine = transcript.engine.clone();
        stats.degraded = transcript.degraded;
        stats.detected_language = transcript.language.clone();
        info!(
            "Transcription complete: {} segments in {:.2}s",
            stats.segments,
            stats.transcription_time.as_secs_f64()
        );

        // ═══════════════════════════════════════════════════════════════════
        // Stage 3: Translation
        // ═══════════════════════════════════════════════════════════════════
        job.advance(JobState::Translating)?;
        info!("Stage 3: Translating to {}", target_language);
        let stage_start = Instant::now();

        let outcome = token
            .run(translate_segments(
                self.translator.clone(),
                transcript.segments,
                TranslateOptions {
                    source_lang: &self.settings.source_language,
                    target_lang: &target_language,
                    policy: self.settings.policy,
                    concurrency: self.settings.concurrency,
                    show_progress: self.settings.show_progress,
                },
            ))
            .await?;

        stats.translation_time = stage_start.elapsed();
        stats.translation_fallbacks = outcome.fallback_count;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 4: Subtitle Generation
        // ═══════════════════════════════════════════════════════════════════
        job.advance(JobState::BuildingSubtitles)?;
        info!("Stage 4: Building subtitles");
        let stage_start = Instant::now();

        let track = build_track(&outcome.segments);
        let subtitle_path = if options.produce_subtitle_file {
            self.settings
                .output_dir
                .join(format!("{}-{}.{}.srt", stem, job.id.short(), target_language))
        } else {
            job.scratch_path("subtitles", "srt")
        };
        job.track(
            &subtitle_path,
            ArtifactKind::Subtitle,
            options.produce_subtitle_file,
        );
        token.run(async { write_srt(&track, &subtitle_path) }).await?;

        stats.subtitle_time = stage_start.elapsed();
        stats.cues = track.len();
        info!("Wrote {} cues to {:?}", stats.cues, subtitle_path);

        // ═══════════════════════════════════════════════════════════════════
        // Stage 5: Burn-in (optional)
        // ═══════════════════════════════════════════════════════════════════
        let video_path = if options.produce_burned_video {
            job.advance(JobState::Muxing)?;
            info!("Stage 5: Burning subtitles into video");
            let stage_start = Instant::now();

            let output = self
                .settings
                .output_dir
                .join(format!("{}-{}.{}.mp4", stem, job.id.short(), target_language));
            job.track(&output, ArtifactKind::Video, true);
            token
                .run(self.muxer.burn(&video_path, &subtitle_path, &output))
                .await?;

            stats.mux_time = Some(stage_start.elapsed());
            Some(output)
        } else {
            None
        };

        stats.total_time = start_time.elapsed();

        Ok(JobOutput {
            job_id: job.id,
            subtitle_path: options.produce_subtitle_file.then_some(subtitle_path),
            video_path,
            stats,
        })
    }
}

/// Print a summary of a completed job.
pub fn print_summary(output: &JobOutput) {
    let stats = &output.stats;
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                   Subtitle Generation Complete                ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Job:        {}", output.job_id);
    if let Some(ref path) = output.subtitle_path {
        println!("  Subtitles:  {}", style(path.display()).cyan());
    }
    if let Some(ref path) = output.video_path {
        println!("  Video:      {}", style(path.display()).cyan());
    }
    println!("  Cues:       {} (from {} segments)", stats.cues, stats.segments);
    println!("  Duration:   {:.1}s audio", stats.audio_duration.as_secs_f64());
    if stats.degraded {
        println!("  Recognizer: {} {}", stats.engine, style("(fallback)").yellow());
    } else {
        println!("  Recognizer: {}", stats.engine);
    }
    if stats.translation_fallbacks > 0 {
        println!(
            "  {} {} segment(s) left untranslated",
            style("!").yellow(),
            stats.translation_fallbacks
        );
    }
    println!();
    println!("  Timing:");
    println!("    Extract:     {:.2}s", stats.extraction_time.as_secs_f64());
    println!("    Transcribe:  {:.2}s", stats.transcription_time.as_secs_f64());
    println!("    Translate:   {:.2}s", stats.translation_time.as_secs_f64());
    println!("    Subtitles:   {:.2}s", stats.subtitle_time.as_secs_f64());
    if let Some(mux_time) = stats.mux_time {
        println!("    Burn-in:     {:.2}s", mux_time.as_secs_f64());
    }
    println!("    Total:       {:.2}s", stats.total_time.as_secs_f64());
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
