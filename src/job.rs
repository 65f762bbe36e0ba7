//! One pipeline execution: identity, lifecycle state and the files it owns.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SubtitlerError};

/// Unique identifier of a job, used to scope every file it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, used in output file names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Lifecycle of a job. Transitions only move forward; `Failed` is reachable
/// from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    ExtractingAudio,
    Transcribing,
    Translating,
    BuildingSubtitles,
    Muxing,
    Completed,
    Failed,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            JobState::Created => 0,
            JobState::ExtractingAudio => 1,
            JobState::Transcribing => 2,
            JobState::Translating => 3,
            JobState::BuildingSubtitles => 4,
            JobState::Muxing => 5,
            JobState::Completed => 6,
            JobState::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobState::Failed => true,
            JobState::Completed => matches!(self, JobState::BuildingSubtitles | JobState::Muxing),
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::ExtractingAudio => "extracting_audio",
            JobState::Transcribing => "transcribing",
            JobState::Translating => "translating",
            JobState::BuildingSubtitles => "building_subtitles",
            JobState::Muxing => "muxing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which artifacts the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub produce_subtitle_file: bool,
    pub produce_burned_video: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            produce_subtitle_file: true,
            produce_burned_video: false,
        }
    }
}

/// Where the source video comes from.
#[derive(Debug, Clone)]
pub enum JobSource {
    /// A file that already exists and belongs to the caller. Never deleted.
    Path(PathBuf),
    /// Uploaded bytes; a working copy is written into the job workspace.
    Upload { file_name: String, bytes: Vec<u8> },
}

impl JobSource {
    /// Stem used to name the outputs.
    pub fn stem(&self) -> String {
        let name = match self {
            JobSource::Path(path) => path.file_stem().map(|s| s.to_string_lossy().to_string()),
            JobSource::Upload { file_name, .. } => Path::new(&sanitize_file_name(file_name))
                .file_stem()
                .map(|s| s.to_string_lossy().to_string()),
        };
        name.filter(|s| !s.is_empty()).unwrap_or_else(|| "video".to_string())
    }
}

/// Everything needed to start a job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: JobSource,
    pub target_language: String,
    pub options: JobOptions,
}

impl JobRequest {
    pub fn new(source: JobSource, target_language: impl Into<String>, options: JobOptions) -> Self {
        Self {
            source,
            target_language: target_language.into(),
            options,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.options.produce_subtitle_file && !self.options.produce_burned_video {
            return Err(SubtitlerError::InvalidRequest(
                "Nothing to produce: request a subtitle file, a burned video, or both".to_string(),
            ));
        }
        let lang = self.target_language.trim();
        if lang.is_empty() || !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(SubtitlerError::InvalidRequest(format!(
                "Invalid target language code: '{}'",
                self.target_language
            )));
        }
        match &self.source {
            JobSource::Path(path) if !path.is_file() => {
                Err(SubtitlerError::FileNotFound(path.display().to_string()))
            }
            JobSource::Upload { bytes, .. } if bytes.is_empty() => Err(
                SubtitlerError::InvalidRequest("Uploaded file is empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Strip any directory components from a client supplied file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Working copy of uploaded bytes.
    Upload,
    /// Extracted PCM audio.
    Audio,
    /// Subtitle file, either final or only an input to the muxer.
    Subtitle,
    /// Finished burned video.
    Video,
}

#[derive(Debug, Clone)]
struct Artifact {
    path: PathBuf,
    kind: ArtifactKind,
    /// Survives a successful job because the caller asked for it.
    deliverable: bool,
}

/// A job in flight. Owns a workspace directory and every file registered
/// with it; dropping an unfinished job removes them.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub target_language: String,
    pub options: JobOptions,
    state: JobState,
    workspace: PathBuf,
    artifacts: Vec<Artifact>,
    finished: bool,
}

impl Job {
    /// Create job `id` with its own workspace under `work_root`.
    pub fn create(
        id: JobId,
        work_root: &Path,
        target_language: &str,
        options: JobOptions,
    ) -> Result<Self> {
        let workspace = work_root.join(format!("job-{}", id));
        std::fs::create_dir_all(&workspace).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Cannot create workspace {}: {}", workspace.display(), e),
            )
        })?;
        debug!("Job {} workspace: {}", id, workspace.display());

        Ok(Self {
            id,
            target_language: target_language.trim().to_string(),
            options,
            state: JobState::Created,
            workspace,
            artifacts: Vec::new(),
            finished: false,
        })
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Job-scoped path inside the workspace, e.g. `audio-<id>.wav`.
    pub fn scratch_path(&self, prefix: &str, extension: &str) -> PathBuf {
        self.workspace.join(format!("{}-{}.{}", prefix, self.id, extension))
    }

    pub fn advance(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(SubtitlerError::InvalidRequest(format!(
                "Illegal job transition {} -> {}",
                self.state, next
            )));
        }
        debug!("Job {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record a file the job is responsible for.
    pub fn track(&mut self, path: impl Into<PathBuf>, kind: ArtifactKind, deliverable: bool) {
        self.artifacts.push(Artifact {
            path: path.into(),
            kind,
            deliverable,
        });
    }

    /// Mark the job completed and remove everything except deliverables.
    pub fn complete(&mut self) -> Result<()> {
        self.advance(JobState::Completed)?;
        self.release(true);
        Ok(())
    }

    /// Mark the job failed and remove every artifact it created.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            debug!("Job {}: {} -> {}", self.id, self.state, JobState::Failed);
            self.state = JobState::Failed;
        }
        self.release(false);
    }

    fn release(&mut self, keep_deliverables: bool) {
        for artifact in &self.artifacts {
            if keep_deliverables && artifact.deliverable {
                continue;
            }
            remove_file_quietly(&artifact.path, artifact.kind);
        }
        self.artifacts.retain(|a| keep_deliverables && a.deliverable);

        if let Err(e) = std::fs::remove_dir_all(&self.workspace) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.workspace.display(), e);
            }
        }
        self.finished = true;
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Job {} dropped in state {}, cleaning up", self.id, self.state);
            self.fail();
        }
    }
}

fn remove_file_quietly(path: &Path, kind: ArtifactKind) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {:?} artifact {}", kind, path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Cooperative cancellation shared between a job and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread, including a
    /// signal handler thread.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run `future` unless cancellation wins the race. The losing future is
    /// dropped, which kills any child process it spawned with
    /// `kill_on_drop`.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(SubtitlerError::Cancelled);
        }
        tokio::select! {
            result = future => result,
            _ = self.cancelled() => Err(SubtitlerError::Cancelled),
        }
    }
}
