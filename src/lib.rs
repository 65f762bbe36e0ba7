pub mod audio;
pub mod config;
pub mod error;
pub mod job;
pub mod mux;
pub mod pipeline;
pub mod subtitle;
pub mod timecode;
pub mod transcribe;
pub mod translate;

pub use config::Config;
pub use error::{ErrorKind, Result, SubtitlerError};
pub use job::{CancelToken, JobId, JobOptions, JobRequest, JobSource, JobState};
pub use pipeline::{
    print_summary, FailureDetail, JobFailure, JobOutput, PipelineOrchestrator, PipelineSettings,
    PipelineStats,
};
pub use timecode::format_timecode;
