use crate::error::{Result, SubtitlerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Accelerator a local recognizer should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu => write!(f, "gpu"),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "gpu" | "cuda" => Ok(Device::Gpu),
            _ => Err(format!("Unknown device: {}. Use 'auto', 'cpu' or 'gpu'", s)),
        }
    }
}

/// What to do when a single translation call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationPolicy {
    /// Emit the untranslated source text for that segment and carry on.
    #[default]
    KeepSource,
    /// Fail the whole job.
    Abort,
}

impl std::fmt::Display for TranslationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationPolicy::KeepSource => write!(f, "keep-source"),
            TranslationPolicy::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for TranslationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep-source" | "keep_source" => Ok(TranslationPolicy::KeepSource),
            "abort" => Ok(TranslationPolicy::Abort),
            _ => Err(format!(
                "Unknown translation policy: {}. Use 'keep-source' or 'abort'",
                s
            )),
        }
    }
}

/// A speech recognition engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "kebab-case")]
pub enum EngineConfig {
    /// OpenAI-compatible `/v1/audio/transcriptions` server.
    Http {
        endpoint: String,
        model: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        language: Option<String>,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        #[serde(default = "default_recognizer_timeout")]
        timeout_secs: u64,
    },
    /// Local whisper.cpp command line.
    WhisperCpp {
        binary_path: String,
        model_path: PathBuf,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        device: Device,
        #[serde(default = "default_ffmpeg")]
        ffmpeg_path: String,
    },
}

impl EngineConfig {
    pub fn label(&self) -> String {
        match self {
            EngineConfig::Http { model, .. } => format!("http:{}", model),
            EngineConfig::WhisperCpp { model_path, .. } => format!(
                "whisper-cpp:{}",
                model_path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }

    fn validate(&self, role: &str) -> Result<()> {
        match self {
            EngineConfig::Http { endpoint, model, .. } => {
                if endpoint.trim().is_empty() || model.trim().is_empty() {
                    return Err(SubtitlerError::Config(format!(
                        "{} recognizer needs an endpoint and a model",
                        role
                    )));
                }
            }
            EngineConfig::WhisperCpp {
                binary_path,
                ffmpeg_path,
                ..
            } => {
                if binary_path.trim().is_empty() || ffmpeg_path.trim().is_empty() {
                    return Err(SubtitlerError::Config(format!(
                        "{} recognizer needs whisper-cli and ffmpeg paths",
                        role
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_max_retries() -> u32 {
    1
}

fn default_recognizer_timeout() -> u64 {
    1800
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub primary: EngineConfig,
    pub fallback: EngineConfig,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            primary: EngineConfig::Http {
                endpoint: "http://localhost:8000".to_string(),
                model: "fractalego/personal-speech-to-text-model".to_string(),
                api_key: None,
                language: None,
                max_retries: default_max_retries(),
                timeout_secs: default_recognizer_timeout(),
            },
            fallback: EngineConfig::WhisperCpp {
                binary_path: "whisper-cli".to_string(),
                model_path: PathBuf::from("models/ggml-base.bin"),
                language: None,
                device: Device::Cpu,
                ffmpeg_path: default_ffmpeg(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub source_language: String,
    pub policy: TranslationPolicy,
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000".to_string(),
            api_key: None,
            source_language: "en".to_string(),
            policy: TranslationPolicy::default(),
            concurrency: 4,
            timeout_secs: 30,
        }
    }
}

/// Look of burned-in subtitles, passed to the renderer as an ASS style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    /// `&HBBGGRR` colour of the text.
    pub primary_colour: String,
    /// `&HBBGGRR` colour of the outline or box.
    pub outline_colour: String,
    /// 1 = outline + shadow, 3 = opaque box.
    pub border_style: u8,
    /// Numpad-style alignment code, 2 = bottom centre.
    pub alignment: u8,
    /// Directory searched for `font_name`.
    pub fonts_dir: Option<PathBuf>,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Amiri".to_string(),
            font_size: 24,
            primary_colour: "&HFFFFFF".to_string(),
            outline_colour: "&H000000".to_string(),
            border_style: 3,
            alignment: 2,
            fonts_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub mux_timeout_secs: u64,
    pub video_codec: String,
    pub crf: u8,
    /// Extra encoder arguments appended before the output path,
    /// e.g. `["-preset", "medium"]`.
    pub extra_options: Vec<String>,
    pub style: SubtitleStyle,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: "ffprobe".to_string(),
            mux_timeout_secs: 3600,
            video_codec: "libx264".to_string(),
            crf: 18,
            extra_options: Vec::new(),
            style: SubtitleStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where finished subtitle files and videos are written.
    pub dir: PathBuf,
    /// Parent of the process-scoped scratch directory.
    pub work_root: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("subtitler-output"),
            work_root: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transcriber: TranscriberConfig,
    pub translator: TranslatorConfig,
    pub media: MediaConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load from the default config file (if any), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SubtitlerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            SubtitlerError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("SUBTITLER_TRANSLATE_ENDPOINT") {
            self.translator.endpoint = endpoint;
        }
        if let Some(key) = lookup("SUBTITLER_TRANSLATE_API_KEY") {
            self.translator.api_key = Some(key);
        }
        if let Some(policy) = lookup("SUBTITLER_TRANSLATION_POLICY") {
            if let Ok(p) = policy.parse() {
                self.translator.policy = p;
            }
        }
        if let Some(concurrency) = lookup("SUBTITLER_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.translator.concurrency = c;
            }
        }
        if let Some(value) = lookup("SUBTITLER_RECOGNIZER_ENDPOINT") {
            if let EngineConfig::Http { endpoint, .. } = &mut self.transcriber.primary {
                *endpoint = value;
            }
        }
        if let Some(ffmpeg) = lookup("SUBTITLER_FFMPEG") {
            self.media.ffmpeg_path = ffmpeg;
        }
        if let Some(ffprobe) = lookup("SUBTITLER_FFPROBE") {
            self.media.ffprobe_path = ffprobe;
        }
        if let Some(dir) = lookup("SUBTITLER_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.transcriber.primary.validate("Primary")?;
        self.transcriber.fallback.validate("Fallback")?;

        if self.translator.endpoint.trim().is_empty() {
            return Err(SubtitlerError::Config(
                "Translation endpoint is empty".to_string(),
            ));
        }
        if self.translator.concurrency == 0 {
            return Err(SubtitlerError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }
        if self.media.ffmpeg_path.trim().is_empty() || self.media.ffprobe_path.trim().is_empty() {
            return Err(SubtitlerError::Config(
                "ffmpeg and ffprobe paths must be set".to_string(),
            ));
        }
        if self.media.mux_timeout_secs == 0 {
            return Err(SubtitlerError::Config(
                "Mux timeout must be greater than 0".to_string(),
            ));
        }
        if self.media.style.font_size == 0 {
            return Err(SubtitlerError::Config(
                "Subtitle font size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("subtitler").join("config.toml"))
    }
}
