use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::SubtitleStyle;
use crate::error::{Result, SubtitlerError};

/// An external media tool invocation, built up argument by argument.
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Never wait for keyboard input and overwrite the output.
    pub fn batch_mode(self) -> Self {
        self.arg("-nostdin").arg("-y")
    }

    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.arg("-crf").arg(crf.to_string())
    }

    pub fn copy_audio(self) -> Self {
        self.arg("-c:a").arg("copy")
    }

    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Run the command, killing it if it outlives `timeout`.
    ///
    /// Dropping the returned future also kills the child process.
    pub async fn execute(&self, timeout: Duration) -> Result<()> {
        debug!("Executing {}: {} {:?}", self.description, self.binary_path, self.args);

        let run = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| {
                SubtitlerError::Mux(format!(
                    "{} timed out after {}s",
                    self.description,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                SubtitlerError::Mux(format!("Failed to run {}: {}", self.binary_path, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubtitlerError::Mux(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Escape a value for use as a filter option inside an ffmpeg filtergraph.
///
/// Two levels apply: the option parser (`\`, `'`, `:`) and then the
/// filtergraph parser (`\`, `'`, `[`, `]`, `,`, `;`).
pub fn escape_filter_value(value: &str) -> String {
    let escape = |input: &str, special: &[char]| -> String {
        let mut out = String::with_capacity(input.len());
        for c in input.chars() {
            if special.contains(&c) {
                out.push('\\');
            }
            out.push(c);
        }
        out
    };
    let option_level = escape(value, &['\\', '\'', ':']);
    escape(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

/// ASS `force_style` string for `style`.
pub fn force_style(style: &SubtitleStyle) -> String {
    let value = format!(
        "FontName={},FontSize={},PrimaryColour={},OutlineColour={},BorderStyle={},Alignment={},Encoding=1",
        style.font_name,
        style.font_size,
        style.primary_colour,
        style.outline_colour,
        style.border_style,
        style.alignment
    );
    // The value is single-quoted in the filtergraph.
    value.replace(['\'', '\\'], "")
}

/// `subtitles` filter that renders `subtitle_path` into the frames.
pub fn subtitles_filter(subtitle_path: &Path, style: &SubtitleStyle) -> String {
    let mut filter = format!(
        "subtitles=filename={}:charenc=UTF-8",
        escape_filter_value(&subtitle_path.to_string_lossy())
    );
    if let Some(ref fonts_dir) = style.fonts_dir {
        filter.push_str(&format!(
            ":fontsdir={}",
            escape_filter_value(&fonts_dir.to_string_lossy())
        ));
    }
    filter.push_str(&format!(":force_style='{}'", force_style(style)));
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_builder() {
        let cmd = MediaCommand::new("ffmpeg", "burn")
            .batch_mode()
            .input("/in.mp4")
            .video_filter("null")
            .video_codec("libx264")
            .crf(18)
            .copy_audio()
            .output("/out.mp4");
        assert_eq!(
            cmd.args,
            vec![
                "-nostdin", "-y", "-i", "/in.mp4", "-vf", "null", "-c:v", "libx264", "-crf", "18",
                "-c:a", "copy", "/out.mp4"
            ]
        );
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("/tmp/plain.srt"), "/tmp/plain.srt");
        assert_eq!(escape_filter_value("C:/subs.srt"), "C\\\\:/subs.srt");
        assert_eq!(escape_filter_value("it's.srt"), "it\\\\\\'s.srt");
        assert_eq!(escape_filter_value("a,b[1].srt"), "a\\,b\\[1\\].srt");
    }

    #[test]
    fn test_default_force_style() {
        assert_eq!(
            force_style(&SubtitleStyle::default()),
            "FontName=Amiri,FontSize=24,PrimaryColour=&HFFFFFF,OutlineColour=&H000000,BorderStyle=3,Alignment=2,Encoding=1"
        );
    }

    #[test]
    fn test_force_style_strips_quotes() {
        let style = SubtitleStyle {
            font_name: "Bob's Font".to_string(),
            ..SubtitleStyle::default()
        };
        assert!(force_style(&style).starts_with("FontName=Bobs Font,"));
    }

    #[test]
    fn test_subtitles_filter() {
        let style = SubtitleStyle {
            fonts_dir: Some(PathBuf::from("/usr/share/fonts")),
            ..SubtitleStyle::default()
        };
        let filter = subtitles_filter(Path::new("/work/job-1/subs.srt"), &style);
        assert!(filter.starts_with("subtitles=filename=/work/job-1/subs.srt:charenc=UTF-8"));
        assert!(filter.contains(":fontsdir=/usr/share/fonts:"));
        assert!(filter.ends_with("Encoding=1'"));
    }

    #[tokio::test]
    async fn test_execute_reports_stderr() {
        let cmd = MediaCommand::new("sh", "failing tool")
            .arg("-c")
            .arg("echo boom >&2; exit 3");
        let err = cmd.execute(Duration::from_secs(10)).await.unwrap_err();
        match err {
            SubtitlerError::Mux(message) => assert!(message.contains("boom")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let cmd = MediaCommand::new("sleep", "sleeper").arg("30");
        let err = cmd.execute(Duration::from_millis(100)).await.unwrap_err();
        match err {
            SubtitlerError::Mux(message) => assert!(message.contains("timed out")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
