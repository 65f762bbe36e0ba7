//! Mock API tests for the HTTP recognizer and translator
//!
//! A wiremock server stands in for the speech and translation services.

mod common;

use common::*;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use subtitler::audio::AudioTrack;
use subtitler::transcribe::{Transcriber, WhisperClient};
use subtitler::translate::{LibreTranslator, Translator};
use subtitler::{ErrorKind, JobOptions, JobRequest, JobSource, PipelineOrchestrator, SubtitlerError};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn wav_track(dir: &TempDir, seconds: f64) -> AudioTrack {
    let path: PathBuf = dir.path().join("audio.wav");
    write_silent_wav(&path, seconds);
    AudioTrack {
        path,
        sample_rate: 16000,
        channels: 1,
        duration: seconds,
    }
}

// ============================================================================
// Recognizer Mock Tests
// ============================================================================

mod whisper_tests {
    use super::*;

    #[tokio::test]
    async fn test_segments_are_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "Hello world",
                "language": "en",
                "segments": [
                    {"start": 1.2, "end": 5.0, "text": " world "},
                    {"start": 0.0, "end": 1.2, "text": " Hello "}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "whisper-large-v3")
            .with_api_key(Some("sk-test".to_string()));

        let transcript = assert_ok!(client.transcribe(&wav_track(&dir, 2.0)).await);

        assert_eq!(transcript.engine, "http:whisper-large-v3");
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert!(!transcript.degraded);
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].source_text, "Hello");
        assert_eq!(transcript.segments[0].start, 0.0);
        assert_eq!(transcript.segments[1].source_text, "world");
        // Clamped to the audio duration.
        assert_eq!(transcript.segments[1].end, 2.0);
    }

    #[tokio::test]
    async fn test_chunk_responses_close_open_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "one two",
                "chunks": [
                    {"timestamp": [0.0, 1.0], "text": "one"},
                    {"timestamp": [1.0, null], "text": "two"}
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "openai/whisper-base");

        let transcript = assert_ok!(client.transcribe(&wav_track(&dir, 3.0)).await);

        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[1].start, 1.0);
        assert_eq!(transcript.segments[1].end, 3.0);
    }

    #[tokio::test]
    async fn test_silence_yields_no_segments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "",
                "segments": []
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "whisper-1");

        let transcript = assert_ok!(client.transcribe(&wav_track(&dir, 1.0)).await);
        assert!(transcript.segments.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "segments": [{"start": 0.0, "end": 0.5, "text": "ok"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "whisper-1").with_retries(2);

        let transcript = assert_ok!(client.transcribe(&wav_track(&dir, 1.0)).await);
        assert_eq!(transcript.segments[0].source_text, "ok");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "model 'custom' not found"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "custom").with_retries(3);

        let err = assert_err!(client.transcribe(&wav_track(&dir, 1.0)).await);
        assert_eq!(err.kind(), ErrorKind::TranscriptionError);
        assert!(err.to_string().contains("model 'custom' not found"));
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "whisper-1").with_retries(2);

        let err = assert_err!(client.transcribe(&wav_track(&dir, 1.0)).await);
        assert!(matches!(err, SubtitlerError::Transcription(ref m) if m.contains("Malformed")));
    }

    #[tokio::test]
    async fn test_debug_logging_of_multibyte_response() {
        // Put an Arabic character across the cut-off of the logged excerpt.
        let prefix = r#"{"language":"ar","segments":[{"start":0.0,"end":1.0,"text":""#;
        let text = format!("{}{}", "a".repeat(499 - prefix.len()), "مرحبا ".repeat(40));
        let body = format!(r#"{}{}"}}]}}"#, prefix, text);
        assert!(!body.is_char_boundary(500));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "whisper-1");

        let transcript = assert_ok!(client.transcribe(&wav_track(&dir, 2.0)).await);
        assert_eq!(transcript.language.as_deref(), Some("ar"));
        assert_eq!(transcript.segments.len(), 1);
        assert!(transcript.segments[0].source_text.ends_with("مرحبا"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "slow down"}
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "segments": [{"start": 0.0, "end": 0.5, "text": "ok"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = WhisperClient::new(server.uri(), "whisper-1").with_retries(1);

        assert_ok!(client.transcribe(&wav_track(&dir, 1.0)).await);
    }

    #[tokio::test]
    async fn test_missing_audio_file() {
        let server = MockServer::start().await;
        let client = WhisperClient::new(server.uri(), "whisper-1");
        let track = AudioTrack {
            path: PathBuf::from("/tmp/nonexistent_subtitler_test.wav"),
            sample_rate: 16000,
            channels: 1,
            duration: 1.0,
        };

        assert_err!(client.transcribe(&track).await);
    }
}

// ============================================================================
// Translator Mock Tests
// ============================================================================

mod libre_tests {
    use super::*;

    #[tokio::test]
    async fn test_translate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_partial_json(json!({
                "q": "Hello",
                "source": "en",
                "target": "ar",
                "format": "text",
                "api_key": "lt-key"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"translatedText": " مرحبا "})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let translator = LibreTranslator::new(server.uri()).with_api_key(Some("lt-key".to_string()));

        let text = assert_ok!(translator.translate("Hello", "en", "ar").await);
        assert_eq!(text, "مرحبا");
    }

    #[tokio::test]
    async fn test_translate_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "Server busy"})))
            .mount(&server)
            .await;

        let translator = LibreTranslator::new(server.uri());

        let err = assert_err!(translator.translate("Hello", "en", "ar").await);
        assert_eq!(err.kind(), ErrorKind::TranslationError);
        assert!(err.to_string().contains("Server busy"));
    }

    #[tokio::test]
    async fn test_translate_missing_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detectedLanguage": {}})))
            .mount(&server)
            .await;

        let translator = LibreTranslator::new(server.uri());

        let err = assert_err!(translator.translate("Hello", "en", "ar").await);
        assert!(err.to_string().contains("translatedText"));
    }

    #[tokio::test]
    async fn test_blank_text_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": "x"})))
            .expect(0)
            .mount(&server)
            .await;

        let translator = LibreTranslator::new(server.uri());
        let text = assert_ok!(translator.translate("   ", "en", "ar").await);
        assert_eq!(text, "");
    }
}

// ============================================================================
// Pipeline Against Mock Services
// ============================================================================

mod end_to_end_tests {
    use super::*;

    async fn mount_translation(server: &MockServer, source: &str, translated: &str) {
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_partial_json(json!({"q": source, "target": "ar"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": translated})))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_video_to_arabic_subtitles() {
        let recognizer = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "language": "en",
                "segments": [
                    {"start": 1.0, "end": 3.5, "text": " Hello"},
                    {"start": 4.0, "end": 6.0, "text": " Goodbye"}
                ]
            })))
            .expect(1)
            .mount(&recognizer)
            .await;

        let translation = MockServer::start().await;
        mount_translation(&translation, "Hello", "مرحبا").await;
        mount_translation(&translation, "Goodbye", "مع السلامة").await;

        let input = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();

        let orchestrator = PipelineOrchestrator::new(
            settings(output_dir.path(), work.path()),
            FakeExtractor::new(10.0),
            Arc::new(WhisperClient::new(recognizer.uri(), "whisper-1")),
            Arc::new(LibreTranslator::new(translation.uri())),
            FakeMuxer::new(),
        )
        .unwrap();

        let request = JobRequest::new(
            JobSource::Path(fake_video(input.path(), "talk.mp4")),
            "ar",
            JobOptions::default(),
        );
        let output = assert_ok!(orchestrator.run(request).await);

        let content = std::fs::read_to_string(output.subtitle_path.as_ref().unwrap()).unwrap();
        assert_eq!(
            content,
            "\u{FEFF}1\n00:00:01,000 --> 00:00:03,500\nمرحبا\n\n\
             2\n00:00:04,000 --> 00:00:06,000\nمع السلامة\n\n"
        );
        assert_eq!(output.stats.engine, "http:whisper-1");
        assert_eq!(output.stats.detected_language.as_deref(), Some("en"));
        assert!(files_under(work.path()).is_empty());
    }
}
