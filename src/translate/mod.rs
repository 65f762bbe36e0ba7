pub mod libre;

pub use libre::LibreTranslator;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::TranslationPolicy;
use crate::error::{Result, SubtitlerError};
use crate::transcribe::Segment;

/// One text span in, one text span out, one service call.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Result of translating a whole transcript.
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub segments: Vec<Segment>,
    /// Segments that kept their source text because the call failed.
    pub fallback_count: usize,
}

/// Settings for [`translate_segments`].
#[derive(Debug, Clone)]
pub struct TranslateOptions<'a> {
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    pub policy: TranslationPolicy,
    pub concurrency: usize,
    pub show_progress: bool,
}

/// Translate every segment, up to `concurrency` calls at a time.
///
/// Blank source text is never sent. Failed calls follow `policy`, the same
/// way for every segment. Output order always matches input order.
pub async fn translate_segments(
    translator: Arc<dyn Translator>,
    segments: Vec<Segment>,
    options: TranslateOptions<'_>,
) -> Result<TranslationOutcome> {
    if segments.is_empty() {
        return Ok(TranslationOutcome {
            segments,
            fallback_count: 0,
        });
    }

    let total = segments.len();
    let start_time = Instant::now();
    info!(
        "Translating {} segments {} -> {} with {} ({} concurrent)",
        total,
        options.source_lang,
        options.target_lang,
        translator.name(),
        options.concurrency
    );

    let progress_bar = if options.show_progress {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut futures = FuturesUnordered::new();

    for (index, segment) in segments.iter().enumerate() {
        let sem = semaphore.clone();
        let translator = translator.clone();
        let pb = progress_bar.clone();
        let text = segment.source_text.clone();
        let (source_lang, target_lang) = (options.source_lang, options.target_lang);

        futures.push(async move {
            let result = if text.trim().is_empty() {
                Ok(String::new())
            } else {
                match sem.acquire().await {
                    Ok(_permit) => translator.translate(&text, source_lang, target_lang).await,
                    Err(e) => Err(SubtitlerError::Translation(format!("Worker pool closed: {e}"))),
                }
            };
            if let Some(ref pb) = pb {
                pb.inc(1);
            }
            (index, result)
        });
    }

    let mut results: Vec<(usize, String)> = Vec::with_capacity(total);
    let mut fallback_count = 0;

    while let Some((index, result)) = futures.next().await {
        match result {
            Ok(translated) => results.push((index, translated)),
            Err(e) => match options.policy {
                TranslationPolicy::Abort => {
                    if let Some(pb) = progress_bar {
                        pb.abandon_with_message("Translation failed");
                    }
                    return Err(match e {
                        SubtitlerError::Translation(_) => e,
                        other => SubtitlerError::Translation(other.to_string()),
                    });
                }
                TranslationPolicy::KeepSource => {
                    warn!("Segment {} kept its source text: {}", index + 1, e);
                    fallback_count += 1;
                    results.push((index, segments[index].source_text.clone()));
                }
            },
        }
    }

    if let Some(pb) = progress_bar {
        debug_assert_eq!(pb.position(), total as u64, "every segment advances the bar");
        pb.finish_with_message("Translation complete");
    }

    // Sort results by segment index to restore the original order
    results.sort_by_key(|(index, _)| *index);

    let mut segments = segments;
    for (index, translated) in results {
        segments[index].target_text = translated;
    }

    debug!(
        "Translated {} segments in {:.1}s ({} kept source text)",
        total,
        start_time.elapsed().as_secs_f64(),
        fallback_count
    );

    Ok(TranslationOutcome {
        segments,
        fallback_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Uppercases text after a delay that shrinks with position, so calls
    /// finish in reverse order. Fails on any text containing "fail".
    struct SlowUpper {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for SlowUpper {
        async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = 50u64.saturating_sub(text.len() as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if text.contains("fail") {
                return Err(SubtitlerError::Translation("service unavailable".to_string()));
            }
            Ok(text.to_uppercase())
        }

        fn name(&self) -> &'static str {
            "slow-upper"
        }
    }

    fn segments(texts: &[&str]) -> Vec<Segment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Segment::new(i as f64, i as f64 + 1.0, *t))
            .collect()
    }

    fn options(policy: TranslationPolicy) -> TranslateOptions<'static> {
        TranslateOptions {
            source_lang: "en",
            target_lang: "ar",
            policy,
            concurrency: 4,
            show_progress: false,
        }
    }

    #[tokio::test]
    async fn test_order_preserved_and_blank_skipped() {
        let translator = Arc::new(SlowUpper {
            calls: AtomicUsize::new(0),
        });
        let outcome = translate_segments(
            translator.clone(),
            segments(&["a", "bb", "  ", "dddd", "eeeee"]),
            options(TranslationPolicy::Abort),
        )
        .await
        .unwrap();

        let texts: Vec<&str> = outcome.segments.iter().map(|s| s.target_text.as_str()).collect();
        assert_eq!(texts, vec!["A", "BB", "", "DDDD", "EEEEE"]);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.fallback_count, 0);
    }

    #[tokio::test]
    async fn test_progress_counts_blank_segments() {
        let translator = Arc::new(SlowUpper {
            calls: AtomicUsize::new(0),
        });
        let mut options = options(TranslationPolicy::KeepSource);
        options.show_progress = true;
        let outcome = translate_segments(
            translator.clone(),
            segments(&["", "a", " ", "please fail", "\n"]),
            options,
        )
        .await
        .unwrap();

        assert_eq!(outcome.segments.len(), 5);
        assert_eq!(outcome.segments[1].target_text, "A");
        assert_eq!(outcome.fallback_count, 1);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_keep_source_policy() {
        let translator = Arc::new(SlowUpper {
            calls: AtomicUsize::new(0),
        });
        let outcome = translate_segments(
            translator,
            segments(&["ok", "please fail", "fine"]),
            options(TranslationPolicy::KeepSource),
        )
        .await
        .unwrap();

        assert_eq!(outcome.segments[0].target_text, "OK");
        assert_eq!(outcome.segments[1].target_text, "please fail");
        assert_eq!(outcome.segments[2].target_text, "FINE");
        assert_eq!(outcome.fallback_count, 1);
    }

    #[tokio::test]
    async fn test_abort_policy() {
        let translator = Arc::new(SlowUpper {
            calls: AtomicUsize::new(0),
        });
        let result = translate_segments(
            translator,
            segments(&["ok", "please fail"]),
            options(TranslationPolicy::Abort),
        )
        .await;
        assert!(matches!(result, Err(SubtitlerError::Translation(_))));
    }

    #[tokio::test]
    async fn test_empty_transcript() {
        let translator = Arc::new(SlowUpper {
            calls: AtomicUsize::new(0),
        });
        let outcome = translate_segments(translator.clone(), Vec::new(), options(TranslationPolicy::Abort))
            .await
            .unwrap();
        assert!(outcome.segments.is_empty());
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }
}
