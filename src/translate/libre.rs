//! Translation through a LibreTranslate-compatible HTTP service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TranslatorConfig;
use crate::error::{Result, SubtitlerError};
use crate::translate::Translator;

/// Translator for `POST /translate` services (LibreTranslate, its
/// self-hosted forks and compatible gateways).
pub struct LibreTranslator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LibreTranslator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn from_config(config: &TranslatorConfig) -> Result<Self> {
        Self::new(config.endpoint.as_str())
            .with_api_key(config.api_key.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl Translator for LibreTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        debug!("Translating {} chars {} -> {}", text.len(), source_lang, target_lang);

        let request = TranslateRequest {
            q: text,
            source: source_lang,
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let url = format!("{}/translate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SubtitlerError::Translation(format!("Translation request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubtitlerError::Translation(format!("Failed to read response: {}", e)))?;

        let parsed: Option<TranslateResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed.and_then(|r| r.error).unwrap_or(body);
            return Err(SubtitlerError::Translation(format!(
                "Translation API error ({}): {}",
                status, detail
            )));
        }

        let parsed = parsed.ok_or_else(|| {
            SubtitlerError::Translation("Failed to parse translation response".to_string())
        })?;

        if let Some(error) = parsed.error {
            return Err(SubtitlerError::Translation(error));
        }

        parsed
            .translated_text
            .map(|t| t.trim().to_string())
            .ok_or_else(|| SubtitlerError::Translation("Response has no translatedText".to_string()))
    }

    fn name(&self) -> &'static str {
        "libretranslate"
    }
}
