//! Gemini `generateContent` client.
//!
//! Sends one user-role message per call and pulls the generated text out of
//! `candidates[0].content.parts[0].text`. Retries on 5xx, backs off on 429,
//! and never puts the API key in the URL so transport errors stay clean.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GenerateError};
use crate::generator::TextGenerator;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_RETRY_AFTER_SECS: u64 = 10;
const MAX_DIAGNOSTIC_BODY_CHARS: usize = 512;

/// Settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    pub max_retries: u32,
    /// First retry delay; doubled on every further attempt.
    pub retry_backoff: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    /// Full `generateContent` URL for the configured model.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let base = self.base_url.trim_end_matches('/');
        let raw = format!("{base}/models/{}:generateContent", self.model);
        let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url)
    }
}

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn user_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

/// Response body of `generateContent`, reduced to the fields we read.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    pub parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

/// Pull the generated text out of a decoded response.
pub fn extract_text(response: GenerateContentResponse) -> Result<String, GenerateError> {
    let candidate = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| GenerateError::Malformed("response has no candidates".into()))?;
    let part = candidate
        .content
        .and_then(|content| content.parts)
        .and_then(|parts| parts.into_iter().next())
        .ok_or_else(|| GenerateError::Malformed("first candidate has no content parts".into()))?;
    part.text
        .ok_or_else(|| GenerateError::Malformed("first part has no text".into()))
}

/// Decode a raw response body and extract its text.
pub fn parse_response(body: &str) -> Result<String, GenerateError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerateError::Malformed(format!("invalid response JSON: {e}")))?;
    extract_text(response)
}

// ── Client ──────────────────────────────────────────────────────

/// HTTP client for the Gemini text generation API.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: Url,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if config.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        let endpoint = config.endpoint()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// POST the request, retrying on 5xx, 429, and connection failures.
    async fn post_with_retry(
        &self,
        body: &GenerateContentRequest<'_>,
    ) -> Result<String, GenerateError> {
        let mut retries = 0u32;

        loop {
            let resp = self
                .client
                .post(self.endpoint.clone())
                .header(API_KEY_HEADER, &self.config.api_key)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status();

                    if status.is_server_error() && retries < self.config.max_retries {
                        retries += 1;
                        let delay = self.backoff(retries);
                        tracing::debug!("Gemini returned {status}; retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS && retries < self.config.max_retries {
                        retries += 1;
                        let delay = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.trim().parse::<u64>().ok())
                            .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
                            .unwrap_or_else(|| self.backoff(retries));
                        tracing::debug!("Gemini rate limited; retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let text = r.text().await?;
                    if !status.is_success() {
                        return Err(GenerateError::ServiceStatus {
                            status: status.as_u16(),
                            body: text.chars().take(MAX_DIAGNOSTIC_BODY_CHARS).collect(),
                        });
                    }
                    return Ok(text);
                }
                Err(e) => {
                    if retries < self.config.max_retries {
                        retries += 1;
                        let delay = self.backoff(retries);
                        tracing::debug!("Gemini request failed ({e}); retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .retry_backoff
            .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(Duration::MAX)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let request = GenerateContentRequest::user_prompt(prompt);
        let body = self.post_with_retry(&request).await?;
        parse_response(&body)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
