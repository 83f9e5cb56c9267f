use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::AdvisoryError;
use crate::estimator::CalculationResult;

use super::prompts::{build_advisory_prompt, SYSTEM_PROMPT};
use super::types::{parse_advisory_response, AdvisoryContext};

/// Sampling temperature for every provider. Kept near zero so repeated
/// calls with the same context give stable answers.
const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 2048;

/// An external service that proposes a full calculation result.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Propose a result for the given context. The returned result is tagged
    /// `advisory` and has already passed schema validation.
    async fn advise(&self, context: &AdvisoryContext) -> Result<CalculationResult, AdvisoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryProvider {
    OpenAi,
    Claude,
    OpenRouter,
}

impl AdvisoryProvider {
    pub fn from_str(input: &str) -> Result<Self, AdvisoryError> {
        match input.trim().to_lowercase().as_str() {
            "openai" => Ok(AdvisoryProvider::OpenAi),
            "claude" | "anthropic" => Ok(AdvisoryProvider::Claude),
            "openrouter" => Ok(AdvisoryProvider::OpenRouter),
            other => Err(AdvisoryError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisoryProvider::OpenAi => "openai",
            AdvisoryProvider::Claude => "claude",
            AdvisoryProvider::OpenRouter => "openrouter",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AdvisoryProvider::OpenAi => "gpt-4o",
            AdvisoryProvider::Claude => "claude-sonnet-4-20250514",
            AdvisoryProvider::OpenRouter => "openai/gpt-4o",
        }
    }

    /// Conventional environment variable holding this provider's key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            AdvisoryProvider::OpenAi => "OPENAI_API_KEY",
            AdvisoryProvider::Claude => "ANTHROPIC_API_KEY",
            AdvisoryProvider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl fmt::Display for AdvisoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM-backed advisory service over HTTP.
pub struct HttpAdvisoryService {
    client: reqwest::Client,
    provider: AdvisoryProvider,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl HttpAdvisoryService {
    pub fn new(
        provider: AdvisoryProvider,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdvisoryError> {
        Ok(Self {
            client: build_api_client(timeout)?,
            provider,
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn provider(&self) -> AdvisoryProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, AdvisoryError> {
        let response = request.send().await.map_err(|e| {
            let err = if e.is_timeout() {
                AdvisoryError::Timeout(self.timeout.as_secs())
            } else {
                AdvisoryError::Http(format!("request to {} failed: {}", self.provider, e))
            };
            error!("{}", err);
            err
        })?;
        handle_api_response(response, self.provider).await
    }

    async fn call_claude(&self, prompt: &str) -> Result<String, AdvisoryError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        let request = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body);
        let body_text = self.send(request).await?;

        // { "content": [{"type": "text", "text": "..."}] }
        let resp_json: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| AdvisoryError::Parse(format!("Claude response wrapper: {}", e)))?;
        resp_json["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AdvisoryError::Parse("No text content in Claude response".to_string()))
    }

    /// OpenAI and OpenRouter share the chat-completions wire format.
    async fn call_chat_completions(&self, url: &str, prompt: &str) -> Result<String, AdvisoryError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "response_format": {
                "type": "json_object"
            }
        });

        let request = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body);
        let body_text = self.send(request).await?;

        // { "choices": [{"message": {"content": "..."}}] }
        let resp_json: serde_json::Value = serde_json::from_str(&body_text).map_err(|e| {
            AdvisoryError::Parse(format!("{} response wrapper: {}", self.provider, e))
        })?;
        resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AdvisoryError::Parse(format!("No content in {} response", self.provider)))
    }
}

#[async_trait]
impl AdvisoryService for HttpAdvisoryService {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn advise(&self, context: &AdvisoryContext) -> Result<CalculationResult, AdvisoryError> {
        let prompt = build_advisory_prompt(context);

        info!(
            "Requesting advisory estimate from '{}' model '{}' with {} knowledge snippets",
            self.provider,
            self.model,
            context.snippets.len()
        );

        let text = match self.provider {
            AdvisoryProvider::Claude => self.call_claude(&prompt).await?,
            AdvisoryProvider::OpenAi => {
                self.call_chat_completions("https://api.openai.com/v1/chat/completions", &prompt)
                    .await?
            }
            AdvisoryProvider::OpenRouter => {
                self.call_chat_completions("https://openrouter.ai/api/v1/chat/completions", &prompt)
                    .await?
            }
        };

        let result = parse_advisory_response(&text, context.request.area()).map_err(|e| {
            error!("Advisory reply from {} rejected: {}", self.provider, e);
            e
        })?;

        info!(
            "Advisory estimate from '{}': confidence={}, {} material lines",
            self.provider,
            result.confidence_score,
            result.materials_needed.len()
        );
        Ok(result)
    }
}

/// Build a reqwest client whose every request is bounded by `timeout`.
fn build_api_client(timeout: Duration) -> Result<reqwest::Client, AdvisoryError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AdvisoryError::Http(format!("Failed to build HTTP client: {}", e)))
}

/// Check status and extract body text.
async fn handle_api_response(
    response: reqwest::Response,
    provider: AdvisoryProvider,
) -> Result<String, AdvisoryError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let truncated: String = body.chars().take(1024).collect();
        let err = AdvisoryError::Status {
            status: status.as_u16(),
            body: truncated,
        };
        error!("{} returned {}", provider, err);
        return Err(err);
    }
    Ok(response.text().await?)
}
