//! Inference client abstraction and implementations.
//!
//! Defines the [`InferenceClient`] trait, the single capability the pipeline
//! needs from a text-generation service, and concrete implementations:
//! - **[`DisabledClient`]**: always fails permanently; used when inference is not configured.
//! - **[`OpenAIClient`]**: calls an OpenAI-compatible `/v1/chat/completions` endpoint.
//! - **[`OllamaClient`]**: calls a local Ollama instance's `/api/generate` endpoint.
//!
//! # Retry Strategy
//!
//! Clients make exactly one attempt per call and classify the outcome.
//! [`generate_with_retry`] is the only place that retries:
//! - HTTP 429 (rate limited), 5xx, network errors, and timeouts → [`InferenceError::Transient`], retried
//! - Other HTTP 4xx and unusable responses → [`InferenceError::Permanent`], returned immediately
//! - Backoff doubles from `backoff_base` up to `backoff_max`
//!
//! Every attempt is bounded by [`RetryPolicy::timeout`] and raced against the
//! run's cancellation token.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::InferenceConfig;
use crate::error::InferenceError;

/// A text-generation service.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Model identifier for logs and reports.
    fn model_name(&self) -> &str;

    /// Submit `prompt` and return the generated text.
    async fn generate(&self, prompt: &str, max_output_tokens: u32)
        -> Result<String, InferenceError>;
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(32),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

/// Why [`generate_with_retry`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The last error seen, after `attempts` tries.
    Failed {
        error: InferenceError,
        attempts: u32,
    },
    /// The run was cancelled while waiting on the service.
    Cancelled,
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Failed { error, attempts } => {
                write!(f, "{} (after {} attempt(s))", error, attempts)
            }
            GenerationError::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Call the client, retrying transient failures per `policy`.
pub async fn generate_with_retry(
    client: &dyn InferenceClient,
    prompt: &str,
    max_output_tokens: u32,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, GenerationError> {
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        attempt += 1;

        let call = tokio::time::timeout(policy.timeout, client.generate(prompt, max_output_tokens));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            result = call => match result {
                Ok(inner) => inner,
                Err(_) => Err(InferenceError::Transient(format!(
                    "timed out after {}s",
                    policy.timeout.as_secs_f64()
                ))),
            },
        };

        match outcome {
            Ok(text) => return Ok(text),
            Err(error) if error.is_transient() && attempt <= policy.max_retries => {
                tracing::debug!(attempt, error = %error, "transient inference error, retrying");
            }
            Err(error) => {
                return Err(GenerationError::Failed {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}

/// Build the client selected by the configuration.
pub fn create_client(config: &InferenceConfig) -> Result<Box<dyn InferenceClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledClient)),
        "openai" => Ok(Box::new(OpenAIClient::new(config)?)),
        "ollama" => Ok(Box::new(OllamaClient::new(config)?)),
        other => bail!(
            "Unknown inference provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
}

/// Map an HTTP status to the error taxonomy.
fn classify_status(status: reqwest::StatusCode, service: &str, body: String) -> InferenceError {
    let message = format!("{} API error {}: {}", service, status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        InferenceError::Transient(message)
    } else {
        InferenceError::Permanent(message)
    }
}

fn classify_transport(err: reqwest::Error, service: &str) -> InferenceError {
    InferenceError::Transient(format!("{} connection error: {}", service, err))
}

// ============ Disabled Client ============

/// Client used when `inference.provider = "disabled"`.
pub struct DisabledClient;

#[async_trait]
impl InferenceClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _max: u32) -> Result<String, InferenceError> {
        Err(InferenceError::Permanent(
            "inference provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI-compatible Client ============

/// Client for OpenAI-compatible chat completion APIs.
///
/// Requires the `OPENAI_API_KEY` environment variable. `inference.url`
/// overrides the base URL (default `https://api.openai.com`), which also
/// covers self-hosted gateways speaking the same protocol.
pub struct OpenAIClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenAIClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base_url = config
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl InferenceClient for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, InferenceError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_output_tokens,
            "temperature": 0.5,
            "top_p": 0.9,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, "OpenAI"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, "OpenAI", text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport(e, "OpenAI"))?;
        parse_openai_response(&decode_body(&bytes, "OpenAI")?)
    }
}

/// A success response whose body is not JSON will not improve on retry.
fn decode_body(bytes: &[u8], service: &str) -> Result<serde_json::Value, InferenceError> {
    serde_json::from_slice(bytes).map_err(|e| {
        InferenceError::Permanent(format!("Invalid {} response body: {}", service, e))
    })
}

/// Extract `choices[0].message.content`.
fn parse_openai_response(json: &serde_json::Value) -> Result<String, InferenceError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            InferenceError::Permanent("Invalid OpenAI response: missing message content".into())
        })
}

// ============ Ollama Client ============

/// Client for a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, InferenceError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "num_predict": max_output_tokens, "temperature": 0.5, "top_k": 50, "top_p": 0.9 },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                InferenceError::Transient(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, "Ollama", text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport(e, "Ollama"))?;
        decode_body(&bytes, "Ollama")?
            .get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                InferenceError::Permanent("Invalid Ollama response: missing response".into())
            })
    }
}
