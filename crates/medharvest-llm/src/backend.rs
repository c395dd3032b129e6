//! LLM backend trait and the OpenAI-compatible implementation.
//!
//! Backends:
//!   OpenAiCompatibleBackend: any `{base}/chat/completions` endpoint with
//!                             bearer auth (GLM / Zhipu, OpenAI, vLLM, …)

use std::time::Duration;

use async_trait::async_trait;
use medharvest_common::backoff::RetryPolicy;
use medharvest_common::harvest_config::RemoteTierConfig;
use medharvest_common::sandbox::SandboxClient;
use medharvest_common::RetryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Retry(#[from] RetryError),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend misconfigured: {0}")]
    Config(String),
    #[error("Empty completion from {0}")]
    EmptyResponse(String),
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    /// Tier label used in logs ("glm", "openai", …).
    fn name(&self) -> &str;
    fn model_id(&self) -> &str;
}

// ── Helper: parse OpenAI-style response ──────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

// ── OpenAI-compatible ─────────────────────────────────────────────────────────

pub struct OpenAiCompatibleBackend {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    api_key: Option<String>,
    client: SandboxClient,
    retry: RetryPolicy,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, LlmError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut client = SandboxClient::new().map_err(|e| LlmError::Config(e.to_string()))?;
        client.allow_url(&base_url).map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url,
            model: model.into(),
            max_tokens: 3000,
            temperature: 0.0,
            api_key,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Build a backend from one configured extraction tier.
    pub fn from_tier(tier: &RemoteTierConfig, retry: RetryPolicy) -> Result<Self, LlmError> {
        let mut backend = Self::new(&tier.name, &tier.base_url, &tier.model, tier.api_key.clone())?
            .with_retry(retry)
            .with_max_tokens(tier.max_tokens)
            .with_temperature(tier.temperature);

        let mut client = SandboxClient::with_timeout(Duration::from_secs(tier.timeout_secs))
            .map_err(|e| LlmError::Config(e.to_string()))?;
        client.allow_url(&backend.base_url).map_err(|e| LlmError::Config(e.to_string()))?;
        backend.client = client;
        Ok(backend)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k),
            None    => req,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(self.max_tokens),
            "temperature": req.temperature.unwrap_or(self.temperature),
        });

        let what = format!("{} chat completion", self.name);
        let resp = self
            .retry
            .send(&what, || Ok(self.auth(self.client.post(&url)?).json(&body)))
            .await?;

        let json: serde_json::Value = resp.json().await?;
        let parsed = parse_openai_response(&json, &self.model);
        if parsed.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse(self.name.clone()));
        }

        debug!(
            backend = %self.name,
            model = %parsed.model,
            prompt_tokens = parsed.prompt_tokens,
            completion_tokens = parsed.completion_tokens,
            "Completion received"
        );
        Ok(parsed)
    }

    fn name(&self) -> &str { &self.name }
    fn model_id(&self) -> &str { &self.model }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "model": "glm-4-flash",
            "choices": [{"message": {"role": "assistant", "content": "{\"models\": \"CNN\"}"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30}
        });
        let r = parse_openai_response(&json, "fallback");
        assert_eq!(r.content, "{\"models\": \"CNN\"}");
        assert_eq!(r.model, "glm-4-flash");
        assert_eq!(r.prompt_tokens, 120);
        assert_eq!(r.completion_tokens, 30);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let r = parse_openai_response(&serde_json::json!({}), "gpt-3.5-turbo");
        assert_eq!(r.content, "");
        assert_eq!(r.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let b = OpenAiCompatibleBackend::new(
            "glm",
            "https://open.bigmodel.cn/api/paas/v4/",
            "glm-4-flash",
            Some("key".to_string()),
        )
        .unwrap();
        assert_eq!(b.base_url, "https://open.bigmodel.cn/api/paas/v4");
        assert_eq!(b.model_id(), "glm-4-flash");
        assert_eq!(b.name(), "glm");
    }

    #[test]
    fn test_custom_endpoint_is_allowlisted() {
        let b = OpenAiCompatibleBackend::new("vllm", "https://llm.lab.internal/v1", "m", None).unwrap();
        assert!(b.client.is_allowed("https://llm.lab.internal/v1/chat/completions"));
    }

    #[test]
    fn test_from_tier_carries_settings() {
        let mut tier = RemoteTierConfig::new("openai", "https://api.openai.com/v1", "gpt-3.5-turbo");
        tier.max_tokens = 2000;
        tier.api_key = Some("sk-test".to_string());
        let retry = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));
        let b = OpenAiCompatibleBackend::from_tier(&tier, retry.clone()).unwrap();
        assert_eq!(b.max_tokens, 2000);
        assert_eq!(b.retry, retry);
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::user("u").role, "user");
    }
}
