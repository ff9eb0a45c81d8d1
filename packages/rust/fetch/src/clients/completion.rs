//! LLM completion client (OpenRouter-style chat completions).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use glossgen_shared::config::CompletionSettings;
use glossgen_shared::{GlossgenError, ResourceKind, Result};

use super::{USER_AGENT, Upstream};

/// Runtime completion client configuration with the resolved API key.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// API key resolved from the environment at startup.
    pub api_key: String,
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Model ID sent with each request.
    pub model: String,
    /// Per-request timeout. Drafting long entries can be slow.
    pub timeout: Duration,
}

impl CompletionConfig {
    /// Build a runtime config from settings plus a resolved API key.
    /// `model` overrides the configured default when set.
    pub fn from_settings(
        settings: &CompletionSettings,
        api_key: String,
        model: Option<String>,
    ) -> Self {
        Self {
            api_key,
            endpoint: settings.endpoint.clone(),
            model: model.unwrap_or_else(|| settings.default_model.clone()),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Client for LLM completions, keyed by prompt.
pub struct CompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionClient {
    /// Create a new completion client with the given configuration.
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                GlossgenError::upstream(None, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Model ID this client sends with each request.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

/// Response shape for the chat-completions endpoint.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

#[async_trait]
impl Upstream for CompletionClient {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Completion
    }

    async fn fetch(&self, key: &str) -> Result<String> {
        debug!(model = %self.config.model, prompt_len = key.len(), "completion request");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "messages": [{"role": "user", "content": key}],
            }))
            .send()
            .await
            .map_err(|e| {
                GlossgenError::upstream(e.status().map(|s| s.as_u16()), format!("completion: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GlossgenError::upstream(
                Some(status.as_u16()),
                format!("completion: HTTP {status}"),
            ));
        }

        let body: CompletionResponse = response.json().await.map_err(|e| {
            GlossgenError::parse(format!("completion: invalid response: {e}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GlossgenError::parse("completion: response had no choices"))
    }
}
