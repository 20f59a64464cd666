use crate::llm_provider::*;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reasongraph_core::LLMConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";

/// Settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Extra attempts after the first failed one
    pub max_retries: u32,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl OpenAIConfig {
    /// Take the `[llm]` section, falling back to `OPENAI_API_KEY` for the key.
    pub fn from_llm_config(config: &LLMConfig) -> Self {
        Self {
            api_key: config
                .api_key
                .clone()
                .unwrap_or_else(|| Self::default().api_key),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    model: Option<String>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct TokenUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

/// Chat completions client used behind the equivalence judge.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            bail!("OpenAI API key is empty; set llm.api_key or OPENAI_API_KEY");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for OpenAI")?;
        Ok(Self { config, client })
    }

    /// 1s, 2s, 4s, ... before retry `attempt` (1-based).
    fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(1u64 << (attempt - 1).min(6))
    }

    async fn complete(&self, messages: &[Message], config: &GenerationConfig) -> Result<Completion> {
        let attempts = self.config.max_retries + 1;
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(Self::backoff(attempt)).await;
            }
            attempt += 1;

            match self.post_once(messages, config).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Chat completion attempt {}/{} failed: {:#}",
                        attempt, attempts, e
                    );
                }
                Err(e) => {
                    return Err(e.context(format!("Chat completion failed after {} attempts", attempts)))
                }
            }
        }
    }

    async fn post_once(&self, messages: &[Message], config: &GenerationConfig) -> Result<Completion> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            stop: config.stop.as_deref(),
        };

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("Chat completion request could not be sent")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Chat completion body could not be read")?;
        if !status.is_success() {
            bail!("Chat completion returned {}: {}", status, text);
        }

        debug!(model = %self.config.model, body = %text, "Chat completion response");
        serde_json::from_str(&text)
            .with_context(|| format!("Unexpected chat completion body: {}", text))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let started = Instant::now();
        let completion = self.complete(messages, config).await?;
        let usage = completion.usage;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Chat completion has no choices"))?;
        debug!("Chat completion took {:?}", started.elapsed());

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            total_tokens: usage.map(|u| u.total_tokens),
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
            finish_reason: choice.finish_reason,
            model: completion
                .model
                .unwrap_or_else(|| self.config.model.clone()),
        })
    }

    async fn is_available(&self) -> bool {
        let ping = GenerationConfig {
            max_tokens: Some(1),
            ..Default::default()
        };
        self.generate_with_config("ping", &ping).await.is_ok()
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_comes_from_llm_section() {
        let section = LLMConfig {
            api_key: Some("sk-test".to_string()),
            api_base: "https://example.invalid/v1/".to_string(),
            max_retries: 1,
            ..Default::default()
        };
        let config = OpenAIConfig::from_llm_config(&section);
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.completions_url(), "https://example.invalid/v1/chat/completions");
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn empty_key_is_rejected() {
        let config = OpenAIConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(OpenAIProvider::new(config).is_err());
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(OpenAIProvider::backoff(1), Duration::from_secs(1));
        assert_eq!(OpenAIProvider::backoff(2), Duration::from_secs(2));
        assert_eq!(OpenAIProvider::backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn request_omits_unset_options() {
        let messages = vec![Message::user("hi")];
        let request = CompletionRequest {
            model: "gpt-4",
            messages: &messages,
            temperature: 0.1,
            max_tokens: Some(10),
            top_p: None,
            stop: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 10);
        assert!(json.get("top_p").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn completion_body_parses() {
        let body = r#"{"model": "gpt-4", "choices": [{"message": {"content": "TRUE"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}}"#;
        let completion: Completion = serde_json::from_str(body).unwrap();
        assert_eq!(completion.choices[0].message.content.as_deref(), Some("TRUE"));
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(6));
    }
}
