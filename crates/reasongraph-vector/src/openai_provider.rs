use crate::EmbeddingProvider;
use async_trait::async_trait;
use reasongraph_core::{EmbeddingConfig, ReasonGraphError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for OpenAI embedding provider
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub dimension: usize,
    pub max_retries: usize,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: "text-embedding-3-small".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            dimension: 1536,
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl OpenAiConfig {
    pub fn from_embedding_config(config: &EmbeddingConfig) -> Self {
        let defaults = Self::default();
        Self {
            api_key: config.api_key.clone().unwrap_or(defaults.api_key),
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            dimension: config.dimension,
            max_retries: defaults.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// OpenAI `/embeddings` client with retry and exponential backoff.
pub struct OpenAiEmbeddingProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ReasonGraphError::Configuration(
                "OpenAI API key is required. Set OPENAI_API_KEY environment variable.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("ReasonGraph/1.0")
            .build()
            .map_err(|e| ReasonGraphError::External(e.to_string()))?;

        Ok(Self { config, client })
    }

    async fn call_api(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
            encoding_format: "float",
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt as u32));
                tokio::time::sleep(delay).await;
            }

            let request_result = timeout(
                self.config.timeout,
                self.client
                    .post(format!("{}/embeddings", self.config.api_base))
                    .bearer_auth(&self.config.api_key)
                    .json(&request)
                    .send(),
            )
            .await;

            match request_result {
                Ok(Ok(response)) if response.status().is_success() => {
                    match response.json::<EmbeddingResponse>().await {
                        Ok(parsed) => {
                            debug!(
                                "OpenAI embeddings call returned {} vectors ({} tokens)",
                                parsed.data.len(),
                                parsed.usage.as_ref().map_or(0, |u| u.total_tokens)
                            );
                            return Ok(parsed);
                        }
                        Err(e) => {
                            last_error = Some(ReasonGraphError::Embedding(format!(
                                "Failed to parse response: {}",
                                e
                            )));
                        }
                    }
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    last_error = Some(match response.json::<ApiError>().await {
                        Ok(api_error) => ReasonGraphError::Embedding(format!(
                            "OpenAI API error: {} ({})",
                            api_error.error.message,
                            api_error.error.error_type.unwrap_or_default()
                        )),
                        Err(_) => {
                            ReasonGraphError::Embedding(format!("OpenAI API error: HTTP {}", status))
                        }
                    });
                }
                Ok(Err(e)) => {
                    last_error = Some(ReasonGraphError::Embedding(format!(
                        "Request failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    last_error = Some(ReasonGraphError::Embedding(
                        "OpenAI API request timed out".to_string(),
                    ));
                }
            }

            if attempt < self.config.max_retries {
                warn!(
                    "OpenAI embeddings call failed (attempt {}/{}), retrying...",
                    attempt + 1,
                    self.config.max_retries + 1
                );
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ReasonGraphError::Embedding("All OpenAI API retry attempts failed".to_string())
        }))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.call_api(texts).await?;

        // The API may return items out of order
        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        info!("Embedded {} texts with {}", data.len(), self.config.model);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_derived_from_embedding_section() {
        let section = EmbeddingConfig {
            api_key: Some("sk-test".to_string()),
            api_base: "http://localhost:8080/v1/".to_string(),
            timeout_secs: 5,
            ..Default::default()
        };
        let config = OpenAiConfig::from_embedding_config(&section);
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.model, "text-embedding-3-small");
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let config = OpenAiConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            OpenAiEmbeddingProvider::new(config),
            Err(ReasonGraphError::Configuration(_))
        ));
    }
}
