use crate::llm_provider::*;
use anyhow::{anyhow, Result};
use reasongraph_core::LLMConfig;
use std::sync::Arc;

#[cfg(feature = "openai-llm")]
use crate::openai_llm_provider::{OpenAIConfig, OpenAIProvider};

/// Builds the `LLMProvider` named by `llm.provider`.
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    pub fn create_from_config(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let name = config.provider.to_lowercase();
        match name.as_str() {
            #[cfg(feature = "openai-llm")]
            "openai" => Self::openai(config),
            _ => {
                let available = Self::supported_providers();
                Err(anyhow!(
                    "Unsupported LLM provider: {} (available: {})",
                    name,
                    if available.is_empty() {
                        "none; enable the openai-llm feature".to_string()
                    } else {
                        available.join(", ")
                    }
                ))
            }
        }
    }

    #[cfg(feature = "openai-llm")]
    fn openai(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let openai = OpenAIConfig::from_llm_config(config);
        if openai.api_key.is_empty() {
            return Err(anyhow!("No OpenAI API key: set llm.api_key or OPENAI_API_KEY"));
        }
        Ok(Arc::new(OpenAIProvider::new(openai)?))
    }

    pub async fn check_availability(provider: &Arc<dyn LLMProvider>) -> bool {
        provider.is_available().await
    }

    /// Providers compiled into this build.
    pub fn supported_providers() -> Vec<&'static str> {
        [
            #[cfg(feature = "openai-llm")]
            "openai",
        ]
        .into_iter()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let config = LLMConfig {
            provider: "oracle-of-delphi".to_string(),
            ..Default::default()
        };
        let err = LLMProviderFactory::create_from_config(&config)
            .err()
            .expect("unknown provider must fail");
        assert!(err.to_string().contains("oracle-of-delphi"));
    }

    #[cfg(feature = "openai-llm")]
    #[test]
    fn openai_is_listed_when_enabled() {
        assert!(LLMProviderFactory::supported_providers().contains(&"openai"));
    }
}
