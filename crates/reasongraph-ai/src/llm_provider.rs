use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type LLMResult<T> = anyhow::Result<T>;

/// Sampling settings sent with each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: Some(4096),
            top_p: None,
            stop: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        })
    }
}

/// Completion text plus whatever accounting the backend reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub total_tokens: Option<usize>,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
    /// "stop", "length", ...
    pub finish_reason: Option<String>,
    pub model: String,
}

impl LLMResponse {
    /// Response carrying only text, for providers that report nothing else.
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            total_tokens: None,
            prompt_tokens: None,
            completion_tokens: None,
            finish_reason: None,
            model: model.into(),
        }
    }
}

/// A chat-style text generation backend.
///
/// Implementors supply `generate_chat`; single-prompt calls are wrapped into
/// one user message.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> LLMResult<LLMResponse> {
        self.generate_with_config(prompt, &GenerationConfig::default())
            .await
    }

    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        self.generate_chat(&[Message::user(prompt)], config).await
    }

    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse>;

    /// Cheap reachability check.
    async fn is_available(&self) -> bool;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoProvider {
        seen: Mutex<Vec<(MessageRole, String, f32)>>,
    }

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn generate_chat(
            &self,
            messages: &[Message],
            config: &GenerationConfig,
        ) -> LLMResult<LLMResponse> {
            let mut seen = self.seen.lock().unwrap();
            for m in messages {
                seen.push((m.role, m.content.clone(), config.temperature));
            }
            Ok(LLMResponse::text(
                messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                "echo",
            ))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn provider_name(&self) -> &str {
            "echo"
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn generate_wraps_prompt_as_user_message() {
        let provider = EchoProvider {
            seen: Mutex::new(Vec::new()),
        };
        let config = GenerationConfig {
            temperature: 0.7,
            ..Default::default()
        };
        let response =
            tokio_test::block_on(provider.generate_with_config("hello", &config)).unwrap();
        assert_eq!(response.content, "hello");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (MessageRole::User, "hello".to_string(), 0.7));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::system("x")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"x"}"#);
        assert_eq!(MessageRole::User.to_string(), "user");
    }
}
