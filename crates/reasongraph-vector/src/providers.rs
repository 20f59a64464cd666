use crate::VectorError;
use async_trait::async_trait;
use reasongraph_core::{EmbeddingConfig, ReasonGraphError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Text embedding service. Called with non-empty batches; returns one vector
/// per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension for this provider
    fn embedding_dimension(&self) -> usize;

    /// Get provider name for identification
    fn provider_name(&self) -> &str;
}

/// Build the provider named in the configuration.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider_name = config.provider.to_lowercase();

    match provider_name.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbeddingProvider::new(config.dimension))),
        #[cfg(feature = "openai")]
        "openai" => {
            let openai = crate::OpenAiConfig::from_embedding_config(config);
            Ok(Arc::new(crate::OpenAiEmbeddingProvider::new(openai)?))
        }
        _ => Err(ReasonGraphError::Configuration(format!(
            "Unsupported embedding provider: {}. Available providers: hashing{}",
            provider_name,
            if cfg!(feature = "openai") {
                ", openai"
            } else {
                ""
            }
        ))),
    }
}

/// Offline provider: bag-of-words feature hashing into a fixed dimension.
///
/// Texts sharing vocabulary get similar vectors, which is enough for dry runs
/// without network access.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = simple_hash(&token.to_lowercase());
            let slot = (hash as usize) % self.dimension;
            // High bit picks the sign so collisions tend to cancel
            let sign = if (hash >> 31) & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

/// Provider backed by precomputed vectors keyed by exact text.
///
/// Unknown texts are an error, so a run never silently embeds something it
/// has no vector for.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingProvider {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
    calls: AtomicUsize,
    fail: bool,
}

impl InMemoryEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    pub fn insert(&mut self, text: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(text.into(), vector);
    }

    /// Make every call fail, for exercising the no-partial-results path.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of batches requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for InMemoryEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VectorError::Embedding("embedding service unavailable".to_string()).into());
        }
        texts
            .iter()
            .map(|text| {
                self.vectors.get(text).cloned().ok_or_else(|| {
                    ReasonGraphError::from(VectorError::Embedding(format!(
                        "no vector for text: {}",
                        text
                    )))
                })
            })
            .collect()
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "in-memory"
    }
}

fn simple_hash(text: &str) -> u32 {
    let mut hash = 5381u32;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u32);
    }
    hash
}
