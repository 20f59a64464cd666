use crate::{EmbeddingProvider, VectorError};
use reasongraph_core::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100;

/// Splits texts into provider-sized batches and validates what comes back.
///
/// Batches are sent one after another. Any failed batch, short response or
/// dimension change aborts the whole call; callers never see a partial set.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_batch_size(provider, DEFAULT_EMBEDDING_BATCH_SIZE)
    }

    pub fn with_batch_size(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut dimension: Option<usize> = None;

        for batch in texts.chunks(self.batch_size) {
            let vectors = self.provider.embed(batch).await?;
            if vectors.len() != batch.len() {
                return Err(VectorError::BatchSizeMismatch(batch.len(), vectors.len()).into());
            }
            for vector in vectors {
                if vector.is_empty() {
                    return Err(VectorError::EmptyVector.into());
                }
                match dimension {
                    Some(expected) if expected != vector.len() => {
                        return Err(
                            VectorError::DimensionMismatch(expected, vector.len()).into()
                        );
                    }
                    Some(_) => {}
                    None => dimension = Some(vector.len()),
                }
                embeddings.push(vector);
            }
            debug!(
                "Embedded batch of {} texts via {}",
                batch.len(),
                self.provider.provider_name()
            );
        }

        info!(
            "Generated {} embeddings with {} in {:?}",
            embeddings.len(),
            self.provider.provider_name(),
            start.elapsed()
        );
        Ok(embeddings)
    }
}

/// Scale `vector` to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
