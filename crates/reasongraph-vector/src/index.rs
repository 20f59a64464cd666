use crate::{normalize_l2, VectorError};
use ndarray::{ArrayView1, ArrayView2};
use reasongraph_core::{NodeId, Result};
use std::collections::HashMap;
use tracing::{debug, info};

#[cfg(feature = "faiss")]
use faiss::{index::IndexImpl, Index, MetricType};
#[cfg(feature = "faiss")]
use parking_lot::Mutex;

/// Exact inner-product index over unit-normalized vectors keyed by node id.
///
/// Because every stored vector is normalized, inner product equals cosine
/// similarity. Vectors are kept in one row-major buffer so lookups and the
/// flat scan share the same storage. With the `faiss` feature the scan runs
/// on a FAISS `Flat` index instead.
pub struct EmbeddingIndex {
    ids: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
    data: Vec<f32>,
    dimension: usize,
    #[cfg(feature = "faiss")]
    faiss: Option<Mutex<IndexImpl>>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("len", &self.ids.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl EmbeddingIndex {
    /// Normalize and index the given vectors. Every vector must share one
    /// dimension; duplicate ids are rejected.
    pub fn build(entries: Vec<(NodeId, Vec<f32>)>) -> Result<Self> {
        let dimension = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut ids = Vec::with_capacity(entries.len());
        let mut positions = HashMap::with_capacity(entries.len());
        let mut data = Vec::with_capacity(entries.len() * dimension);

        for (id, mut vector) in entries {
            if vector.is_empty() {
                return Err(VectorError::EmptyVector.into());
            }
            if vector.len() != dimension {
                return Err(VectorError::DimensionMismatch(dimension, vector.len()).into());
            }
            if positions.contains_key(&id) {
                return Err(VectorError::InvalidOperation(format!(
                    "duplicate id in index: {}",
                    id
                ))
                .into());
            }
            normalize_l2(&mut vector);
            positions.insert(id.clone(), ids.len());
            ids.push(id);
            data.extend_from_slice(&vector);
        }

        #[cfg(feature = "faiss")]
        let faiss = Self::build_faiss(&data, dimension)?;

        info!(
            "Built embedding index with {} vectors (dimension {})",
            ids.len(),
            dimension
        );

        Ok(Self {
            ids,
            positions,
            data,
            dimension,
            #[cfg(feature = "faiss")]
            faiss,
        })
    }

    #[cfg(feature = "faiss")]
    fn build_faiss(data: &[f32], dimension: usize) -> Result<Option<Mutex<IndexImpl>>> {
        if data.is_empty() {
            return Ok(None);
        }
        let mut index = faiss::index_factory(dimension as u32, "Flat", MetricType::InnerProduct)
            .map_err(|e| VectorError::Search(format!("Failed to create index: {}", e)))?;
        index
            .add(data)
            .map_err(|e| VectorError::Search(format!("Failed to add vectors: {}", e)))?;
        Ok(Some(Mutex::new(index)))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Normalized vector stored for `id`.
    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        let position = *self.positions.get(id)?;
        Some(self.row(position))
    }

    fn row(&self, position: usize) -> &[f32] {
        &self.data[position * self.dimension..(position + 1) * self.dimension]
    }

    /// Cosine similarity between two indexed vectors.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        let va = self
            .vector(a)
            .ok_or_else(|| VectorError::NotIndexed(a.to_string()))?;
        let vb = self
            .vector(b)
            .ok_or_else(|| VectorError::NotIndexed(b.to_string()))?;
        Ok(ArrayView1::from(va).dot(&ArrayView1::from(vb)))
    }

    /// Top `k` vectors by inner product with `query` (normalized first).
    /// Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(NodeId, f32)>> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch(self.dimension, query.len()).into());
        }
        let mut query = query.to_vec();
        normalize_l2(&mut query);
        let hits = self.scan(&query, k, None)?;
        Ok(hits
            .into_iter()
            .map(|(position, score)| (self.ids[position].clone(), score))
            .collect())
    }

    /// Top `k` neighbours of an indexed node, never including the node itself.
    pub fn nearest_to(&self, id: &str, k: usize) -> Result<Vec<(NodeId, f32)>> {
        let position = *self
            .positions
            .get(id)
            .ok_or_else(|| VectorError::NotIndexed(id.to_string()))?;
        let query = self.row(position).to_vec();
        let hits = self.scan(&query, k, Some(position))?;
        debug!("{} nearest neighbours for {}", hits.len(), id);
        Ok(hits
            .into_iter()
            .map(|(position, score)| (self.ids[position].clone(), score))
            .collect())
    }

    #[cfg(not(feature = "faiss"))]
    fn scan(&self, query: &[f32], k: usize, exclude: Option<usize>) -> Result<Vec<(usize, f32)>> {
        self.flat_scan(query, k, exclude)
    }

    #[cfg(feature = "faiss")]
    fn scan(&self, query: &[f32], k: usize, exclude: Option<usize>) -> Result<Vec<(usize, f32)>> {
        let Some(index) = self.faiss.as_ref() else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        // One extra hit so the excluded row can be dropped
        let fetch = (k + usize::from(exclude.is_some())).min(self.ids.len());
        let result = index
            .lock()
            .search(query, fetch)
            .map_err(|e| VectorError::Search(format!("Search failed: {}", e)))?;

        let mut hits: Vec<(usize, f32)> = result
            .distances
            .into_iter()
            .zip(result.labels)
            .filter_map(|(score, label)| label.get().map(|l| (l as usize, score)))
            .filter(|(position, _)| Some(*position) != exclude)
            .collect();
        hits.truncate(k);
        Ok(hits)
    }

    #[cfg_attr(feature = "faiss", allow(dead_code))]
    fn flat_scan(
        &self,
        query: &[f32],
        k: usize,
        exclude: Option<usize>,
    ) -> Result<Vec<(usize, f32)>> {
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let matrix = ArrayView2::from_shape((self.ids.len(), self.dimension), &self.data)
            .map_err(|e| VectorError::Search(e.to_string()))?;
        let scores = matrix.dot(&ArrayView1::from(query));

        let mut hits: Vec<(usize, f32)> = scores
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != exclude)
            .map(|(position, &score)| (position, score))
            .collect();
        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}
