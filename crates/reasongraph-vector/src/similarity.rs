use reasongraph_core::{AnalysisConfig, DEFAULT_DOMINANT_NODE_WEIGHT, DEFAULT_NODE_WEIGHT};

/// Cosine similarity of two vectors; 0.0 when either is zero or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Weights for fusing node-level and children-level similarity.
///
/// The node signal gets `dominant_node_weight` when it is strictly larger
/// than the children signal and `default_node_weight` otherwise; the children
/// signal gets the remainder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityWeights {
    pub dominant_node_weight: f32,
    pub default_node_weight: f32,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            dominant_node_weight: DEFAULT_DOMINANT_NODE_WEIGHT,
            default_node_weight: DEFAULT_NODE_WEIGHT,
        }
    }
}

impl From<&AnalysisConfig> for SimilarityWeights {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            dominant_node_weight: config.dominant_node_weight,
            default_node_weight: config.default_node_weight,
        }
    }
}

impl SimilarityWeights {
    /// `(node_weight, children_weight)` for the given pair of scores.
    pub fn weights_for(&self, node_similarity: f32, children_similarity: f32) -> (f32, f32) {
        let node_weight = if node_similarity > children_similarity {
            self.dominant_node_weight
        } else {
            self.default_node_weight
        };
        (node_weight, 1.0 - node_weight)
    }

    /// Fuse the two scores into one in [0, 1].
    ///
    /// With both scores positive this is `2 / (w_n/s_n + w_c/s_c)`, capped at
    /// 1.0; with either score zero it is the weighted arithmetic mean. Inputs
    /// are clamped to [0, 1] first.
    pub fn combine(&self, node_similarity: f32, children_similarity: f32) -> f32 {
        let node = clamp_unit(node_similarity);
        let children = clamp_unit(children_similarity);

        if node + children == 0.0 {
            return 0.0;
        }

        let (node_weight, children_weight) = self.weights_for(node, children);

        if node == 0.0 || children == 0.0 {
            return clamp_unit(node_weight * node + children_weight * children);
        }

        clamp_unit(2.0 / (node_weight / node + children_weight / children))
    }
}

/// Combine with the default weights.
pub fn combine_similarities(node_similarity: f32, children_similarity: f32) -> f32 {
    SimilarityWeights::default().combine(node_similarity, children_similarity)
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn both_zero_is_zero() {
        assert_eq!(combine_similarities(0.0, 0.0), 0.0);
    }

    #[test]
    fn zero_component_uses_weighted_mean() {
        // Node signal is stronger, so it carries 0.7
        assert_relative_eq!(combine_similarities(0.9, 0.0), 0.63, epsilon = 1e-6);
        // Node signal is weaker, so it carries 0.6 and children 0.4
        assert_relative_eq!(combine_similarities(0.0, 0.9), 0.36, epsilon = 1e-6);
    }

    #[test]
    fn positive_inputs_use_doubled_harmonic_form() {
        let expected = 2.0 / (0.7 / 0.5 + 0.3 / 0.4);
        assert_relative_eq!(combine_similarities(0.5, 0.4), expected, epsilon = 1e-6);
        assert!(combine_similarities(0.5, 0.4) > 0.85);

        // Node signal weaker: 0.6 / 0.4
        let expected = 2.0 / (0.6 / 0.2 + 0.4 / 0.3);
        assert_relative_eq!(combine_similarities(0.2, 0.3), expected, epsilon = 1e-6);
    }

    #[test]
    fn high_scores_saturate_at_one() {
        assert_eq!(combine_similarities(0.95, 0.92), 1.0);
        assert_eq!(combine_similarities(1.0, 1.0), 1.0);
    }

    #[test]
    fn equal_inputs_double_until_capped() {
        for s in [0.1f32, 0.3, 0.45] {
            assert_relative_eq!(combine_similarities(s, s), 2.0 * s, epsilon = 1e-6);
        }
        for s in [0.5f32, 0.85] {
            assert_eq!(combine_similarities(s, s), 1.0);
        }
    }

    #[test]
    fn output_stays_in_unit_interval() {
        let steps: Vec<f32> = (0..=20).map(|i| i as f32 / 20.0).collect();
        for &a in &steps {
            for &b in &steps {
                let c = combine_similarities(a, b);
                assert!((0.0..=1.0).contains(&c), "combine({}, {}) = {}", a, b, c);
            }
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        assert_eq!(combine_similarities(-0.3, 0.0), 0.0);
        assert_relative_eq!(combine_similarities(1.2, 1.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn custom_weights_apply() {
        let weights = SimilarityWeights {
            dominant_node_weight: 0.8,
            default_node_weight: 0.5,
        };
        assert_eq!(weights.weights_for(0.9, 0.1), (0.8, 1.0 - 0.8));
        assert_eq!(weights.weights_for(0.1, 0.9), (0.5, 0.5));
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_relative_eq!(cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]), 1.0, epsilon = 1e-6);
    }
}
