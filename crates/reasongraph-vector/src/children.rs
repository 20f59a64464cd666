use crate::{cosine_similarity, solve_assignment};
use ndarray::Array2;
use reasongraph_core::Result;
use tracing::debug;

/// Structural similarity of two child sets.
///
/// Children are matched one-to-one so the total cosine similarity is
/// maximal. The mean similarity of the matched pairs is then scaled by
/// `min(m, n) / max(m, n)`, so unmatched children pull the score down.
/// A child without an embedding scores 0 against everything but still
/// counts toward the set size.
///
/// Both sets empty gives 1.0; exactly one empty gives 0.0. The result is
/// always in [0, 1] and does not depend on argument order.
pub fn children_similarity(a: &[Option<&[f32]>], b: &[Option<&[f32]>]) -> Result<f32> {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ok(1.0),
        (true, false) | (false, true) => return Ok(0.0),
        _ => {}
    }

    let similarity = similarity_matrix(a, b);
    let cost = similarity.mapv(|s| 1.0 - s);
    let pairs = solve_assignment(&cost)?;

    let matched = pairs.len();
    let total: f64 = pairs.iter().map(|&(r, c)| similarity[[r, c]]).sum();
    let mean = total / matched as f64;
    let coverage = a.len().min(b.len()) as f64 / a.len().max(b.len()) as f64;
    let score = (mean * coverage).clamp(0.0, 1.0) as f32;

    debug!(
        "Children similarity {:.4} ({} x {} children, {} matched)",
        score,
        a.len(),
        b.len(),
        matched
    );
    Ok(score)
}

fn similarity_matrix(a: &[Option<&[f32]>], b: &[Option<&[f32]>]) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| match (a[i], b[j]) {
        (Some(x), Some(y)) => f64::from(cosine_similarity(x, y)),
        _ => 0.0,
    })
}
