use crate::VectorError;
use ndarray::Array2;

/// Minimum-cost assignment on a rectangular cost matrix.
///
/// Shortest augmenting path variant of the Hungarian method with row and
/// column potentials, O(r²·c) for r ≤ c. Returns exactly `min(rows, cols)`
/// `(row, col)` pairs sorted by row; every row and column appears at most
/// once. Wider-than-tall and taller-than-wide inputs are both accepted.
/// Costs must be finite.
pub fn solve_assignment(cost: &Array2<f64>) -> Result<Vec<(usize, usize)>, VectorError> {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return Ok(Vec::new());
    }
    if let Some(((r, c), _)) = cost.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(VectorError::NonFiniteCost(r, c));
    }

    if rows > cols {
        let transposed = cost.t().to_owned();
        let mut pairs: Vec<(usize, usize)> = solve_rows_le_cols(&transposed)
            .into_iter()
            .map(|(r, c)| (c, r))
            .collect();
        pairs.sort_unstable();
        return Ok(pairs);
    }

    Ok(solve_rows_le_cols(cost))
}

/// Requires `rows <= cols` and finite costs. Indices 1..=n are real rows and
/// columns; index 0 is the virtual column used to start each augmentation.
fn solve_rows_le_cols(cost: &Array2<f64>) -> Vec<(usize, usize)> {
    let (n, m) = cost.dim();
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    // assigned_row[j]: row matched to column j, 0 when free
    let mut assigned_row = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        assigned_row[0] = i;
        let mut j0 = 0usize;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = assigned_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[[i0 - 1, j - 1]] - u[i0] - v[j];
                if reduced < min_slack[j] {
                    min_slack[j] = reduced;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[assigned_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            j0 = j1;
            if assigned_row[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path back to the virtual column
        loop {
            let j1 = way[j0];
            assigned_row[j0] = assigned_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=m)
        .filter(|&j| assigned_row[j] != 0)
        .map(|j| (assigned_row[j] - 1, j - 1))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Total cost of an assignment.
pub fn assignment_cost(cost: &Array2<f64>, pairs: &[(usize, usize)]) -> f64 {
    pairs.iter().map(|&(r, c)| cost[[r, c]]).sum()
}
