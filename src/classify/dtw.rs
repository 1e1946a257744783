//! Elastic alignment distance between temporal profiles.
//!
//! Classic dynamic-programming edit distance over real-valued sequences:
//! each cell pays `|aᵢ − bⱼ|` plus the cheapest of insert, delete, or match.
//! The final cost is normalised by `n + m` so profiles of different lengths
//! remain comparable.

/// Elastic alignment distance between two sequences.
///
/// Returns 0.0 when both sequences are empty and `f32::INFINITY` when
/// exactly one is (nothing can align against nothing).
pub fn elastic_distance(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let m = b.len();
    if n == 0 && m == 0 {
        return 0.0;
    }
    if n == 0 || m == 0 {
        return f32::INFINITY;
    }

    // (n+1) × (m+1) cost matrix, flattened row-major.
    let width = m + 1;
    let mut cost = vec![f32::INFINITY; (n + 1) * width];
    cost[0] = 0.0;

    for i in 1..=n {
        for j in 1..=m {
            let diff = (a[i - 1] - b[j - 1]).abs();
            let insert = cost[(i - 1) * width + j];
            let delete = cost[i * width + (j - 1)];
            let matched = cost[(i - 1) * width + (j - 1)];
            cost[i * width + j] = diff + insert.min(delete).min(matched);
        }
    }

    cost[n * width + m] / (n + m) as f32
}
