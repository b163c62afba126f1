//! Banding shared by the forest and threshold indexes.
//!
//! A signature of `P` values is cut into `b` contiguous bands of `r` rows.
//! Two signatures with Jaccard `s` share a given band with probability `s^r`,
//! and at least one of `b` bands with probability `1 - (1 - s^r)^b`.

use xxhash_rust::xxh3::xxh3_64;

/// Banding shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BandParams {
    pub bands: usize,
    pub rows: usize,
}

impl BandParams {
    /// Probability that two signatures with similarity `s` collide in some band.
    pub fn collision_probability(&self, s: f64) -> f64 {
        collision_probability(s, self.bands, self.rows)
    }

    /// Similarity at which the S-curve is steepest, `(1/b)^(1/r)`.
    pub fn approximate_threshold(&self) -> f64 {
        (1.0 / self.bands as f64).powf(1.0 / self.rows as f64)
    }

    /// Non-empty shape using at most `num_perm` values.
    pub fn fits(&self, num_perm: usize) -> bool {
        self.bands > 0
            && self.rows > 0
            && self
                .bands
                .checked_mul(self.rows)
                .is_some_and(|width| width <= num_perm)
    }

    /// Band `idx` of `values`.
    pub fn band<'a>(&self, values: &'a [u64], idx: usize) -> &'a [u64] {
        &values[idx * self.rows..(idx + 1) * self.rows]
    }
}

/// Hash a band to a bucket key.
///
/// Stable across processes and platforms so persisted indexes stay valid.
pub fn hash_band(values: &[u64]) -> u64 {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    xxh3_64(&bytes)
}

pub fn collision_probability(s: f64, bands: usize, rows: usize) -> f64 {
    1.0 - (1.0 - s.powi(rows as i32)).powi(bands as i32)
}

const INTEGRATION_STEPS: usize = 200;

/// Midpoint rule over `[a, b]`.
fn integrate(f: impl Fn(f64) -> f64, a: f64, b: f64) -> f64 {
    let step = (b - a) / INTEGRATION_STEPS as f64;
    (0..INTEGRATION_STEPS)
        .map(|i| f(a + (i as f64 + 0.5) * step))
        .sum::<f64>()
        * step
}

/// Area under the collision curve below `threshold` (false positives).
fn false_positive_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| collision_probability(s, bands, rows), 0.0, threshold)
}

/// Area above the collision curve beyond `threshold` (false negatives).
fn false_negative_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| 1.0 - collision_probability(s, bands, rows), threshold, 1.0)
}

/// Choose `(b, r)` with `b * r <= num_perm` minimising the weighted sum of
/// false-positive and false-negative areas around `threshold`.
pub fn optimal_params(
    threshold: f64,
    num_perm: usize,
    false_positive_weight: f64,
    false_negative_weight: f64,
) -> BandParams {
    let mut best = BandParams { bands: 1, rows: num_perm.max(1) };
    let mut best_error = f64::MAX;

    for bands in 1..=num_perm {
        for rows in 1..=(num_perm / bands) {
            let fp = false_positive_area(threshold, bands, rows);
            let fn_ = false_negative_area(threshold, bands, rows);
            let error = false_positive_weight * fp + false_negative_weight * fn_;
            if error < best_error {
                best_error = error;
                best = BandParams { bands, rows };
            }
        }
    }
    best
}
