//! Pattern similarity.
//!
//! Blends three sub-scores into a bounded `[0, 1]` similarity:
//! - cosine similarity of a 5-feature summary vector (count, durations,
//!   intensity, work/rest), which captures the coarse session shape
//! - DTW distance between the normalized duration sequences
//! - DTW distance between the normalized power sequences
//!
//! The DTW terms keep a pyramid from matching flat repeats with the same
//! count and means.

use crate::Pattern;
use serde::{Deserialize, Serialize};

const COSINE_WEIGHT: f64 = 0.4;
const DTW_DURATION_WEIGHT: f64 = 0.3;
const DTW_POWER_WEIGHT: f64 = 0.3;

/// DTW distance at which duration similarity reaches zero.
const DTW_DURATION_SCALE: f64 = 5.0;
/// DTW distance at which power similarity reaches zero.
const DTW_POWER_SCALE: f64 = 2.0;

// Feature scales bringing each summary feature to a comparable magnitude
const COUNT_SCALE: f64 = 20.0;
const MEAN_DURATION_SCALE: f64 = 3600.0;
const STD_DURATION_SCALE: f64 = 600.0;
const WORK_REST_SCALE: f64 = 5.0;

/// The individual terms of a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityBreakdown {
    pub cosine: f64,
    pub dtw_duration: f64,
    pub dtw_power: f64,
    /// Weighted blend of the three terms, clamped to `[0, 1]`
    pub score: f64,
}

impl SimilarityBreakdown {
    fn zero() -> Self {
        Self { cosine: 0.0, dtw_duration: 0.0, dtw_power: 0.0, score: 0.0 }
    }
}

/// Summary feature vector used for the cosine term.
fn feature_vector(p: &Pattern) -> [f64; 5] {
    [
        p.interval_count as f64 / COUNT_SCALE,
        p.mean_duration / MEAN_DURATION_SCALE,
        p.std_duration / STD_DURATION_SCALE,
        p.mean_power_norm,
        p.work_rest_ratio / WORK_REST_SCALE,
    ]
}

/// Cosine similarity of two vectors. Zero-norm inputs give 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum();
    let norm_b: f64 = b.iter().map(|x| x * x).sum();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    // sqrt of the product keeps cos(v, v) exactly 1
    dot / (norm_a * norm_b).sqrt()
}

/// Dynamic Time Warping distance with absolute-difference local cost.
///
/// Handles sequences of unequal length. Returns `f64::INFINITY` if either
/// sequence is empty.
///
/// ```
/// use workout_matcher::dtw_distance;
/// assert_eq!(dtw_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
/// assert_eq!(dtw_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 2.0, 3.0]), 0.0);
/// assert!(dtw_distance(&[], &[1.0]).is_infinite());
/// ```
pub fn dtw_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }

    let n = a.len();
    let m = b.len();
    let width = m + 1;
    let mut table = vec![f64::INFINITY; (n + 1) * width];
    table[0] = 0.0;

    for i in 1..=n {
        for j in 1..=m {
            let cost = (a[i - 1] - b[j - 1]).abs();
            let best = table[(i - 1) * width + (j - 1)]
                .min(table[(i - 1) * width + j])
                .min(table[i * width + (j - 1)]);
            table[i * width + j] = cost + best;
        }
    }

    table[n * width + m]
}

/// Map a DTW distance onto `[0, 1]`, reaching zero at `scale`.
fn dtw_to_similarity(distance: f64, scale: f64) -> f64 {
    if !distance.is_finite() {
        return 0.0;
    }
    (1.0 - distance / scale).max(0.0)
}

/// Compute the similarity terms for two patterns.
///
/// A missing pattern on either side scores 0 across the board.
pub fn similarity_breakdown(a: Option<&Pattern>, b: Option<&Pattern>) -> SimilarityBreakdown {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return SimilarityBreakdown::zero(),
    };

    let cosine = cosine_similarity(&feature_vector(a), &feature_vector(b)).clamp(0.0, 1.0);
    let dtw_duration = dtw_to_similarity(
        dtw_distance(&a.normalized_durations, &b.normalized_durations),
        DTW_DURATION_SCALE,
    );
    let dtw_power = dtw_to_similarity(
        dtw_distance(&a.normalized_powers, &b.normalized_powers),
        DTW_POWER_SCALE,
    );

    let score = COSINE_WEIGHT * cosine + DTW_DURATION_WEIGHT * dtw_duration + DTW_POWER_WEIGHT * dtw_power;

    SimilarityBreakdown {
        cosine,
        dtw_duration,
        dtw_power,
        score: score.clamp(0.0, 1.0),
    }
}

/// Similarity between two patterns in `[0, 1]`; higher is more similar.
///
/// Symmetric, and exactly 1.0 for a pattern compared with itself.
pub fn similarity(a: Option<&Pattern>, b: Option<&Pattern>) -> f64 {
    similarity_breakdown(a, b).score
}
