//! # Density Clustering
//!
//! Single-pass DBSCAN over the all-pairs pattern distance matrix
//! (`distance = 1 - similarity`).
//!
//! ## Single-pass noise handling
//! A point whose neighborhood is too small when it is first visited is marked
//! noise and never joins a cluster later, even if it turns out to be a border
//! point of a cluster discovered afterwards. Textbook DBSCAN would re-admit
//! it. Cluster membership depends on this, so it is kept as is.
//!
//! Clusters left with fewer than `min_pts` members (because neighbors were
//! already noise or already claimed) are dissolved.
//!
//! ## Scaling
//! The distance matrix costs O(n²) similarity evaluations, each O(L²) for DTW
//! over sequences of length L. Corpora of a few hundred sessions are fine;
//! larger ones should be bounded by the caller.

use crate::matching::similarity;
use crate::{Pattern, PatternError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Prefix of every derived cluster identifier.
pub const CLUSTER_ID_PREFIX: &str = "cluster_";

/// Configuration for density clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighborhood radius in distance units (`1 - similarity`).
    /// Default: 0.25
    pub eps: f64,

    /// Minimum neighborhood size (self included) for a core point.
    /// Default: 3
    pub min_pts: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { eps: 0.25, min_pts: 3 }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.eps > 0.0 && self.eps <= 1.0) {
            return Err(PatternError::invalid_parameter("eps", self.eps));
        }
        if self.min_pts == 0 {
            return Err(PatternError::invalid_parameter("min_pts", self.min_pts));
        }
        Ok(())
    }
}

/// A group of similar patterns, by position in the clustered input.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Input positions; the first entry is the seed (core point)
    pub indices: Vec<usize>,
    pub patterns: Vec<Pattern>,
}

/// Symmetric n×n pattern distance matrix, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }

    /// All positions within `eps` of `i`, including `i` itself.
    pub fn neighbors(&self, i: usize, eps: f64) -> Vec<usize> {
        let row = &self.values[i * self.size..(i + 1) * self.size];
        row.iter()
            .enumerate()
            .filter(|(_, d)| **d <= eps)
            .map(|(j, _)| j)
            .collect()
    }

    fn from_upper_triangle(size: usize, pairs: Vec<(usize, usize, f64)>) -> Self {
        let mut values = vec![0.0; size * size];
        for (i, j, d) in pairs {
            values[i * size + j] = d;
            values[j * size + i] = d;
        }
        Self { size, values }
    }
}

fn pattern_distance(a: &Pattern, b: &Pattern) -> f64 {
    1.0 - similarity(Some(a), Some(b))
}

/// Compute all pairwise distances once.
#[cfg(not(feature = "parallel"))]
pub fn distance_matrix(patterns: &[Pattern]) -> DistanceMatrix {
    let n = patterns.len();
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j, pattern_distance(&patterns[i], &patterns[j])));
        }
    }
    DistanceMatrix::from_upper_triangle(n, pairs)
}

/// Compute all pairwise distances once, one matrix row per rayon task.
#[cfg(feature = "parallel")]
pub fn distance_matrix(patterns: &[Pattern]) -> DistanceMatrix {
    use rayon::prelude::*;

    let n = patterns.len();
    let pairs: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            ((i + 1)..n).map(move |j| (i, j, pattern_distance(&patterns[i], &patterns[j])))
        })
        .collect();
    DistanceMatrix::from_upper_triangle(n, pairs)
}

/// Run single-pass DBSCAN on a precomputed distance matrix.
///
/// Returns clusters as lists of positions; noise positions appear in none.
pub fn dbscan(matrix: &DistanceMatrix, eps: f64, min_pts: usize) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let mut visited = vec![false; n];
    let mut noise = vec![false; n];
    let mut assigned = vec![false; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let neighbors = matrix.neighbors(i, eps);
        if neighbors.len() < min_pts {
            noise[i] = true;
            continue;
        }

        let mut members = vec![i];
        assigned[i] = true;
        let mut queue: VecDeque<usize> = neighbors.into_iter().collect();

        while let Some(j) = queue.pop_front() {
            if !visited[j] {
                visited[j] = true;
                let expansion = matrix.neighbors(j, eps);
                if expansion.len() >= min_pts {
                    queue.extend(expansion);
                }
            }
            if !assigned[j] && !noise[j] {
                assigned[j] = true;
                members.push(j);
            }
        }

        if members.len() >= min_pts {
            clusters.push(members);
        } else {
            debug!("Dissolving undersized cluster seeded at {} ({} members)", i, members.len());
        }
    }

    clusters
}

/// Cluster patterns with single-pass DBSCAN.
///
/// Deterministic: the same patterns and parameters always yield the same
/// partition, in the same order.
///
/// # Example
/// ```
/// use workout_matcher::{cluster, extract_pattern, ClusterConfig, Interval};
///
/// let make = |minutes: f64, count: usize, watts: f64| {
///     let intervals: Vec<Interval> = (0..count)
///         .map(|i| Interval {
///             work_start: 0.0,
///             work_end: minutes * 60.0,
///             work_duration: minutes * 60.0,
///             rest_duration: if i == 0 { 0.0 } else { 300.0 },
///             avg_power: watts,
///         })
///         .collect();
///     extract_pattern(&intervals, Some(260.0)).unwrap()
/// };
///
/// let patterns = vec![
///     make(20.0, 3, 260.0),
///     make(20.0, 3, 260.0),
///     make(20.0, 3, 260.0),
///     make(1.0, 16, 400.0),
/// ];
/// let clusters = cluster(&patterns, &ClusterConfig::default());
/// assert_eq!(clusters.len(), 1);
/// assert_eq!(clusters[0].indices, vec![0, 1, 2]);
/// ```
pub fn cluster(patterns: &[Pattern], config: &ClusterConfig) -> Vec<Cluster> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let start = std::time::Instant::now();
    let matrix = distance_matrix(patterns);
    let groups = dbscan(&matrix, config.eps, config.min_pts);

    let clustered: usize = groups.iter().map(|g| g.len()).sum();
    info!(
        "Clustered {} patterns into {} clusters ({} noise) in {:?}",
        patterns.len(),
        groups.len(),
        patterns.len() - clustered,
        start.elapsed()
    );

    groups
        .into_iter()
        .map(|indices| Cluster {
            patterns: indices.iter().map(|&i| patterns[i].clone()).collect(),
            indices,
        })
        .collect()
}

/// Stable cluster identifier derived from a cluster's first member.
///
/// The same seed features always give the same id, so repeated clustering
/// runs update existing cluster records instead of creating new ones.
///
/// ```
/// use workout_matcher::{cluster_id_for, extract_pattern, Interval};
///
/// let interval = Interval { work_start: 0.0, work_end: 1200.0, work_duration: 1200.0, rest_duration: 300.0, avg_power: 250.0 };
/// let pattern = extract_pattern(&[interval; 3], Some(250.0)).unwrap();
/// assert_eq!(cluster_id_for(&pattern), "cluster_3300");
/// ```
pub fn cluster_id_for(seed: &Pattern) -> String {
    let signature = (seed.interval_count as f64 * 1000.0
        + (seed.mean_duration / 60.0).round() * 10.0
        + (seed.mean_power_norm * 100.0).round())
    .round()
    .abs();
    format!("{}{}", CLUSTER_ID_PREFIX, signature as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract_pattern, Interval};

    fn repeats(count: usize, seconds: f64, power: f64, rest: f64) -> Pattern {
        let intervals: Vec<Interval> = (0..count)
            .map(|i| Interval {
                work_start: 0.0,
                work_end: seconds,
                work_duration: seconds,
                rest_duration: if i == 0 { 0.0 } else { rest },
                avg_power: power,
            })
            .collect();
        extract_pattern(&intervals, Some(250.0)).unwrap()
    }

    fn matrix(size: usize, close: &[(usize, usize)]) -> DistanceMatrix {
        let mut pairs = Vec::new();
        for i in 0..size {
            for j in (i + 1)..size {
                let d = if close.contains(&(i, j)) { 0.1 } else { 0.9 };
                pairs.push((i, j, d));
            }
        }
        DistanceMatrix::from_upper_triangle(size, pairs)
    }

    #[test]
    fn test_distance_matrix_symmetric_zero_diagonal() {
        let patterns = vec![repeats(3, 1200.0, 250.0, 300.0), repeats(8, 60.0, 380.0, 60.0)];
        let m = distance_matrix(&patterns);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(0, 1), m.get(1, 0));
        assert!(m.get(0, 1) > 0.0);
    }

    #[test]
    fn test_two_separate_clusters() {
        let mut patterns = Vec::new();
        for _ in 0..3 {
            patterns.push(repeats(3, 1200.0, 250.0, 300.0));
        }
        for _ in 0..4 {
            patterns.push(repeats(16, 60.0, 400.0, 60.0));
        }
        let clusters = cluster(&patterns, &ClusterConfig::default());

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].indices, vec![0, 1, 2]);
        assert_eq!(clusters[1].indices, vec![3, 4, 5, 6]);
        assert_eq!(clusters[1].patterns.len(), 4);
    }

    #[test]
    fn test_too_few_points_is_all_noise() {
        let patterns = vec![repeats(3, 1200.0, 250.0, 300.0), repeats(3, 1200.0, 250.0, 300.0)];
        assert!(cluster(&patterns, &ClusterConfig::default()).is_empty());
        assert!(cluster(&[], &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_noise_is_never_readmitted() {
        // 0 is close only to 1; 1, 2, 3 are mutually close.
        // 0 is visited first with 2 neighbors -> noise, then stays out.
        let m = matrix(4, &[(0, 1), (1, 2), (1, 3), (2, 3)]);
        let clusters = dbscan(&m, 0.25, 3);
        assert_eq!(clusters, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_border_point_not_shared() {
        // Cliques {0,1,2,3} and {5,6,7,8}; 4 is a border point of both
        let mut close = Vec::new();
        for clique in [[0, 1, 2, 3], [5, 6, 7, 8]] {
            for a in 0..4 {
                for b in (a + 1)..4 {
                    close.push((clique[a], clique[b]));
                }
            }
        }
        close.push((3, 4));
        close.push((4, 5));
        let m = matrix(9, &close);

        let clusters = dbscan(&m, 0.25, 4);
        assert_eq!(clusters, vec![vec![0, 1, 2, 3, 4], vec![5, 6, 7, 8]]);
    }

    #[test]
    fn test_undersized_cluster_dissolved() {
        // 1 is core via {0,1,2}, but 0 was already noise -> {1,2} is dissolved
        let m = matrix(3, &[(0, 1), (1, 2)]);
        assert!(dbscan(&m, 0.25, 3).is_empty());
    }

    #[test]
    fn test_deterministic_partition() {
        let patterns: Vec<Pattern> = (0..9)
            .map(|i| repeats(3 + (i % 3), 300.0 + i as f64 * 10.0, 250.0, 120.0))
            .collect();
        let config = ClusterConfig::default();
        assert_eq!(cluster(&patterns, &config), cluster(&patterns, &config));
    }

    #[test]
    fn test_config_validation() {
        assert!(ClusterConfig::default().validate().is_ok());
        assert!(ClusterConfig { eps: 0.0, min_pts: 3 }.validate().is_err());
        assert!(ClusterConfig { eps: 1.5, min_pts: 3 }.validate().is_err());
        assert!(ClusterConfig { eps: 0.2, min_pts: 0 }.validate().is_err());
    }

    #[test]
    fn test_cluster_id_signature() {
        let p = repeats(5, 600.0, 290.0, 300.0);
        // 5*1000 + 10min*10 + round(1.16*100)
        assert_eq!(cluster_id_for(&p), "cluster_5216");
    }
}
