//! # Workout Matcher
//!
//! Interval detection, pattern similarity and density clustering for
//! power-based endurance training sessions.
//!
//! This library provides:
//! - Work/rest interval detection from raw power samples
//! - Duration- and intensity-normalized workout patterns
//! - Pattern similarity combining cosine features with Dynamic Time Warping (DTW)
//! - Single-pass DBSCAN clustering with stable cluster identifiers and titles
//!
//! ## Features
//!
//! - **`parallel`** - Compute distance matrices and batch extraction with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use workout_matcher::{detect_intervals, extract_pattern, similarity, DetectionConfig, PowerSample};
//!
//! // 1min easy, then 4 x 2min @ 300W with 1min @ 80W between efforts, sampled at 1Hz
//! let mut samples = Vec::new();
//! let mut t = 0i64;
//! for _ in 0..60 { samples.push(PowerSample::new(t * 1000, 80.0)); t += 1; }
//! for rep in 0..4 {
//!     for _ in 0..120 { samples.push(PowerSample::new(t * 1000, 300.0)); t += 1; }
//!     if rep < 3 {
//!         for _ in 0..60 { samples.push(PowerSample::new(t * 1000, 80.0)); t += 1; }
//!     }
//! }
//!
//! let intervals = detect_intervals(&samples, &DetectionConfig::default());
//! assert_eq!(intervals.len(), 4);
//!
//! let pattern = extract_pattern(&intervals, Some(280.0)).unwrap();
//! assert_eq!(pattern.interval_count, 4);
//! assert!((similarity(Some(&pattern), Some(&pattern)) - 1.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{OptionExt, PatternError, Result};

// Typed power sample adapters for session sources
pub mod source;
pub use source::{DeviceRecord, SampleSource, StreamData};

// Work interval detection
pub mod intervals;
pub use intervals::{clean_samples, detect_intervals, smooth_power, DetectionConfig};

// Pattern extraction
pub mod pattern;
pub use pattern::{extract_pattern, shape_code};

// Pattern similarity (cosine + DTW)
pub mod matching;
pub use matching::{cosine_similarity, dtw_distance, similarity, similarity_breakdown, SimilarityBreakdown};

// Density clustering
pub mod clustering;
pub use clustering::{cluster, cluster_id_for, distance_matrix, Cluster, ClusterConfig, DistanceMatrix};

// Cluster titles
pub mod naming;
pub use naming::{generate_cluster_title, ClusterSummary, TitleRule, TITLE_RULES};

// Session and cluster records
pub mod store;
pub use store::{
    ClusterCentroid, ClusterRecord, ClusterRun, ClusterStore, ExampleWorkout, MemoryStore,
    PatternStore, SessionAssignment, SessionRecord, SessionStore,
};

// Orchestration
pub mod engine;
pub use engine::{
    extract_patterns_batch, ClusterMember, ClusterPlan, ClusterView, ClusteringOutcome, EngineConfig,
    PatternEngine, SimilarSession,
};

// JSON request boundary
pub mod api;
pub use api::{dispatch, ApiReply, ApiRequest};

// ============================================================================
// Core Types
// ============================================================================

/// A single power reading from a training session.
///
/// # Example
/// ```
/// use workout_matcher::PowerSample;
/// let sample = PowerSample::new(1_700_000_000_000, 250.0);
/// assert!(sample.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
    /// Power in watts
    pub watts: f64,
}

impl PowerSample {
    /// Create a new power sample.
    pub fn new(timestamp_ms: i64, watts: f64) -> Self {
        Self { timestamp_ms, watts }
    }

    /// Check if the sample carries usable power.
    pub fn is_valid(&self) -> bool {
        self.watts.is_finite() && self.watts > 0.0
    }
}

/// A contiguous work segment detected in a session.
///
/// All times are elapsed seconds from the first valid sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub work_start: f64,
    pub work_end: f64,
    /// `work_end - work_start`
    pub work_duration: f64,
    /// Gap since the previous retained interval (0 for the first one)
    pub rest_duration: f64,
    /// Mean of the raw power samples within `[work_start, work_end)`
    pub avg_power: f64,
}

/// Coarse intensity label derived from mean power relative to FTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntensityZone {
    Z1,
    Z2,
    Z3,
    Z4,
    Z5,
    Z6,
    #[serde(rename = "unknown")]
    Unknown,
}

impl IntensityZone {
    /// Classify a `mean_power / ftp` ratio.
    pub fn from_ratio(ratio: f64) -> Self {
        if !ratio.is_finite() {
            IntensityZone::Unknown
        } else if ratio < 0.55 {
            IntensityZone::Z1
        } else if ratio < 0.75 {
            IntensityZone::Z2
        } else if ratio < 0.90 {
            IntensityZone::Z3
        } else if ratio < 1.05 {
            IntensityZone::Z4
        } else if ratio < 1.20 {
            IntensityZone::Z5
        } else {
            IntensityZone::Z6
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntensityZone::Z1 => "Z1",
            IntensityZone::Z2 => "Z2",
            IntensityZone::Z3 => "Z3",
            IntensityZone::Z4 => "Z4",
            IntensityZone::Z5 => "Z5",
            IntensityZone::Z6 => "Z6",
            IntensityZone::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IntensityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session's normalized interval descriptor.
///
/// The normalized fields (`normalized_durations`, `normalized_powers`,
/// `shape_vector`) are scale-invariant: multiplying every raw duration or
/// power by a constant leaves them unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub interval_count: u32,
    /// Raw work durations in seconds, in detection order
    pub interval_durations: Vec<f64>,
    /// Raw mean power per interval in watts
    pub interval_powers: Vec<f64>,
    /// Durations divided by the mean duration
    pub normalized_durations: Vec<f64>,
    /// Powers divided by FTP, or by the mean power when no FTP is known
    pub normalized_powers: Vec<f64>,
    pub mean_duration: f64,
    /// Population standard deviation of the raw durations
    pub std_duration: f64,
    pub mean_power_norm: f64,
    /// Total work time / total rest time (0 when no rest was recorded)
    pub work_rest_ratio: f64,
    pub intensity_zone: IntensityZone,
    /// Trend codes (-1, 0, +1) between consecutive normalized powers
    pub shape_vector: Vec<i8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_sample_validation() {
        assert!(PowerSample::new(0, 200.0).is_valid());
        assert!(!PowerSample::new(0, 0.0).is_valid());
        assert!(!PowerSample::new(0, -5.0).is_valid());
        assert!(!PowerSample::new(0, f64::NAN).is_valid());
    }

    #[test]
    fn test_zone_thresholds() {
        assert_eq!(IntensityZone::from_ratio(0.5), IntensityZone::Z1);
        assert_eq!(IntensityZone::from_ratio(0.55), IntensityZone::Z2);
        assert_eq!(IntensityZone::from_ratio(0.8), IntensityZone::Z3);
        assert_eq!(IntensityZone::from_ratio(1.0), IntensityZone::Z4);
        assert_eq!(IntensityZone::from_ratio(1.1), IntensityZone::Z5);
        assert_eq!(IntensityZone::from_ratio(1.2), IntensityZone::Z6);
        assert_eq!(IntensityZone::from_ratio(f64::NAN), IntensityZone::Unknown);
    }

    #[test]
    fn test_zone_serializes_as_label() {
        assert_eq!(serde_json::to_string(&IntensityZone::Z4).unwrap(), "\"Z4\"");
        assert_eq!(serde_json::to_string(&IntensityZone::Unknown).unwrap(), "\"unknown\"");
        assert_eq!(IntensityZone::Unknown.to_string(), "unknown");
    }
}
