//! # Interval Detection
//!
//! Segments a session's power series into work intervals separated by rest.
//!
//! ## Algorithm
//! 1. Drop unusable samples, sort by time, remove duplicate timestamps
//! 2. Convert timestamps to elapsed seconds
//! 3. Smooth power with a centered moving average (sample-count window)
//! 4. Threshold at `max(smoothed) * power_threshold_ratio`
//! 5. Rising edges open work segments, falling edges close them; segments
//!    shorter than `min_interval_duration` are discarded and gaps shorter
//!    than `min_rest_duration` are merged into the previous interval
//! 6. Trim low-power warm-up / cool-down intervals when more than two exist
//!
//! A series that starts above the threshold opens its first segment at the
//! first sample. A series that never drops below the threshold is a steady
//! effort and produces no intervals: the detector targets
//! interval-structured sessions.

use crate::{Interval, PowerSample};
use log::debug;
use serde::{Deserialize, Serialize};

/// Minimum number of valid samples required for detection.
const MIN_VALID_SAMPLES: usize = 10;

/// Intervals below this fraction of the mean interval power are warm-up or
/// cool-down candidates.
const EDGE_POWER_RATIO: f64 = 0.7;

/// Configuration for interval detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum work duration to keep an interval (seconds).
    /// Default: 30.0
    pub min_interval_duration: f64,

    /// Minimum gap between two intervals to count as rest (seconds).
    /// Shorter dips are merged into the surrounding interval. Default: 10.0
    pub min_rest_duration: f64,

    /// Fraction of the peak smoothed power used as the work threshold.
    /// Default: 0.3
    pub power_threshold_ratio: f64,

    /// Moving average window, in samples (one per second at 1Hz recording).
    /// Default: 5
    pub smoothing_window: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_interval_duration: 30.0,
            min_rest_duration: 10.0,
            power_threshold_ratio: 0.3,
            smoothing_window: 5,
        }
    }
}

/// Drop invalid samples, sort by time and keep the first of any duplicate
/// timestamps.
pub fn clean_samples(samples: &[PowerSample]) -> Vec<PowerSample> {
    let mut valid: Vec<PowerSample> = samples.iter().copied().filter(PowerSample::is_valid).collect();
    // Stable sort keeps the first occurrence of a duplicate timestamp in front
    valid.sort_by_key(|s| s.timestamp_ms);
    valid.dedup_by_key(|s| s.timestamp_ms);
    valid
}

/// Centered moving average over `window` samples.
///
/// Edge windows shrink at the boundaries instead of padding.
pub fn smooth_power(power: &[f64], window: usize) -> Vec<f64> {
    if power.is_empty() {
        return Vec::new();
    }
    let window = window.max(1);
    // Even windows take the extra sample on the right
    let left = (window - 1) / 2;
    let right = window / 2;
    (0..power.len())
        .map(|i| {
            let start = i.saturating_sub(left);
            let end = (i + right + 1).min(power.len());
            let slice = &power[start..end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Elapsed seconds from the first sample, accumulated from successive deltas.
fn elapsed_seconds(samples: &[PowerSample]) -> Vec<f64> {
    let mut elapsed = Vec::with_capacity(samples.len());
    let mut acc = 0.0;
    for (i, s) in samples.iter().enumerate() {
        if i > 0 {
            acc += (s.timestamp_ms - samples[i - 1].timestamp_ms) as f64 / 1000.0;
        }
        elapsed.push(acc);
    }
    elapsed
}

/// A work segment while it is being built (sample indices are kept so the
/// average can be taken over the raw power).
#[derive(Debug, Clone, Copy)]
struct Segment {
    start_idx: usize,
    end_idx: usize,
    start: f64,
    end: f64,
    rest: f64,
}

impl Segment {
    fn duration(&self) -> f64 {
        self.end - self.start
    }

    fn into_interval(self, power: &[f64]) -> Interval {
        let slice = &power[self.start_idx..self.end_idx.max(self.start_idx + 1).min(power.len())];
        let avg_power = if slice.is_empty() {
            0.0
        } else {
            slice.iter().sum::<f64>() / slice.len() as f64
        };
        Interval {
            work_start: self.start,
            work_end: self.end,
            work_duration: self.duration(),
            rest_duration: self.rest,
            avg_power,
        }
    }
}

/// Detect work intervals in a power series.
///
/// Returns an empty list when fewer than 10 valid samples exist or no work
/// structure is found.
///
/// # Example
/// ```
/// use workout_matcher::{detect_intervals, DetectionConfig, PowerSample};
///
/// // Easy spin followed by one long effort that runs to the end
/// let samples: Vec<PowerSample> = (0..600)
///     .map(|i| PowerSample::new(i * 1000, 40.0))
///     .chain((600..1200).map(|i| PowerSample::new(i * 1000, 400.0)))
///     .collect();
///
/// let intervals = detect_intervals(&samples, &DetectionConfig::default());
/// assert_eq!(intervals.len(), 1);
/// assert!(intervals[0].work_duration > 590.0);
/// ```
pub fn detect_intervals(samples: &[PowerSample], config: &DetectionConfig) -> Vec<Interval> {
    let cleaned = clean_samples(samples);
    if cleaned.len() < MIN_VALID_SAMPLES {
        debug!("Interval detection skipped: {} valid samples", cleaned.len());
        return Vec::new();
    }

    let elapsed = elapsed_seconds(&cleaned);
    let power: Vec<f64> = cleaned.iter().map(|s| s.watts).collect();
    let smoothed = smooth_power(&power, config.smoothing_window.max(1));

    let peak = smoothed.iter().copied().fold(0.0_f64, f64::max);
    let threshold = peak * config.power_threshold_ratio;

    // Never crossing the threshold means a steady effort, not intervals
    if smoothed.iter().all(|&v| v >= threshold) {
        debug!("Interval detection skipped: no threshold crossing in {} samples", cleaned.len());
        return Vec::new();
    }

    let mut intervals: Vec<Interval> = Vec::new();
    let mut open: Option<Segment> = None;
    let mut pending: Option<Segment> = None;
    let mut last_end: Option<f64> = None;
    // A session that starts in work opens its first interval at sample 0
    let mut prev_above = false;

    for (i, (&value, &t)) in smoothed.iter().zip(elapsed.iter()).enumerate() {
        let above = value >= threshold;
        let rising = above && !prev_above;
        prev_above = above;

        if rising && open.is_none() {
            // Rising edge
            let segment = match pending.take() {
                Some(prev) if t - prev.end >= config.min_rest_duration => {
                    intervals.push(prev.into_interval(&power));
                    Segment { start_idx: i, end_idx: i, start: t, end: t, rest: t - prev.end }
                }
                // Dip too short to be rest: resume the previous interval
                Some(prev) => prev,
                None => {
                    let rest = last_end.map(|e| t - e).unwrap_or(0.0);
                    Segment { start_idx: i, end_idx: i, start: t, end: t, rest }
                }
            };
            open = Some(segment);
        } else if !above {
            if let Some(mut segment) = open.take() {
                // Falling edge
                segment.end_idx = i;
                segment.end = t;
                if segment.duration() >= config.min_interval_duration {
                    last_end = Some(segment.end);
                    pending = Some(segment);
                }
            }
        }
    }

    if let Some(mut segment) = open.take() {
        segment.end_idx = power.len();
        segment.end = elapsed[elapsed.len() - 1];
        if segment.duration() >= config.min_interval_duration {
            pending = Some(segment);
        }
    }
    if let Some(segment) = pending.take() {
        intervals.push(segment.into_interval(&power));
    }

    let intervals = trim_warmup_cooldown(intervals);
    debug!(
        "Detected {} intervals from {} samples (threshold {:.1}W)",
        intervals.len(),
        cleaned.len(),
        threshold
    );
    intervals
}

/// Drop a low-power first and/or last interval (warm-up / cool-down) when
/// more than two intervals were detected.
fn trim_warmup_cooldown(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.len() <= 2 {
        return intervals;
    }

    let mean = intervals.iter().map(|iv| iv.avg_power).sum::<f64>() / intervals.len() as f64;
    let cutoff = mean * EDGE_POWER_RATIO;

    let drop_last = intervals.last().is_some_and(|iv| iv.avg_power < cutoff);
    let drop_first = intervals[0].avg_power < cutoff;

    if drop_last {
        intervals.pop();
    }
    if drop_first {
        intervals.remove(0);
        if let Some(first) = intervals.first_mut() {
            first.rest_duration = 0.0;
        }
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a 1Hz series from (seconds, watts) blocks.
    fn blocks(spec: &[(usize, f64)]) -> Vec<PowerSample> {
        let mut samples = Vec::new();
        let mut t = 0i64;
        for &(secs, watts) in spec {
            for _ in 0..secs {
                samples.push(PowerSample::new(t * 1000, watts));
                t += 1;
            }
        }
        samples
    }

    #[test]
    fn test_smoothing_shrinks_at_edges() {
        let smoothed = smooth_power(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert_eq!(smoothed, vec![15.0, 20.0, 30.0, 40.0, 45.0]);
    }

    #[test]
    fn test_even_window_is_exact_width() {
        let smoothed = smooth_power(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 4);
        assert_eq!(smoothed, vec![2.0, 2.5, 3.5, 4.5, 5.0, 5.5]);
        assert_eq!(smooth_power(&[3.0, 5.0], 0), vec![3.0, 5.0]);
    }

    #[test]
    fn test_clean_samples_sorts_and_dedups() {
        let samples = vec![
            PowerSample::new(3000, 100.0),
            PowerSample::new(1000, 110.0),
            PowerSample::new(1000, 999.0),
            PowerSample::new(2000, 0.0),
        ];
        let cleaned = clean_samples(&samples);
        assert_eq!(cleaned, vec![PowerSample::new(1000, 110.0), PowerSample::new(3000, 100.0)]);
    }

    #[test]
    fn test_too_few_samples() {
        let samples = blocks(&[(9, 300.0)]);
        assert!(detect_intervals(&samples, &DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_three_by_twenty() {
        let samples = blocks(&[
            (300, 50.0),
            (1200, 250.0),
            (300, 50.0),
            (1200, 250.0),
            (300, 50.0),
            (1200, 250.0),
            (300, 50.0),
        ]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());

        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].rest_duration, 0.0);
        for iv in &intervals {
            assert!((iv.work_duration - 1200.0).abs() < 10.0, "duration {}", iv.work_duration);
            assert!(iv.avg_power > 240.0 && iv.avg_power <= 250.0);
        }
        for iv in &intervals[1..] {
            assert!((iv.rest_duration - 300.0).abs() < 10.0, "rest {}", iv.rest_duration);
        }
        // Time-ordered, non-overlapping
        for pair in intervals.windows(2) {
            assert!(pair[0].work_end <= pair[1].work_start);
        }
    }

    #[test]
    fn test_session_starting_in_work() {
        let samples = blocks(&[(1200, 250.0), (300, 50.0), (1200, 250.0), (300, 50.0), (1200, 250.0)]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());

        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].work_start, 0.0);
        assert_eq!(intervals[0].rest_duration, 0.0);
        assert!((intervals[0].work_duration - 1200.0).abs() < 10.0);
        assert!((intervals[1].rest_duration - 300.0).abs() < 10.0);
    }

    #[test]
    fn test_work_then_cooldown_is_one_interval() {
        let samples = blocks(&[(600, 250.0), (300, 50.0)]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].work_start, 0.0);
    }

    #[test]
    fn test_short_efforts_discarded() {
        let samples = blocks(&[(60, 50.0), (15, 300.0), (60, 50.0), (120, 300.0), (60, 50.0)]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());
        assert_eq!(intervals.len(), 1);
        assert!(intervals[0].work_duration > 100.0);
    }

    #[test]
    fn test_short_dip_merged() {
        // 8 second dip is below min_rest_duration
        let samples = blocks(&[(60, 50.0), (120, 300.0), (8, 20.0), (120, 300.0), (60, 50.0)]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());
        assert_eq!(intervals.len(), 1);
        assert!(intervals[0].work_duration > 240.0);
    }

    #[test]
    fn test_steady_effort_has_no_intervals() {
        let flat = blocks(&[(600, 150.0)]);
        assert!(detect_intervals(&flat, &DetectionConfig::default()).is_empty());

        // A single spike far above everything else with a short duration
        let spiky = blocks(&[(300, 60.0), (5, 1000.0), (300, 60.0)]);
        assert!(detect_intervals(&spiky, &DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_open_segment_closed_at_end() {
        let samples = blocks(&[(60, 40.0), (90, 280.0)]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].work_end, 149.0);
    }

    #[test]
    fn test_warmup_and_cooldown_trimmed() {
        let samples = blocks(&[
            (60, 20.0),
            (300, 120.0),
            (60, 20.0),
            (240, 320.0),
            (60, 20.0),
            (240, 320.0),
            (60, 20.0),
            (240, 320.0),
            (60, 20.0),
            (300, 110.0),
            (60, 20.0),
        ]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());

        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].rest_duration, 0.0);
        assert!(intervals.iter().all(|iv| iv.avg_power > 300.0));
    }

    #[test]
    fn test_two_intervals_never_trimmed() {
        let samples = blocks(&[(60, 20.0), (120, 100.0), (60, 20.0), (120, 320.0), (60, 20.0)]);
        let intervals = detect_intervals(&samples, &DetectionConfig::default());
        assert_eq!(intervals.len(), 2);
    }

    #[test]
    fn test_unsorted_input_gives_same_result() {
        let samples = blocks(&[(60, 40.0), (120, 300.0), (60, 40.0), (120, 300.0), (60, 40.0)]);
        let mut shuffled = samples.clone();
        shuffled.reverse();
        let config = DetectionConfig::default();
        assert_eq!(detect_intervals(&samples, &config), detect_intervals(&shuffled, &config));
    }
}
