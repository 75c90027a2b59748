//! Pattern extraction: reduce a list of intervals to a comparable descriptor.

use crate::{IntensityZone, Interval, Pattern};

/// Normalized power changes within this band count as flat.
const SHAPE_DEAD_ZONE: f64 = 0.05;

/// Quantize a change in normalized power to a trend code.
///
/// ```
/// use workout_matcher::shape_code;
/// assert_eq!(shape_code(0.2), 1);
/// assert_eq!(shape_code(-0.04), 0);
/// assert_eq!(shape_code(-0.3), -1);
/// ```
pub fn shape_code(delta: f64) -> i8 {
    if delta > SHAPE_DEAD_ZONE {
        1
    } else if delta < -SHAPE_DEAD_ZONE {
        -1
    } else {
        0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Build a [`Pattern`] from detected intervals.
///
/// Powers are normalized by `ftp` when given (and positive), otherwise by the
/// pattern's own mean power. Returns `None` for an empty interval list.
///
/// # Example
/// ```
/// use workout_matcher::{extract_pattern, Interval, IntensityZone};
///
/// let intervals: Vec<Interval> = (0..3)
///     .map(|i| Interval {
///         work_start: i as f64 * 1500.0,
///         work_end: i as f64 * 1500.0 + 1200.0,
///         work_duration: 1200.0,
///         rest_duration: if i == 0 { 0.0 } else { 300.0 },
///         avg_power: 250.0,
///     })
///     .collect();
///
/// let pattern = extract_pattern(&intervals, Some(250.0)).unwrap();
/// assert_eq!(pattern.interval_count, 3);
/// assert_eq!(pattern.intensity_zone, IntensityZone::Z4);
/// assert_eq!(pattern.shape_vector, vec![0, 0]);
/// ```
pub fn extract_pattern(intervals: &[Interval], ftp: Option<f64>) -> Option<Pattern> {
    if intervals.is_empty() {
        return None;
    }

    let durations: Vec<f64> = intervals.iter().map(|iv| iv.work_duration).collect();
    let powers: Vec<f64> = intervals.iter().map(|iv| iv.avg_power).collect();

    let mean_duration = mean(&durations);
    let std_duration = population_std(&durations, mean_duration);
    let mean_power = mean(&powers);

    let normalized_durations: Vec<f64> = durations
        .iter()
        .map(|d| if mean_duration > 0.0 { d / mean_duration } else { 0.0 })
        .collect();

    let ftp = ftp.filter(|f| f.is_finite() && *f > 0.0);
    let reference = ftp.unwrap_or(mean_power);
    let normalized_powers: Vec<f64> = powers
        .iter()
        .map(|p| if reference > 0.0 { p / reference } else { 0.0 })
        .collect();
    let mean_power_norm = mean(&normalized_powers);

    let total_work: f64 = durations.iter().sum();
    let total_rest: f64 = intervals.iter().map(|iv| iv.rest_duration).sum();
    let work_rest_ratio = if total_rest > 0.0 { total_work / total_rest } else { 0.0 };

    let intensity_zone = match ftp {
        Some(ftp) => IntensityZone::from_ratio(mean_power / ftp),
        None => IntensityZone::Unknown,
    };

    let shape_vector: Vec<i8> = normalized_powers
        .windows(2)
        .map(|w| shape_code(w[1] - w[0]))
        .collect();

    Some(Pattern {
        interval_count: intervals.len() as u32,
        interval_durations: durations,
        interval_powers: powers,
        normalized_durations,
        normalized_powers,
        mean_duration,
        std_duration,
        mean_power_norm,
        work_rest_ratio,
        intensity_zone,
        shape_vector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(duration: f64, rest: f64, power: f64) -> Interval {
        Interval {
            work_start: 0.0,
            work_end: duration,
            work_duration: duration,
            rest_duration: rest,
            avg_power: power,
        }
    }

    #[test]
    fn test_empty_intervals_yield_none() {
        assert!(extract_pattern(&[], Some(250.0)).is_none());
        assert!(extract_pattern(&[], None).is_none());
    }

    #[test]
    fn test_pyramid_fields() {
        let intervals = vec![
            interval(60.0, 0.0, 200.0),
            interval(120.0, 60.0, 250.0),
            interval(180.0, 60.0, 300.0),
            interval(120.0, 60.0, 250.0),
            interval(60.0, 60.0, 200.0),
        ];
        let p = extract_pattern(&intervals, None).unwrap();

        assert_eq!(p.interval_count, 5);
        assert_eq!(p.mean_duration, 108.0);
        assert!((p.normalized_durations[2] - 180.0 / 108.0).abs() < 1e-12);
        assert!((p.std_duration - 44.899_888_641).abs() < 1e-6);
        assert!((p.mean_power_norm - 1.0).abs() < 1e-12);
        assert!((p.work_rest_ratio - 540.0 / 240.0).abs() < 1e-12);
        assert_eq!(p.intensity_zone, IntensityZone::Unknown);
        assert_eq!(p.shape_vector, vec![1, 1, -1, -1]);
    }

    #[test]
    fn test_ftp_normalization_and_zone() {
        let intervals = vec![interval(300.0, 0.0, 330.0), interval(300.0, 120.0, 330.0)];
        let p = extract_pattern(&intervals, Some(300.0)).unwrap();

        assert!((p.normalized_powers[0] - 1.1).abs() < 1e-12);
        assert!((p.mean_power_norm - 1.1).abs() < 1e-12);
        assert_eq!(p.intensity_zone, IntensityZone::Z5);
    }

    #[test]
    fn test_non_positive_ftp_is_ignored() {
        let intervals = vec![interval(300.0, 0.0, 200.0), interval(300.0, 120.0, 220.0)];
        let p = extract_pattern(&intervals, Some(0.0)).unwrap();
        assert_eq!(p.intensity_zone, IntensityZone::Unknown);
        assert!((p.mean_power_norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_interval() {
        let p = extract_pattern(&[interval(600.0, 0.0, 280.0)], None).unwrap();
        assert_eq!(p.interval_count, 1);
        assert_eq!(p.normalized_durations, vec![1.0]);
        assert_eq!(p.normalized_powers, vec![1.0]);
        assert_eq!(p.std_duration, 0.0);
        assert_eq!(p.work_rest_ratio, 0.0);
        assert!(p.shape_vector.is_empty());
    }

    #[test]
    fn test_dead_zone_flattens_small_changes() {
        let intervals = vec![
            interval(60.0, 0.0, 300.0),
            interval(60.0, 60.0, 303.0),
            interval(60.0, 60.0, 297.0),
        ];
        let p = extract_pattern(&intervals, None).unwrap();
        assert_eq!(p.shape_vector, vec![0, 0]);
    }

    #[test]
    fn test_power_scaling_leaves_normalized_fields() {
        let base = vec![
            interval(240.0, 0.0, 280.0),
            interval(180.0, 90.0, 310.0),
            interval(120.0, 90.0, 340.0),
        ];
        let scaled: Vec<Interval> = base
            .iter()
            .map(|iv| Interval { avg_power: iv.avg_power * 1.7, ..*iv })
            .collect();

        let a = extract_pattern(&base, None).unwrap();
        let b = extract_pattern(&scaled, None).unwrap();
        for (x, y) in a.normalized_powers.iter().zip(&b.normalized_powers) {
            assert!((x - y).abs() < 1e-12);
        }
        assert!((a.mean_power_norm - b.mean_power_norm).abs() < 1e-12);
        assert_eq!(a.shape_vector, b.shape_vector);
        assert_eq!(a.work_rest_ratio, b.work_rest_ratio);
        assert_ne!(a.interval_powers, b.interval_powers);
    }
}
