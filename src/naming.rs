//! Human-readable cluster titles.
//!
//! Titles come from an ordered rule table; the first rule whose predicate
//! matches the cluster summary produces the label.

use crate::clustering::Cluster;
use crate::Pattern;

/// Averages over a cluster's member patterns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSummary {
    pub avg_interval_count: f64,
    /// Average interval duration in minutes
    pub avg_duration_min: f64,
    pub avg_power_norm: f64,
}

impl ClusterSummary {
    pub fn from_patterns(patterns: &[Pattern]) -> Self {
        if patterns.is_empty() {
            return Self { avg_interval_count: 0.0, avg_duration_min: 0.0, avg_power_norm: 0.0 };
        }
        let n = patterns.len() as f64;
        Self {
            avg_interval_count: patterns.iter().map(|p| p.interval_count as f64).sum::<f64>() / n,
            avg_duration_min: patterns.iter().map(|p| p.mean_duration).sum::<f64>() / n / 60.0,
            avg_power_norm: patterns.iter().map(|p| p.mean_power_norm).sum::<f64>() / n,
        }
    }

    /// Interval count rounded for labels and count rules.
    pub fn count(&self) -> u32 {
        self.avg_interval_count.round() as u32
    }

    /// Duration rounded to whole minutes for labels.
    pub fn minutes(&self) -> u32 {
        self.avg_duration_min.round() as u32
    }

    fn duration_within(&self, low: f64, high: f64) -> bool {
        self.avg_duration_min >= low && self.avg_duration_min <= high
    }
}

/// A naming rule: a predicate over the summary and the label it produces.
pub struct TitleRule {
    pub name: &'static str,
    pub matches: fn(&ClusterSummary) -> bool,
    pub label: fn(&ClusterSummary) -> String,
}

/// Naming rules in priority order. The last rule always matches.
pub const TITLE_RULES: &[TitleRule] = &[
    TitleRule {
        name: "tempo_threshold",
        matches: |s| s.count() == 3 && s.duration_within(18.0, 25.0),
        label: |s| format!("3×{}' Tempo / Threshold", s.minutes()),
    },
    TitleRule {
        name: "vo2max_intervals",
        matches: |s| s.avg_power_norm > 0.9 && s.count() >= 10,
        label: |_| "VO₂max Intervals".to_string(),
    },
    TitleRule {
        name: "threshold",
        matches: |s| (4..=6).contains(&s.count()) && s.duration_within(8.0, 12.0),
        label: |s| format!("{}×{}' Threshold", s.count(), s.minutes()),
    },
    TitleRule {
        name: "vo2_repeats",
        matches: |s| (10..=20).contains(&s.count()) && s.avg_duration_min < 3.0,
        label: |_| "VO₂ Repeats".to_string(),
    },
    TitleRule {
        name: "intervals",
        matches: |_| true,
        label: |s| format!("{}×{}' Intervals", s.count(), s.minutes()),
    },
];

/// Title for a set of patterns using [`TITLE_RULES`].
pub fn title_for_patterns(patterns: &[Pattern]) -> String {
    let summary = ClusterSummary::from_patterns(patterns);
    TITLE_RULES
        .iter()
        .find(|rule| (rule.matches)(&summary))
        .map(|rule| (rule.label)(&summary))
        .unwrap_or_default()
}

/// Generate an automatic title for a cluster.
pub fn generate_cluster_title(cluster: &Cluster) -> String {
    title_for_patterns(&cluster.patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract_pattern, Interval};

    fn repeats(count: usize, seconds: f64, power: f64, ftp: Option<f64>) -> Pattern {
        let intervals: Vec<Interval> = (0..count)
            .map(|i| Interval {
                work_start: 0.0,
                work_end: seconds,
                work_duration: seconds,
                rest_duration: if i == 0 { 0.0 } else { 120.0 },
                avg_power: power,
            })
            .collect();
        extract_pattern(&intervals, ftp).unwrap()
    }

    fn title(patterns: Vec<Pattern>) -> String {
        let indices = (0..patterns.len()).collect();
        generate_cluster_title(&Cluster { indices, patterns })
    }

    #[test]
    fn test_tempo_threshold() {
        let p = repeats(3, 1203.0, 250.0, Some(250.0));
        assert_eq!(title(vec![p.clone(), p.clone(), p]), "3×20' Tempo / Threshold");
    }

    #[test]
    fn test_vo2max_intervals_before_repeats() {
        // 12 x 1min qualifies for both; the power rule comes first
        let p = repeats(12, 60.0, 380.0, None);
        assert_eq!(title(vec![p]), "VO₂max Intervals");
    }

    #[test]
    fn test_vo2_repeats_low_relative_power() {
        let p = repeats(15, 90.0, 200.0, Some(250.0));
        assert_eq!(title(vec![p]), "VO₂ Repeats");
    }

    #[test]
    fn test_threshold() {
        let p = repeats(5, 600.0, 280.0, Some(290.0));
        assert_eq!(title(vec![p]), "5×10' Threshold");
    }

    #[test]
    fn test_fallback_averages_members() {
        let a = repeats(2, 1800.0, 200.0, Some(250.0));
        let b = repeats(2, 2100.0, 200.0, Some(250.0));
        assert_eq!(title(vec![a, b]), "2×33' Intervals");
    }

    #[test]
    fn test_rules_end_with_catch_all() {
        let last = TITLE_RULES.last().unwrap();
        let empty = ClusterSummary::from_patterns(&[]);
        assert!((last.matches)(&empty));
        assert_eq!(title_for_patterns(&[]), "0×0' Intervals");
    }
}
