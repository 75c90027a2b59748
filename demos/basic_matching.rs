//! Basic example of comparing workout patterns.
//!
//! Run with: cargo run --example basic_matching

use workout_matcher::{
    detect_intervals, extract_pattern, similarity_breakdown, DetectionConfig, Pattern, PowerSample,
};

/// Build a 1Hz power series from (seconds, watts) blocks.
fn ride(blocks: &[(usize, f64)]) -> Vec<PowerSample> {
    let mut samples = Vec::new();
    let mut t = 0i64;
    for &(secs, watts) in blocks {
        for _ in 0..secs {
            samples.push(PowerSample::new(t * 1000, watts));
            t += 1;
        }
    }
    samples
}

/// Warm-up, then `count` efforts of `work` seconds at `watts` with `rest` seconds easy.
fn repeats(count: usize, work: usize, watts: f64, rest: usize) -> Vec<PowerSample> {
    let mut blocks = vec![(600, 60.0)];
    for _ in 0..count {
        blocks.push((work, watts));
        blocks.push((rest, 50.0));
    }
    ride(&blocks)
}

fn pattern(name: &str, samples: &[PowerSample], config: &DetectionConfig, ftp: f64) -> Option<Pattern> {
    let intervals = detect_intervals(samples, config);
    let pattern = extract_pattern(&intervals, Some(ftp));
    match &pattern {
        Some(p) => println!(
            "  {}: {} intervals, mean {:.0}s, zone {}, shape {:?}",
            name, p.interval_count, p.mean_duration, p.intensity_zone, p.shape_vector
        ),
        None => println!("  {}: no intervals detected", name),
    }
    pattern
}

fn main() {
    let config = DetectionConfig::default();
    let ftp = 260.0;

    println!("Workout Matching Examples\n");
    println!(
        "Config: min_interval={}s, min_rest={}s, threshold_ratio={}, smoothing={}\n",
        config.min_interval_duration,
        config.min_rest_duration,
        config.power_threshold_ratio,
        config.smoothing_window
    );

    println!("Patterns (FTP {}W):", ftp);
    let threshold_a = pattern("3x20 @ 250W", &repeats(3, 1200, 250.0, 300), &config, ftp);
    let threshold_b = pattern("3x20 @ 265W", &repeats(3, 1200, 265.0, 300), &config, ftp);
    let vo2 = pattern("8x3 @ 340W", &repeats(8, 180, 340.0, 180), &config, ftp);
    let pyramid = pattern(
        "pyramid",
        &ride(&[
            (600, 60.0),
            (120, 300.0),
            (120, 50.0),
            (240, 300.0),
            (120, 50.0),
            (360, 300.0),
            (120, 50.0),
            (240, 300.0),
            (120, 50.0),
            (120, 300.0),
            (300, 50.0),
        ]),
        &config,
        ftp,
    );
    let steady = pattern("steady 2h", &ride(&[(7200, 190.0)]), &config, ftp);
    println!();

    let pairs = [
        ("3x20 @ 250W vs 3x20 @ 265W", &threshold_a, &threshold_b),
        ("3x20 vs 8x3", &threshold_a, &vo2),
        ("8x3 vs pyramid", &vo2, &pyramid),
        ("3x20 vs steady", &threshold_a, &steady),
    ];

    for (i, (label, a, b)) in pairs.iter().enumerate() {
        let result = similarity_breakdown(a.as_ref(), b.as_ref());
        println!("{}. {}:", i + 1, label);
        println!("   Cosine: {:.3}", result.cosine);
        println!("   DTW duration: {:.3}", result.dtw_duration);
        println!("   DTW power: {:.3}", result.dtw_power);
        println!("   Similarity: {:.3}\n", result.score);
    }
}
