//! Example of clustering many sessions of one athlete.
//!
//! Run with: cargo run --example batch_clustering --features parallel

use std::time::Instant;
use workout_matcher::{MemoryStore, PatternEngine, PowerSample, SessionRecord};

const DAY: i64 = 86_400;

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

/// Warm-up, then `count` efforts with easy spinning between them.
fn repeats(count: usize, work: usize, watts: f64, rest: usize) -> Vec<PowerSample> {
    let mut blocks = vec![(600, 60.0)];
    for _ in 0..count {
        blocks.push((work, watts));
        blocks.push((rest, 55.0));
    }
    ride(&blocks)
}

fn main() {
    println!("Batch Workout Clustering Example\n");

    let mut sessions = Vec::new();
    let mut day = 0i64;
    let mut add = |title: &str, samples: Vec<PowerSample>| {
        day += 1;
        sessions.push(SessionRecord::new(&format!("ride-{:02}", day), "athlete-1", title, day * DAY, samples));
    };

    // Threshold blocks: 4 variations
    for watts in [245.0, 250.0, 255.0, 260.0] {
        add("3x20 threshold", repeats(3, 1200, watts, 300));
    }
    // Threshold 5x10: 3 variations
    for watts in [270.0, 275.0, 280.0] {
        add("5x10", repeats(5, 600, watts, 300));
    }
    // Short VO2 repeats: 3 variations
    for count in [14, 15, 16] {
        add("VO2 repeats", repeats(count, 60, 400.0, 60));
    }
    // One-offs
    add("Long endurance", ride(&[(7200, 180.0)]));
    add("Over-unders", repeats(2, 900, 300.0, 600));

    println!("Created {} sessions\n", sessions.len());

    let mut engine = PatternEngine::with_defaults(MemoryStore::with_sessions(sessions));

    let start = Instant::now();
    let outcome = match engine.cluster_all_sessions("athlete-1", Some(265.0)) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Clustering failed: {}", e);
            return;
        }
    };
    let elapsed = start.elapsed();

    println!("Clustering completed in {:?}\n", elapsed);
    println!("Found {} clusters:\n", outcome.clusters.len());

    for record in &outcome.clusters {
        println!(
            "  {} \"{}\": {} sessions, {:.1} intervals of {:.0}s, zone {}",
            record.cluster_id,
            record.display_title(),
            record.workout_ids.len(),
            record.pattern.interval_count,
            record.pattern.mean_duration,
            record.pattern.intensity_zone
        );
        for example in &record.example_workouts {
            println!("      e.g. {} ({})", example.session_id, example.title);
        }
    }

    println!("\nNoise: {:?}", outcome.noise);
    println!("Skipped (no pattern): {:?}", outcome.skipped);

    if let Some(first) = outcome.members.first() {
        match engine.similar_sessions(&first.session_id, None) {
            Ok(similar) => {
                println!("\nSessions similar to {}:", first.session_id);
                for s in similar {
                    println!("  {} {:.3}", s.session_id, s.similarity);
                }
            }
            Err(e) => eprintln!("Similarity query failed: {}", e),
        }
    }
}
