//! # Pattern Engine
//!
//! Orchestrates the algorithmic core against a session/cluster store:
//! per-session extraction, full re-clustering of an athlete's sessions,
//! cluster queries, manual titles and similarity queries.
//!
//! Re-clustering is two-phase. [`PatternEngine::compute_assignments`] reads
//! the store and builds a complete [`ClusterPlan`] without writing anything;
//! [`PatternEngine::commit_assignments`] then hands the plan to the store as
//! one commit. A failure at either step leaves the previous cluster state
//! untouched.

use crate::clustering::{cluster, cluster_id_for, ClusterConfig};
use crate::intervals::{detect_intervals, DetectionConfig};
use crate::matching::similarity;
use crate::naming::title_for_patterns;
use crate::store::{
    ClusterCentroid, ClusterRecord, ClusterRun, ClusterStore, ExampleWorkout, PatternStore,
    SessionAssignment, SessionRecord, SessionStore,
};
use crate::{OptionExt, Pattern, PatternError, Result, SampleSource};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval detection parameters used for every extraction.
    pub detection: DetectionConfig,

    /// Default clustering parameters.
    pub clustering: ClusterConfig,

    /// Minimum similarity for a session to be reported as similar.
    /// Default: 0.75
    pub similarity_threshold: f64,

    /// Maximum number of similar sessions returned.
    /// Default: 10
    pub max_similar: usize,

    /// Number of example workouts stored on each cluster record.
    /// Default: 3
    pub max_example_workouts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            clustering: ClusterConfig::default(),
            similarity_threshold: 0.75,
            max_similar: 10,
            max_example_workouts: 3,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// A session placed in a cluster by a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub session_id: String,
    pub title: String,
    pub start_time: i64,
    pub cluster_id: String,
    pub pattern: Option<Pattern>,
}

/// Everything a clustering run will write, computed up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPlan {
    pub athlete_id: String,
    /// Patterns recomputed during planning; `None` marks a failed extraction
    pub extracted: Vec<(String, Option<Pattern>)>,
    /// Records to upsert: this run's clusters plus stale records losing members
    pub records: Vec<ClusterRecord>,
    pub assignments: Vec<SessionAssignment>,
    pub members: Vec<ClusterMember>,
    /// Sessions with a pattern that joined no cluster
    pub noise: Vec<String>,
    /// Sessions without a usable pattern
    pub skipped: Vec<String>,
    /// Number of leading entries in `records` produced by this run
    cluster_count: usize,
}

/// Result of a committed clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringOutcome {
    pub clusters: Vec<ClusterRecord>,
    pub members: Vec<ClusterMember>,
    pub noise: Vec<String>,
    pub skipped: Vec<String>,
}

/// A cluster record together with the requesting athlete's members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterView {
    pub record: ClusterRecord,
    pub members: Vec<ClusterMember>,
}

/// A session similar to a query session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarSession {
    pub session_id: String,
    pub title: String,
    pub start_time: i64,
    pub similarity: f64,
    pub cluster_id: Option<String>,
}

// ============================================================================
// Extraction helpers
// ============================================================================

/// Detect intervals and build a pattern for one session.
fn pattern_for_session(
    session: &SessionRecord,
    ftp: Option<f64>,
    detection: &DetectionConfig,
) -> Result<Pattern> {
    let samples = session.samples.power_samples();
    if samples.is_empty() {
        return Err(PatternError::NoPowerData { session_id: session.id.clone() });
    }
    let intervals = detect_intervals(&samples, detection);
    debug!("Session {}: {} intervals", session.id, intervals.len());
    crate::extract_pattern(&intervals, ftp)
        .ok_or_else(|| PatternError::NoIntervalsDetected { session_id: session.id.clone() })
}

/// Extract patterns for many sessions without touching any store.
#[cfg(not(feature = "parallel"))]
pub fn extract_patterns_batch(
    sessions: &[SessionRecord],
    ftp: Option<f64>,
    detection: &DetectionConfig,
) -> Vec<(String, Result<Pattern>)> {
    sessions
        .iter()
        .map(|s| (s.id.clone(), pattern_for_session(s, ftp, detection)))
        .collect()
}

/// Extract patterns for many sessions in parallel without touching any store.
#[cfg(feature = "parallel")]
pub fn extract_patterns_batch(
    sessions: &[SessionRecord],
    ftp: Option<f64>,
    detection: &DetectionConfig,
) -> Vec<(String, Result<Pattern>)> {
    use rayon::prelude::*;

    sessions
        .par_iter()
        .map(|s| (s.id.clone(), pattern_for_session(s, ftp, detection)))
        .collect()
}

/// The `limit` most recent members, newest first.
fn example_workouts(members: &[&SessionRecord], limit: usize) -> Vec<ExampleWorkout> {
    let mut recent: Vec<&&SessionRecord> = members.iter().collect();
    recent.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.id.cmp(&b.id)));
    recent
        .into_iter()
        .take(limit)
        .map(|s| ExampleWorkout {
            session_id: s.id.clone(),
            title: s.title.clone(),
            start_time: s.start_time,
        })
        .collect()
}

// ============================================================================
// Engine
// ============================================================================

/// Runs extraction, clustering and queries against a store.
pub struct PatternEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: PatternStore> PatternEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: S) -> Self {
        Self::new(store, EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Extract and store the pattern of one session.
    ///
    /// On `NoPowerData` or `NoIntervalsDetected` the session is marked as
    /// not extracted and the error is returned.
    pub fn extract_session_pattern(&mut self, session_id: &str, ftp: Option<f64>) -> Result<Pattern> {
        let session = self.store.session(session_id)?.or_session_not_found(session_id)?;

        match pattern_for_session(&session, ftp, &self.config.detection) {
            Ok(pattern) => {
                self.store.save_pattern(session_id, Some(pattern.clone()))?;
                info!(
                    "Extracted pattern for {}: {} intervals, zone {}",
                    session_id, pattern.interval_count, pattern.intensity_zone
                );
                Ok(pattern)
            }
            Err(e) => {
                warn!("Pattern extraction failed for {}: {}", session_id, e);
                self.store.save_pattern(session_id, None)?;
                Err(e)
            }
        }
    }

    /// Extract patterns for all of an athlete's sessions and store them.
    ///
    /// Returns the per-session results; failures are stored as not extracted.
    pub fn extract_athlete_patterns(
        &mut self,
        athlete_id: &str,
        ftp: Option<f64>,
    ) -> Result<Vec<(String, Result<Pattern>)>> {
        let sessions = self.store.sessions_for_athlete(athlete_id)?;
        let results = extract_patterns_batch(&sessions, ftp, &self.config.detection);
        for (id, result) in &results {
            self.store.save_pattern(id, result.as_ref().ok().cloned())?;
        }
        info!("Extracted patterns for {} sessions of {}", results.len(), athlete_id);
        Ok(results)
    }

    /// Plan a full re-clustering of an athlete's sessions. Nothing is written.
    ///
    /// Sessions without a stored pattern get one extracted first. Cluster ids
    /// are derived from each cluster's seed, so existing records are updated
    /// in place and keep their manual title and route reference.
    pub fn compute_assignments(
        &self,
        athlete_id: &str,
        ftp: Option<f64>,
        config: &ClusterConfig,
    ) -> Result<ClusterPlan> {
        config.validate()?;
        let start = std::time::Instant::now();

        let mut sessions = self.store.sessions_for_athlete(athlete_id)?;
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        let athlete_sessions: HashSet<String> = sessions.iter().map(|s| s.id.clone()).collect();

        let missing: Vec<SessionRecord> = sessions.iter().filter(|s| s.pattern.is_none()).cloned().collect();
        let mut extracted = Vec::with_capacity(missing.len());
        let mut fresh: HashMap<String, Pattern> = HashMap::new();
        let mut skipped = Vec::new();
        for (id, result) in extract_patterns_batch(&missing, ftp, &self.config.detection) {
            match result {
                Ok(pattern) => {
                    fresh.insert(id.clone(), pattern.clone());
                    extracted.push((id, Some(pattern)));
                }
                Err(e) => {
                    debug!("Skipping {} for clustering: {}", id, e);
                    skipped.push(id.clone());
                    extracted.push((id, None));
                }
            }
        }

        // Sessions with a pattern, in clustering order
        let mut candidates: Vec<&SessionRecord> = Vec::new();
        let mut patterns: Vec<Pattern> = Vec::new();
        for session in &sessions {
            let pattern = session.pattern.as_ref().or_else(|| fresh.get(&session.id));
            if let Some(pattern) = pattern {
                candidates.push(session);
                patterns.push(pattern.clone());
            }
        }

        // Group clusters by derived id; two clusters of one run can collide
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<usize>> = HashMap::new();
        for c in cluster(&patterns, config) {
            let cluster_id = cluster_id_for(&c.patterns[0]);
            match grouped.get_mut(&cluster_id) {
                Some(indices) => {
                    warn!("Cluster id {} derived twice in one run, merging", cluster_id);
                    indices.extend(c.indices);
                }
                None => {
                    order.push(cluster_id.clone());
                    grouped.insert(cluster_id, c.indices);
                }
            }
        }

        let mut records = Vec::with_capacity(order.len());
        let mut assignments = Vec::new();
        let mut members = Vec::new();
        let mut clustered: HashSet<usize> = HashSet::new();

        for cluster_id in &order {
            let indices = &grouped[cluster_id];
            let member_patterns: Vec<Pattern> = indices.iter().map(|&i| patterns[i].clone()).collect();
            let member_sessions: Vec<&SessionRecord> = indices.iter().map(|&i| candidates[i]).collect();
            let centroid = match ClusterCentroid::from_patterns(&member_patterns) {
                Some(centroid) => centroid,
                None => continue,
            };
            let canonical_title = title_for_patterns(&member_patterns);
            let existing = self.store.cluster(cluster_id)?;

            // Members from other athletes stay; this athlete's are replaced
            let mut workout_ids: Vec<String> = existing
                .as_ref()
                .map(|r| {
                    r.workout_ids
                        .iter()
                        .filter(|id| !athlete_sessions.contains(*id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            workout_ids.extend(member_sessions.iter().map(|s| s.id.clone()));

            let (title_manual, training_route_id) = existing
                .map(|r| (r.title_manual, r.training_route_id))
                .unwrap_or((None, None));

            for (&i, session) in indices.iter().zip(&member_sessions) {
                clustered.insert(i);
                assignments.push(SessionAssignment {
                    session_id: session.id.clone(),
                    cluster_id: cluster_id.clone(),
                    cluster_title: canonical_title.clone(),
                    cluster_title_manual: title_manual.clone(),
                });
                members.push(ClusterMember {
                    session_id: session.id.clone(),
                    title: session.title.clone(),
                    start_time: session.start_time,
                    cluster_id: cluster_id.clone(),
                    pattern: Some(patterns[i].clone()),
                });
            }

            records.push(ClusterRecord {
                cluster_id: cluster_id.clone(),
                canonical_title,
                title_manual,
                training_route_id,
                pattern: centroid,
                workout_ids,
                example_workouts: example_workouts(&member_sessions, self.config.max_example_workouts),
            });
        }
        let cluster_count = records.len();

        // Records from earlier runs that still list this athlete's sessions
        let current: HashSet<&String> = order.iter().collect();
        for mut stale in self.store.clusters_containing(&athlete_sessions)? {
            if current.contains(&stale.cluster_id) {
                continue;
            }
            stale.workout_ids.retain(|id| !athlete_sessions.contains(id));
            stale.example_workouts.retain(|w| !athlete_sessions.contains(&w.session_id));
            records.push(stale);
        }

        let noise: Vec<String> = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| !clustered.contains(i))
            .map(|(_, s)| s.id.clone())
            .collect();

        info!(
            "Planned {} clusters for {} ({} sessions, {} noise, {} skipped) in {:?}",
            cluster_count,
            athlete_id,
            sessions.len(),
            noise.len(),
            skipped.len(),
            start.elapsed()
        );

        Ok(ClusterPlan {
            athlete_id: athlete_id.to_string(),
            extracted,
            records,
            assignments,
            members,
            noise,
            skipped,
            cluster_count,
        })
    }

    /// Write a plan as one store commit: recomputed patterns, cluster
    /// records and the athlete's full assignment set. On error nothing of
    /// the plan is stored.
    pub fn commit_assignments(&mut self, plan: ClusterPlan) -> Result<ClusteringOutcome> {
        self.store.commit_cluster_run(&ClusterRun {
            athlete_id: &plan.athlete_id,
            patterns: &plan.extracted,
            records: &plan.records,
            assignments: &plan.assignments,
        })?;

        info!(
            "Committed {} clusters and {} assignments for {}",
            plan.cluster_count,
            plan.assignments.len(),
            plan.athlete_id
        );

        let mut clusters = plan.records;
        clusters.truncate(plan.cluster_count);
        Ok(ClusteringOutcome {
            clusters,
            members: plan.members,
            noise: plan.noise,
            skipped: plan.skipped,
        })
    }

    /// Re-cluster all of an athlete's sessions and store the result.
    pub fn cluster_sessions(
        &mut self,
        athlete_id: &str,
        ftp: Option<f64>,
        config: &ClusterConfig,
    ) -> Result<ClusteringOutcome> {
        let plan = self.compute_assignments(athlete_id, ftp, config)?;
        self.commit_assignments(plan)
    }

    /// Re-cluster with the configured clustering parameters.
    pub fn cluster_all_sessions(&mut self, athlete_id: &str, ftp: Option<f64>) -> Result<ClusteringOutcome> {
        let config = self.config.clustering.clone();
        self.cluster_sessions(athlete_id, ftp, &config)
    }

    /// Clusters containing any of the athlete's sessions, largest first.
    pub fn clusters_for_athlete(&self, athlete_id: &str) -> Result<Vec<ClusterView>> {
        let sessions = self.store.sessions_for_athlete(athlete_id)?;
        let by_id: HashMap<&str, &SessionRecord> = sessions.iter().map(|s| (s.id.as_str(), s)).collect();
        let ids: HashSet<String> = by_id.keys().map(|id| id.to_string()).collect();

        let mut views: Vec<ClusterView> = self
            .store
            .clusters_containing(&ids)?
            .into_iter()
            .map(|record| {
                let members = record
                    .workout_ids
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()))
                    .map(|s| ClusterMember {
                        session_id: s.id.clone(),
                        title: s.title.clone(),
                        start_time: s.start_time,
                        cluster_id: record.cluster_id.clone(),
                        pattern: s.pattern.clone(),
                    })
                    .collect();
                ClusterView { record, members }
            })
            .collect();

        views.sort_by(|a, b| {
            b.members
                .len()
                .cmp(&a.members.len())
                .then_with(|| a.record.cluster_id.cmp(&b.record.cluster_id))
        });
        Ok(views)
    }

    /// Set a manual title on a cluster and every member session.
    ///
    /// Rejected with `Unauthorized` unless the athlete has a session in the
    /// cluster.
    pub fn update_cluster_title(
        &mut self,
        athlete_id: &str,
        cluster_id: &str,
        title: &str,
        training_route_id: Option<&str>,
    ) -> Result<ClusterRecord> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PatternError::invalid_parameter("title", "<empty>"));
        }

        let record = self.store.cluster(cluster_id)?.or_cluster_not_found(cluster_id)?;
        let owned: HashSet<String> = self
            .store
            .sessions_for_athlete(athlete_id)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        if !record.workout_ids.iter().any(|id| owned.contains(id)) {
            warn!("Athlete {} has no sessions in {}", athlete_id, cluster_id);
            return Err(PatternError::Unauthorized { cluster_id: cluster_id.to_string() });
        }

        let updated = self.store.set_cluster_title(cluster_id, title, training_route_id)?;
        self.store.set_manual_title(&updated.workout_ids, title)?;
        info!("Cluster {} titled '{}' ({} members)", cluster_id, title, updated.workout_ids.len());
        Ok(updated)
    }

    /// Other sessions of the same athlete whose pattern similarity reaches
    /// `threshold` (default from config), most similar first.
    pub fn similar_sessions(&self, session_id: &str, threshold: Option<f64>) -> Result<Vec<SimilarSession>> {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PatternError::invalid_parameter("threshold", threshold));
        }

        let session = self.store.session(session_id)?.or_session_not_found(session_id)?;
        let pattern = session
            .pattern
            .as_ref()
            .ok_or_else(|| PatternError::PatternNotExtracted { session_id: session_id.to_string() })?;

        let others = self.store.sessions_for_athlete(&session.athlete_id)?;
        let mut similar: Vec<SimilarSession> = others
            .iter()
            .filter(|other| other.id != session.id)
            .filter_map(|other| {
                let score = similarity(Some(pattern), other.pattern.as_ref());
                (other.pattern.is_some() && score >= threshold).then(|| SimilarSession {
                    session_id: other.id.clone(),
                    title: other.title.clone(),
                    start_time: other.start_time,
                    similarity: score,
                    cluster_id: other.cluster_id.clone(),
                })
            })
            .collect();

        similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        similar.truncate(self.config.max_similar);
        debug!(
            "{} sessions similar to {} of {} compared",
            similar.len(),
            session_id,
            others.len().saturating_sub(1)
        );
        Ok(similar)
    }
}
