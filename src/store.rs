//! Session and cluster records and the store interfaces the engine writes to.
//!
//! Persistence technology is up to the caller: implement [`SessionStore`],
//! [`ClusterStore`] and [`PatternStore`] over any backend. A clustering run is
//! written through [`PatternStore::commit_cluster_run`] as one unit.
//! [`MemoryStore`] backs tests and demos.

use crate::{IntensityZone, Pattern, PatternError, PowerSample, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// Records
// ============================================================================

/// A training session as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub athlete_id: String,
    pub title: String,
    /// Unix timestamp (seconds) of the session start
    pub start_time: i64,
    pub samples: Vec<PowerSample>,
    pub pattern: Option<Pattern>,
    pub pattern_extracted: bool,
    pub cluster_id: Option<String>,
    /// Auto-generated title of the assigned cluster
    pub cluster_title: Option<String>,
    /// Manual title of the assigned cluster, if one was set
    pub cluster_title_manual: Option<String>,
}

impl SessionRecord {
    pub fn new(id: &str, athlete_id: &str, title: &str, start_time: i64, samples: Vec<PowerSample>) -> Self {
        Self {
            id: id.to_string(),
            athlete_id: athlete_id.to_string(),
            title: title.to_string(),
            start_time,
            samples,
            pattern: None,
            pattern_extracted: false,
            cluster_id: None,
            cluster_title: None,
            cluster_title_manual: None,
        }
    }
}

/// Cluster assignment written back onto a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAssignment {
    pub session_id: String,
    pub cluster_id: String,
    pub cluster_title: String,
    pub cluster_title_manual: Option<String>,
}

/// Averaged features of a cluster's members.
///
/// Zone and shape vector come from the first member: shape vectors are not
/// averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub interval_count: f64,
    pub mean_duration: f64,
    pub std_duration: f64,
    pub mean_power_norm: f64,
    pub work_rest_ratio: f64,
    pub intensity_zone: IntensityZone,
    pub shape_vector: Vec<i8>,
}

impl ClusterCentroid {
    /// Returns `None` for an empty member list.
    pub fn from_patterns(patterns: &[Pattern]) -> Option<Self> {
        let first = patterns.first()?;
        let n = patterns.len() as f64;
        let avg = |f: fn(&Pattern) -> f64| patterns.iter().map(f).sum::<f64>() / n;
        Some(Self {
            interval_count: avg(|p| p.interval_count as f64),
            mean_duration: avg(|p| p.mean_duration),
            std_duration: avg(|p| p.std_duration),
            mean_power_norm: avg(|p| p.mean_power_norm),
            work_rest_ratio: avg(|p| p.work_rest_ratio),
            intensity_zone: first.intensity_zone,
            shape_vector: first.shape_vector.clone(),
        })
    }
}

/// A sample member shown alongside a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleWorkout {
    pub session_id: String,
    pub title: String,
    pub start_time: i64,
}

/// A persisted group of similar sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Stable identifier derived from the seed pattern
    pub cluster_id: String,
    /// Auto-generated title, refreshed on every clustering run
    pub canonical_title: String,
    /// User override; never replaced by clustering runs
    pub title_manual: Option<String>,
    /// External route reference set alongside a manual title
    pub training_route_id: Option<String>,
    pub pattern: ClusterCentroid,
    pub workout_ids: Vec<String>,
    pub example_workouts: Vec<ExampleWorkout>,
}

impl ClusterRecord {
    /// Manual title when set, otherwise the generated one.
    pub fn display_title(&self) -> &str {
        self.title_manual.as_deref().unwrap_or(&self.canonical_title)
    }
}

// ============================================================================
// Store interfaces
// ============================================================================

/// Access to training sessions.
pub trait SessionStore {
    fn session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// All sessions of an athlete, oldest first.
    fn sessions_for_athlete(&self, athlete_id: &str) -> Result<Vec<SessionRecord>>;

    /// Store an extracted pattern, or mark extraction as failed with `None`.
    fn save_pattern(&mut self, session_id: &str, pattern: Option<Pattern>) -> Result<()>;

    fn set_manual_title(&mut self, session_ids: &[String], title: &str) -> Result<()>;
}

/// Access to cluster records.
pub trait ClusterStore {
    fn cluster(&self, cluster_id: &str) -> Result<Option<ClusterRecord>>;

    /// Records whose membership intersects `session_ids`.
    fn clusters_containing(&self, session_ids: &HashSet<String>) -> Result<Vec<ClusterRecord>>;

    fn set_cluster_title(
        &mut self,
        cluster_id: &str,
        title: &str,
        training_route_id: Option<&str>,
    ) -> Result<ClusterRecord>;
}

/// Everything one clustering run writes.
#[derive(Debug, Clone, Copy)]
pub struct ClusterRun<'a> {
    pub athlete_id: &'a str,
    /// Patterns recomputed during the run; `None` marks a failed extraction
    pub patterns: &'a [(String, Option<Pattern>)],
    /// Records inserted, or replacing the stored record with the same id
    pub records: &'a [ClusterRecord],
    /// The athlete's complete assignment set; unlisted sessions end up unassigned
    pub assignments: &'a [SessionAssignment],
}

/// A store for both sessions and clusters that commits a clustering run as
/// one unit.
pub trait PatternStore: SessionStore + ClusterStore {
    /// Apply a whole run, or nothing of it when an error is returned.
    fn commit_cluster_run(&mut self, run: &ClusterRun<'_>) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// HashMap-backed store for sessions and clusters.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: HashMap<String, SessionRecord>,
    clusters: HashMap<String, ClusterRecord>,
}

fn apply_pattern(
    sessions: &mut HashMap<String, SessionRecord>,
    session_id: &str,
    pattern: Option<Pattern>,
) -> Result<()> {
    let session = sessions
        .get_mut(session_id)
        .ok_or_else(|| PatternError::SessionNotFound { session_id: session_id.to_string() })?;
    session.pattern_extracted = pattern.is_some();
    session.pattern = pattern;
    Ok(())
}

fn apply_assignments(
    sessions: &mut HashMap<String, SessionRecord>,
    athlete_id: &str,
    assignments: &[SessionAssignment],
) {
    let by_session: HashMap<&str, &SessionAssignment> =
        assignments.iter().map(|a| (a.session_id.as_str(), a)).collect();

    for session in sessions.values_mut().filter(|s| s.athlete_id == athlete_id) {
        match by_session.get(session.id.as_str()) {
            Some(assignment) => {
                session.cluster_id = Some(assignment.cluster_id.clone());
                session.cluster_title = Some(assignment.cluster_title.clone());
                session.cluster_title_manual = assignment.cluster_title_manual.clone();
            }
            None => {
                session.cluster_id = None;
                session.cluster_title = None;
                session.cluster_title_manual = None;
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(sessions: impl IntoIterator<Item = SessionRecord>) -> Self {
        let mut store = Self::new();
        for session in sessions {
            store.insert_session(session);
        }
        store
    }

    pub fn insert_session(&mut self, session: SessionRecord) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn all_clusters(&self) -> Vec<&ClusterRecord> {
        let mut records: Vec<&ClusterRecord> = self.clusters.values().collect();
        records.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        records
    }
}

impl SessionStore for MemoryStore {
    fn session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.get(session_id).cloned())
    }

    fn sessions_for_athlete(&self, athlete_id: &str) -> Result<Vec<SessionRecord>> {
        let mut sessions: Vec<SessionRecord> = self
            .sessions
            .values()
            .filter(|s| s.athlete_id == athlete_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    fn save_pattern(&mut self, session_id: &str, pattern: Option<Pattern>) -> Result<()> {
        apply_pattern(&mut self.sessions, session_id, pattern)
    }

    fn set_manual_title(&mut self, session_ids: &[String], title: &str) -> Result<()> {
        for id in session_ids {
            if let Some(session) = self.sessions.get_mut(id) {
                session.cluster_title_manual = Some(title.to_string());
            }
        }
        Ok(())
    }
}

impl ClusterStore for MemoryStore {
    fn cluster(&self, cluster_id: &str) -> Result<Option<ClusterRecord>> {
        Ok(self.clusters.get(cluster_id).cloned())
    }

    fn clusters_containing(&self, session_ids: &HashSet<String>) -> Result<Vec<ClusterRecord>> {
        let mut records: Vec<ClusterRecord> = self
            .clusters
            .values()
            .filter(|c| c.workout_ids.iter().any(|id| session_ids.contains(id)))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        Ok(records)
    }

    fn set_cluster_title(
        &mut self,
        cluster_id: &str,
        title: &str,
        training_route_id: Option<&str>,
    ) -> Result<ClusterRecord> {
        let record = self
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| PatternError::ClusterNotFound { cluster_id: cluster_id.to_string() })?;
        record.title_manual = Some(title.to_string());
        if let Some(route) = training_route_id {
            record.training_route_id = Some(route.to_string());
        }
        Ok(record.clone())
    }
}

impl PatternStore for MemoryStore {
    fn commit_cluster_run(&mut self, run: &ClusterRun<'_>) -> Result<()> {
        // Staged on copies; swapped in only when every step succeeded
        let mut sessions = self.sessions.clone();
        let mut clusters = self.clusters.clone();

        for (session_id, pattern) in run.patterns {
            apply_pattern(&mut sessions, session_id, pattern.clone())?;
        }
        for record in run.records {
            clusters.insert(record.cluster_id.clone(), record.clone());
        }
        apply_assignments(&mut sessions, run.athlete_id, run.assignments);

        self.sessions = sessions;
        self.clusters = clusters;
        Ok(())
    }
}
