//! JSON request boundary.
//!
//! Decodes a tagged request for an already-authenticated athlete, runs it on
//! the engine and encodes the result or error with an HTTP-style status.
//! Sessions of other athletes are reported as not found.
//!
//! ```
//! use workout_matcher::{dispatch, MemoryStore, PatternEngine};
//!
//! let mut engine = PatternEngine::with_defaults(MemoryStore::new());
//! let reply = dispatch(&mut engine, "athlete-1", r#"{"action": "get_clusters"}"#);
//! assert_eq!(reply.status, 200);
//! assert_eq!(reply.body, "[]");
//!
//! let reply = dispatch(&mut engine, "athlete-1", r#"{"action": "similar_sessions", "session_id": "nope"}"#);
//! assert_eq!(reply.status, 404);
//! ```

use crate::clustering::ClusterConfig;
use crate::engine::PatternEngine;
use crate::store::{PatternStore, SessionRecord, SessionStore};
use crate::{OptionExt, PatternError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A request, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ApiRequest {
    ExtractPattern {
        session_id: String,
        ftp: Option<f64>,
    },
    ClusterSessions {
        ftp: Option<f64>,
        eps: Option<f64>,
        min_pts: Option<usize>,
    },
    GetClusters,
    UpdateClusterTitle {
        cluster_id: String,
        title: String,
        training_route_id: Option<String>,
    },
    SimilarSessions {
        session_id: String,
        threshold: Option<f64>,
    },
}

/// Status and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: u16,
    pub body: String,
}

impl ApiReply {
    fn ok(body: Value) -> Self {
        Self { status: 200, body: body.to_string() }
    }

    fn error(err: &PatternError) -> Self {
        let body = json!({ "error": err.code(), "message": err.to_string() });
        Self { status: err.status_code(), body: body.to_string() }
    }
}

/// Load a session and check that it belongs to the athlete.
fn owned_session<S: SessionStore>(store: &S, athlete_id: &str, session_id: &str) -> Result<SessionRecord> {
    store
        .session(session_id)?
        .filter(|s| s.athlete_id == athlete_id)
        .or_session_not_found(session_id)
}

/// Run a decoded request and return its JSON result.
pub fn handle<S: PatternStore>(
    engine: &mut PatternEngine<S>,
    athlete_id: &str,
    request: ApiRequest,
) -> Result<Value> {
    match request {
        ApiRequest::ExtractPattern { session_id, ftp } => {
            owned_session(engine.store(), athlete_id, &session_id)?;
            let pattern = engine.extract_session_pattern(&session_id, ftp)?;
            Ok(json!({
                "session_id": session_id,
                "pattern_extracted": true,
                "pattern": pattern,
            }))
        }
        ApiRequest::ClusterSessions { ftp, eps, min_pts } => {
            let defaults = &engine.config().clustering;
            let config = ClusterConfig {
                eps: eps.unwrap_or(defaults.eps),
                min_pts: min_pts.unwrap_or(defaults.min_pts),
            };
            let outcome = engine.cluster_sessions(athlete_id, ftp, &config)?;
            Ok(serde_json::to_value(outcome)?)
        }
        ApiRequest::GetClusters => Ok(serde_json::to_value(engine.clusters_for_athlete(athlete_id)?)?),
        ApiRequest::UpdateClusterTitle { cluster_id, title, training_route_id } => {
            let record =
                engine.update_cluster_title(athlete_id, &cluster_id, &title, training_route_id.as_deref())?;
            Ok(serde_json::to_value(record)?)
        }
        ApiRequest::SimilarSessions { session_id, threshold } => {
            owned_session(engine.store(), athlete_id, &session_id)?;
            Ok(serde_json::to_value(engine.similar_sessions(&session_id, threshold)?)?)
        }
    }
}

/// Decode `request_json`, run it and encode the reply.
pub fn dispatch<S: PatternStore>(
    engine: &mut PatternEngine<S>,
    athlete_id: &str,
    request_json: &str,
) -> ApiReply {
    let result = serde_json::from_str::<ApiRequest>(request_json)
        .map_err(PatternError::from)
        .and_then(|request| {
            debug!("Request from {}: {:?}", athlete_id, request);
            handle(engine, athlete_id, request)
        });

    match result {
        Ok(body) => ApiReply::ok(body),
        Err(err) => {
            debug!("Request from {} failed: {}", athlete_id, err);
            ApiReply::error(&err)
        }
    }
}
