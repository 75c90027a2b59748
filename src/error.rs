//! Unified error handling for workout matching.
//!
//! The algorithmic modules never fail: they return empty results for
//! "nothing found". Errors appear at the orchestration and request boundary,
//! where a caller needs to know *why* nothing was produced.

use thiserror::Error;

/// Errors reported by the pattern engine and the request boundary.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The session has no usable power samples
    #[error("Session {session_id} has no usable power data")]
    NoPowerData { session_id: String },

    /// Power data exists but no threshold-crossing structure was found
    #[error("No intervals detected in session {session_id}")]
    NoIntervalsDetected { session_id: String },

    /// A similarity query was made against a session without a pattern
    #[error("Pattern has not been extracted for session {session_id}")]
    PatternNotExtracted { session_id: String },

    /// The caller has no sessions in the targeted cluster
    #[error("Not authorized to modify cluster {cluster_id}")]
    Unauthorized { cluster_id: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Cluster not found: {cluster_id}")]
    ClusterNotFound { cluster_id: String },

    /// A tuning parameter is outside its valid range
    #[error("Invalid parameter {name}={value}")]
    InvalidParameter { name: String, value: String },

    /// The session or cluster store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A request or response could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PatternError {
    /// Stable machine-readable code for the boundary.
    pub fn code(&self) -> &'static str {
        match self {
            PatternError::NoPowerData { .. } => "no_power_data",
            PatternError::NoIntervalsDetected { .. } => "no_intervals_detected",
            PatternError::PatternNotExtracted { .. } => "pattern_not_extracted",
            PatternError::Unauthorized { .. } => "unauthorized",
            PatternError::SessionNotFound { .. } => "session_not_found",
            PatternError::ClusterNotFound { .. } => "cluster_not_found",
            PatternError::InvalidParameter { .. } => "invalid_parameter",
            PatternError::Storage(_) => "storage",
            PatternError::Serialization(_) => "serialization",
        }
    }

    /// HTTP-style status code for the boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            PatternError::SessionNotFound { .. } | PatternError::ClusterNotFound { .. } => 404,
            PatternError::NoPowerData { .. }
            | PatternError::NoIntervalsDetected { .. }
            | PatternError::PatternNotExtracted { .. } => 422,
            PatternError::Unauthorized { .. } => 403,
            PatternError::InvalidParameter { .. } | PatternError::Serialization(_) => 400,
            PatternError::Storage(_) => 500,
        }
    }

    /// Expected conditions the caller can react to (pick another session,
    /// retry with other parameters). Storage faults are not recoverable here.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PatternError::Storage(_))
    }

    pub fn invalid_parameter(name: &str, value: impl ToString) -> Self {
        PatternError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Result type alias for pattern engine operations.
pub type Result<T> = std::result::Result<T, PatternError>;

/// Turn an `Option` from a store lookup into a typed not-found error.
pub trait OptionExt<T> {
    fn or_session_not_found(self, session_id: &str) -> Result<T>;
    fn or_cluster_not_found(self, cluster_id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_session_not_found(self, session_id: &str) -> Result<T> {
        self.ok_or_else(|| PatternError::SessionNotFound {
            session_id: session_id.to_string(),
        })
    }

    fn or_cluster_not_found(self, cluster_id: &str) -> Result<T> {
        self.ok_or_else(|| PatternError::ClusterNotFound {
            cluster_id: cluster_id.to_string(),
        })
    }
}
