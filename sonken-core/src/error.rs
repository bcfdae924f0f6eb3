//! Error types for Sonken.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Sonken operations.
pub type Result<T> = std::result::Result<T, SonkenError>;

/// Main error type for Sonken.
#[derive(Error, Debug)]
pub enum SonkenError {
    // Project errors
    #[error("Project not found: {project_id}")]
    ProjectNotFound { project_id: String },

    // State database errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Sampling errors
    #[error("Host metrics unavailable: {reason}")]
    HostMetrics { reason: String },

    #[error("Failed to connect to database for project {project_id}: {reason}")]
    TargetConnect { project_id: String, reason: String },

    #[error("Database query failed for project {project_id}: {reason}")]
    TargetQuery { project_id: String, reason: String },

    #[error("{sampler} tick timed out after {elapsed:?}")]
    TickTimeout { sampler: &'static str, elapsed: Duration },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SonkenError {
    /// Map a state database error, counting it under `operation`.
    pub fn database(operation: &'static str, err: sqlx::Error) -> Self {
        metrics::counter!("sonken_db_errors_total", "operation" => operation).increment(1);
        Self::DatabaseError(err.to_string())
    }
}
