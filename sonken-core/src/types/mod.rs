//! Core domain types for Sonken.

pub mod project;
pub mod samples;

// Re-exports
pub use project::{DatabaseCredentials, Project, ProjectStatus};
pub use samples::{
    DatabaseSample, ErrorLog, ErrorTypeStats, HttpRequestLog, ResourceSample, SlowQueryEvent,
    SlowQueryStats, ThroughputBucket,
};
