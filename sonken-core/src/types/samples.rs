//! Persisted metric records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Convert a timestamp to the stored Unix-milliseconds form.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Host utilization captured by one resource tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub project_id: String,
    /// CPU load percentage (0-100)
    pub cpu_usage: f64,
    /// Memory used percentage (0-100)
    pub memory_usage: f64,
    /// Primary filesystem used percentage (0-100)
    pub disk_usage: f64,
    pub timestamp: DateTime<Utc>,
}

/// Project database figures captured by one database tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSample {
    pub project_id: String,
    pub db_size_mb: f64,
    pub connection_count: i64,
    /// Slow queries recorded for the project within the rolling window
    pub slow_query_count: i64,
    pub timestamp: DateTime<Utc>,
}

/// A query a caller reported as slow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryEvent {
    pub project_id: String,
    pub query_text: String,
    pub execution_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate figures over a project's recorded slow queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryStats {
    pub total_slow_queries: i64,
    pub avg_execution_time: Option<f64>,
    pub min_execution_time: Option<f64>,
    pub max_execution_time: Option<f64>,
}

/// One request served by a project's PHP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestLog {
    pub project_id: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub response_time_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// An error raised while serving a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub project_id: String,
    pub error_type: String,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Error counts grouped by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTypeStats {
    pub error_type: String,
    pub count: i64,
    pub last_occurrence: DateTime<Utc>,
}

/// Requests served within one minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputBucket {
    /// Start of the minute
    pub bucket: DateTime<Utc>,
    pub request_count: i64,
    pub avg_response_time_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_conversion_keeps_precision() {
        let ts = from_millis(1_700_000_123_456);
        assert_eq!(to_millis(ts), 1_700_000_123_456);
    }
}
