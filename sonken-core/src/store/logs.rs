//! HTTP request and error logs written by the request-handling layer.

use super::MetricsStore;
use crate::error::{Result, SonkenError};
use crate::types::samples::{from_millis, to_millis};
use crate::types::{ErrorLog, ErrorTypeStats, HttpRequestLog, ThroughputBucket};
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::instrument;

/// Width of a throughput bucket.
const THROUGHPUT_BUCKET_MS: i64 = 60_000;

impl MetricsStore {
    /// Record a served request.
    #[instrument(skip(self, entry), fields(project_id = %entry.project_id))]
    pub async fn record_http_request(&self, entry: &HttpRequestLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO http_requests (project_id, method, path, status_code, response_time, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.project_id)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(i64::from(entry.status_code))
        .bind(entry.response_time_ms)
        .bind(to_millis(entry.timestamp))
        .execute(self.pool())
        .await
        .map_err(|e| SonkenError::database("record_http_request", e))?;

        Ok(())
    }

    /// Record an application error.
    #[instrument(skip(self, entry), fields(project_id = %entry.project_id))]
    pub async fn record_error(&self, entry: &ErrorLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO error_logs (project_id, error_type, error_message, stack_trace, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.project_id)
        .bind(&entry.error_type)
        .bind(&entry.error_message)
        .bind(&entry.stack_trace)
        .bind(to_millis(entry.timestamp))
        .execute(self.pool())
        .await
        .map_err(|e| SonkenError::database("record_error", e))?;

        Ok(())
    }

    /// Last `limit` requests, newest first.
    #[instrument(skip(self))]
    pub async fn recent_requests(&self, project_id: &str, limit: u32) -> Result<Vec<HttpRequestLog>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, method, path, status_code, response_time, timestamp
            FROM http_requests
            WHERE project_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(project_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| SonkenError::database("recent_requests", e))?;

        Ok(rows
            .iter()
            .map(|row| HttpRequestLog {
                project_id: row.get("project_id"),
                method: row.get("method"),
                path: row.get("path"),
                status_code: u16::try_from(row.get::<i64, _>("status_code")).unwrap_or_default(),
                response_time_ms: row.get("response_time"),
                timestamp: from_millis(row.get("timestamp")),
            })
            .collect())
    }

    /// Last `limit` errors, newest first.
    #[instrument(skip(self))]
    pub async fn recent_errors(&self, project_id: &str, limit: u32) -> Result<Vec<ErrorLog>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, error_type, error_message, stack_trace, timestamp
            FROM error_logs
            WHERE project_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(project_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| SonkenError::database("recent_errors", e))?;

        Ok(rows
            .iter()
            .map(|row| ErrorLog {
                project_id: row.get("project_id"),
                error_type: row.get("error_type"),
                error_message: row.get("error_message"),
                stack_trace: row.get("stack_trace"),
                timestamp: from_millis(row.get("timestamp")),
            })
            .collect())
    }

    /// Error counts per type, most frequent first.
    #[instrument(skip(self))]
    pub async fn error_stats(&self, project_id: &str) -> Result<Vec<ErrorTypeStats>> {
        let rows = sqlx::query(
            r#"
            SELECT error_type, COUNT(*) AS count, MAX(timestamp) AS last_occurrence
            FROM error_logs
            WHERE project_id = ?
            GROUP BY error_type
            ORDER BY count DESC, error_type
            "#,
        )
        .bind(project_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| SonkenError::database("error_stats", e))?;

        Ok(rows
            .iter()
            .map(|row| ErrorTypeStats {
                error_type: row.get("error_type"),
                count: row.get("count"),
                last_occurrence: from_millis(row.get("last_occurrence")),
            })
            .collect())
    }

    /// Per-minute request counts and mean response times since `since`, oldest first.
    #[instrument(skip(self))]
    pub async fn request_throughput(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ThroughputBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT
                (timestamp / ?) * ? AS bucket,
                COUNT(*) AS request_count,
                AVG(response_time) AS avg_response_time
            FROM http_requests
            WHERE project_id = ? AND timestamp >= ?
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .bind(THROUGHPUT_BUCKET_MS)
        .bind(THROUGHPUT_BUCKET_MS)
        .bind(project_id)
        .bind(to_millis(since))
        .fetch_all(self.pool())
        .await
        .map_err(|e| SonkenError::database("request_throughput", e))?;

        Ok(rows
            .iter()
            .map(|row| ThroughputBucket {
                bucket: from_millis(row.get("bucket")),
                request_count: row.get("request_count"),
                avg_response_time_ms: row.get("avg_response_time"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateManager;
    use crate::types::Project;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    async fn store() -> MetricsStore {
        let state = Arc::new(StateManager::new_in_memory().await.unwrap());
        state.insert_project(&Project::new("p1", "p1", "/srv")).await.unwrap();
        MetricsStore::new(state)
    }

    fn request(at: DateTime<Utc>, response_time_ms: f64) -> HttpRequestLog {
        HttpRequestLog {
            project_id: "p1".to_string(),
            method: "GET".to_string(),
            path: "/index.php".to_string(),
            status_code: 200,
            response_time_ms: Some(response_time_ms),
            timestamp: at,
        }
    }

    fn error(kind: &str, at: DateTime<Utc>) -> ErrorLog {
        ErrorLog {
            project_id: "p1".to_string(),
            error_type: kind.to_string(),
            error_message: Some("boom".to_string()),
            stack_trace: None,
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn test_recent_requests_newest_first() {
        let store = store().await;
        let base = Utc::now();
        store.record_http_request(&request(base, 10.0)).await.unwrap();
        store.record_http_request(&request(base + Duration::seconds(1), 20.0)).await.unwrap();

        let recent = store.recent_requests("p1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].response_time_ms, Some(20.0));
        assert_eq!(recent[0].status_code, 200);
    }

    #[tokio::test]
    async fn test_error_stats_grouped_by_type() {
        let store = store().await;
        let base = Utc::now();
        store.record_error(&error("fatal", base)).await.unwrap();
        store.record_error(&error("warning", base)).await.unwrap();
        store.record_error(&error("warning", base + Duration::seconds(5))).await.unwrap();

        let stats = store.error_stats("p1").await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].error_type, "warning");
        assert_eq!(stats[0].count, 2);
        assert_eq!(to_millis(stats[0].last_occurrence), to_millis(base + Duration::seconds(5)));

        assert_eq!(store.recent_errors("p1", 1).await.unwrap()[0].error_type, "warning");
    }

    #[tokio::test]
    async fn test_request_throughput_buckets_by_minute() {
        let store = store().await;
        let minute = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        store.record_http_request(&request(minute + Duration::seconds(5), 10.0)).await.unwrap();
        store.record_http_request(&request(minute + Duration::seconds(50), 30.0)).await.unwrap();
        store.record_http_request(&request(minute + Duration::seconds(70), 5.0)).await.unwrap();

        let buckets = store.request_throughput("p1", minute).await.unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket, minute);
        assert_eq!(buckets[0].request_count, 2);
        assert_eq!(buckets[0].avg_response_time_ms, Some(20.0));
        assert_eq!(buckets[1].request_count, 1);
    }
}
