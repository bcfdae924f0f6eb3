//! Resource samples, database samples and slow-query events.

use super::MetricsStore;
use crate::error::{Result, SonkenError};
use crate::types::samples::{from_millis, to_millis};
use crate::types::{DatabaseSample, ResourceSample, SlowQueryEvent, SlowQueryStats};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, instrument};

impl MetricsStore {
    // ========================
    // Resource samples
    // ========================

    /// Record one resource sample.
    #[instrument(skip(self, sample), fields(project_id = %sample.project_id))]
    pub async fn record_resource(&self, sample: &ResourceSample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_metrics (project_id, cpu_usage, memory_usage, disk_usage, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.project_id)
        .bind(sample.cpu_usage)
        .bind(sample.memory_usage)
        .bind(sample.disk_usage)
        .bind(to_millis(sample.timestamp))
        .execute(self.pool())
        .await
        .map_err(|e| SonkenError::database("record_resource", e))?;

        Ok(())
    }

    /// Keep only the newest `keep` resource samples for a project.
    #[instrument(skip(self))]
    pub async fn trim_resource_samples(&self, project_id: &str, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM resource_metrics
            WHERE project_id = ?
              AND id NOT IN (
                SELECT id FROM resource_metrics
                WHERE project_id = ?
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(project_id)
        .bind(project_id)
        .bind(i64::from(keep))
        .execute(self.pool())
        .await
        .map_err(|e| SonkenError::database("trim_resource_samples", e))?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(deleted, "Trimmed resource samples");
        }
        Ok(deleted)
    }

    /// Last `limit` resource samples, oldest first.
    #[instrument(skip(self))]
    pub async fn recent_resource_samples(
        &self,
        project_id: &str,
        limit: u32,
    ) -> Result<Vec<ResourceSample>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, cpu_usage, memory_usage, disk_usage, timestamp
            FROM resource_metrics
            WHERE project_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(project_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| SonkenError::database("recent_resource_samples", e))?;

        let mut samples: Vec<_> = rows.iter().map(row_to_resource).collect();
        samples.reverse();
        Ok(samples)
    }

    /// Most recent resource sample.
    #[instrument(skip(self))]
    pub async fn latest_resource_sample(&self, project_id: &str) -> Result<Option<ResourceSample>> {
        Ok(self.recent_resource_samples(project_id, 1).await?.pop())
    }

    /// Number of stored resource samples for a project.
    pub async fn resource_sample_count(&self, project_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM resource_metrics WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| SonkenError::database("resource_sample_count", e))
    }

    // ========================
    // Database samples
    // ========================

    /// Record one database sample.
    #[instrument(skip(self, sample), fields(project_id = %sample.project_id))]
    pub async fn record_database(&self, sample: &DatabaseSample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO database_metrics (project_id, db_size, connection_count, slow_queries, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.project_id)
        .bind(sample.db_size_mb)
        .bind(sample.connection_count)
        .bind(sample.slow_query_count)
        .bind(to_millis(sample.timestamp))
        .execute(self.pool())
        .await
        .map_err(|e| SonkenError::database("record_database", e))?;

        Ok(())
    }

    /// Keep only the newest `keep` database samples for a project.
    #[instrument(skip(self))]
    pub async fn trim_database_samples(&self, project_id: &str, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM database_metrics
            WHERE project_id = ?
              AND id NOT IN (
                SELECT id FROM database_metrics
                WHERE project_id = ?
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(project_id)
        .bind(project_id)
        .bind(i64::from(keep))
        .execute(self.pool())
        .await
        .map_err(|e| SonkenError::database("trim_database_samples", e))?;

        Ok(result.rows_affected())
    }

    /// Last `limit` database samples, oldest first.
    #[instrument(skip(self))]
    pub async fn recent_database_samples(
        &self,
        project_id: &str,
        limit: u32,
    ) -> Result<Vec<DatabaseSample>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, db_size, connection_count, slow_queries, timestamp
            FROM database_metrics
            WHERE project_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(project_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| SonkenError::database("recent_database_samples", e))?;

        let mut samples: Vec<_> = rows.iter().map(row_to_database).collect();
        samples.reverse();
        Ok(samples)
    }

    /// Most recent database sample.
    #[instrument(skip(self))]
    pub async fn latest_database_sample(&self, project_id: &str) -> Result<Option<DatabaseSample>> {
        Ok(self.recent_database_samples(project_id, 1).await?.pop())
    }

    pub async fn database_sample_count(&self, project_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM database_metrics WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| SonkenError::database("database_sample_count", e))
    }

    // ========================
    // Slow queries
    // ========================

    /// Record a slow query event.
    #[instrument(skip(self, event), fields(project_id = %event.project_id))]
    pub async fn record_slow_query(&self, event: &SlowQueryEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO slow_queries (project_id, query, execution_time, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&event.project_id)
        .bind(&event.query_text)
        .bind(event.execution_time_ms)
        .bind(to_millis(event.timestamp))
        .execute(self.pool())
        .await
        .map_err(|e| SonkenError::database("record_slow_query", e))?;

        Ok(())
    }

    /// Delete a project's slow queries recorded before `older_than`.
    #[instrument(skip(self))]
    pub async fn purge_slow_queries(
        &self,
        project_id: &str,
        older_than: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM slow_queries WHERE project_id = ? AND timestamp < ?")
            .bind(project_id)
            .bind(to_millis(older_than))
            .execute(self.pool())
            .await
            .map_err(|e| SonkenError::database("purge_slow_queries", e))?;

        Ok(result.rows_affected())
    }

    /// Slow queries recorded for a project at or after `since`.
    #[instrument(skip(self))]
    pub async fn slow_query_count_since(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM slow_queries WHERE project_id = ? AND timestamp >= ?")
            .bind(project_id)
            .bind(to_millis(since))
            .fetch_one(self.pool())
            .await
            .map_err(|e| SonkenError::database("slow_query_count_since", e))
    }

    /// The `limit` slowest recorded queries, slowest first.
    #[instrument(skip(self))]
    pub async fn slowest_queries(&self, project_id: &str, limit: u32) -> Result<Vec<SlowQueryEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, query, execution_time, timestamp
            FROM slow_queries
            WHERE project_id = ?
            ORDER BY execution_time DESC
            LIMIT ?
            "#,
        )
        .bind(project_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| SonkenError::database("slowest_queries", e))?;

        Ok(rows
            .iter()
            .map(|row| SlowQueryEvent {
                project_id: row.get("project_id"),
                query_text: row.get("query"),
                execution_time_ms: row.get("execution_time"),
                timestamp: from_millis(row.get("timestamp")),
            })
            .collect())
    }

    /// Count and execution-time aggregates over all of a project's slow queries.
    #[instrument(skip(self))]
    pub async fn slow_query_stats(&self, project_id: &str) -> Result<SlowQueryStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                AVG(execution_time) AS avg_time,
                MIN(execution_time) AS min_time,
                MAX(execution_time) AS max_time
            FROM slow_queries
            WHERE project_id = ?
            "#,
        )
        .bind(project_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| SonkenError::database("slow_query_stats", e))?;

        Ok(SlowQueryStats {
            total_slow_queries: row.get("total"),
            avg_execution_time: row.get("avg_time"),
            min_execution_time: row.get("min_time"),
            max_execution_time: row.get("max_time"),
        })
    }

    /// Remove every metric and log row of a project.
    #[instrument(skip(self))]
    pub async fn delete_project_metrics(&self, project_id: &str) -> Result<()> {
        for table in
            ["resource_metrics", "database_metrics", "slow_queries", "http_requests", "error_logs"]
        {
            sqlx::query(&format!("DELETE FROM {table} WHERE project_id = ?"))
                .bind(project_id)
                .execute(self.pool())
                .await
                .map_err(|e| SonkenError::database("delete_project_metrics", e))?;
        }
        Ok(())
    }
}

fn row_to_resource(row: &SqliteRow) -> ResourceSample {
    ResourceSample {
        project_id: row.get("project_id"),
        cpu_usage: row.get("cpu_usage"),
        memory_usage: row.get("memory_usage"),
        disk_usage: row.get("disk_usage"),
        timestamp: from_millis(row.get("timestamp")),
    }
}

fn row_to_database(row: &SqliteRow) -> DatabaseSample {
    DatabaseSample {
        project_id: row.get("project_id"),
        db_size_mb: row.get("db_size"),
        connection_count: row.get("connection_count"),
        slow_query_count: row.get("slow_queries"),
        timestamp: from_millis(row.get("timestamp")),
    }
}
