//! Periodic sampling of a project's own database, plus the slow-query log.

use super::target::{DatabaseConnector, DatabaseProbe};
use super::task::{PeriodicTask, SamplerJob, TickOutcome};
use crate::config::MonitorConfig;
use crate::error::{Result, SonkenError};
use crate::events::{Broadcaster, MonitorEvent};
use crate::state::StateManager;
use crate::store::MetricsStore;
use crate::types::{DatabaseSample, SlowQueryEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

fn ago(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now - chrono::Duration::from_std(span).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Records size, connection count and recent slow-query count of a
/// project's database on a fixed interval.
///
/// Projects without a configured database are skipped quietly on every tick.
/// The connection is opened lazily and reused until a tick fails or the
/// sampler stops.
pub struct DatabaseSampler {
    project_id: String,
    state: Arc<StateManager>,
    store: MetricsStore,
    connector: Arc<dyn DatabaseConnector>,
    broadcaster: Broadcaster,
    config: MonitorConfig,
    task: Option<PeriodicTask>,
}

impl DatabaseSampler {
    pub fn new(
        project_id: impl Into<String>,
        store: MetricsStore,
        connector: Arc<dyn DatabaseConnector>,
        broadcaster: Broadcaster,
        config: MonitorConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            state: store.state().clone(),
            store,
            connector,
            broadcaster,
            config,
            task: None,
        }
    }

    /// Begin sampling. The first sample is taken immediately.
    ///
    /// Does nothing if already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            debug!(project_id = %self.project_id, "Database sampler already running");
            return;
        }

        let job = DatabaseJob {
            project_id: self.project_id.clone(),
            state: self.state.clone(),
            store: self.store.clone(),
            connector: self.connector.clone(),
            broadcaster: self.broadcaster.clone(),
            retention_rows: self.config.sample_retention_rows,
            slow_query_window: self.config.slow_query_window(),
            slow_query_retention: self.config.slow_query_retention(),
            probe: None,
        };
        let interval = self.config.database_interval();
        self.task = Some(PeriodicTask::spawn(job, interval, MonitorConfig::tick_timeout(interval)));

        info!(project_id = %self.project_id, interval_ms = self.config.database_interval_ms, "Started database monitoring");
    }

    /// Stop sampling and close the connection, if any. No-op if not running.
    pub async fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop().await;
            info!(project_id = %self.project_id, "Stopped database monitoring");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

struct DatabaseJob {
    project_id: String,
    state: Arc<StateManager>,
    store: MetricsStore,
    connector: Arc<dyn DatabaseConnector>,
    broadcaster: Broadcaster,
    retention_rows: u32,
    slow_query_window: Duration,
    slow_query_retention: Duration,
    probe: Option<Box<dyn DatabaseProbe>>,
}

impl DatabaseJob {
    /// Open a connection if none is held. `false` means there is nothing to connect to.
    async fn ensure_connected(&mut self) -> Result<bool> {
        if self.probe.is_some() {
            return Ok(true);
        }

        let credentials = self
            .state
            .find_project(&self.project_id)
            .await?
            .and_then(|project| project.database_credentials());

        let Some(credentials) = credentials else {
            return Ok(false);
        };

        self.probe = Some(self.connector.connect(&self.project_id, &credentials).await?);
        metrics::counter!("sonken_target_connections_total").increment(1);
        Ok(true)
    }

    async fn disconnect(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe.close().await;
        }
    }

    async fn prune(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.store.trim_database_samples(&self.project_id, self.retention_rows).await?;
        let purged = self
            .store
            .purge_slow_queries(&self.project_id, ago(now, self.slow_query_retention))
            .await?;
        if purged > 0 {
            debug!(project_id = %self.project_id, purged, "Purged expired slow queries");
        }
        Ok(())
    }
}

#[async_trait]
impl SamplerJob for DatabaseJob {
    fn kind(&self) -> &'static str {
        "database"
    }

    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn tick(&mut self) -> Result<TickOutcome> {
        if !self.ensure_connected().await? {
            return Ok(TickOutcome::Skipped);
        }
        let Some(probe) = self.probe.as_mut() else {
            return Ok(TickOutcome::Skipped);
        };

        let db_size_mb = probe.size_mb().await?;
        let connection_count = probe.connection_count().await?;

        let now = Utc::now();
        let slow_query_count = self
            .store
            .slow_query_count_since(&self.project_id, ago(now, self.slow_query_window))
            .await?;

        let sample = DatabaseSample {
            project_id: self.project_id.clone(),
            db_size_mb,
            connection_count,
            slow_query_count,
            timestamp: now,
        };

        self.store.record_database(&sample).await?;
        self.broadcaster.emit(&MonitorEvent::database(
            &self.project_id,
            sample.db_size_mb,
            sample.connection_count,
            sample.slow_query_count,
            sample.timestamp,
        ));

        if let Err(e) = self.prune(now).await {
            warn!(project_id = %self.project_id, error = %e, "Failed to prune database metrics");
        }

        Ok(TickOutcome::Recorded)
    }

    async fn on_error(&mut self, _err: &SonkenError) {
        self.disconnect().await;
    }

    async fn shutdown(&mut self) {
        self.disconnect().await;
    }
}

/// Records slow queries reported by the request-handling layer.
///
/// Every reported query is stored and broadcast; the threshold is exposed so
/// callers can decide what to report.
#[derive(Clone)]
pub struct SlowQueryLog {
    store: MetricsStore,
    broadcaster: Broadcaster,
    threshold: Duration,
}

impl SlowQueryLog {
    pub fn new(store: MetricsStore, broadcaster: Broadcaster, threshold: Duration) -> Self {
        Self { store, broadcaster, threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Whether a query that took `execution_time_ms` ran longer than the threshold.
    pub fn exceeds_threshold(&self, execution_time_ms: f64) -> bool {
        execution_time_ms > self.threshold.as_secs_f64() * 1000.0
    }

    /// Store a slow query and notify live clients.
    #[instrument(skip(self, query_text))]
    pub async fn record(&self, project_id: &str, query_text: &str, execution_time_ms: f64) -> Result<()> {
        if !execution_time_ms.is_finite() || execution_time_ms < 0.0 {
            return Err(SonkenError::InvalidInput {
                reason: format!("execution time must be a non-negative number, got {}", execution_time_ms),
            });
        }

        let event = SlowQueryEvent {
            project_id: project_id.to_string(),
            query_text: query_text.to_string(),
            execution_time_ms,
            timestamp: Utc::now(),
        };

        self.store.record_slow_query(&event).await?;
        metrics::counter!("sonken_slow_queries_total").increment(1);

        self.broadcaster.emit(&MonitorEvent::slow_query(
            project_id,
            query_text,
            execution_time_ms,
            event.timestamp,
        ));

        debug!("Recorded slow query");
        Ok(())
    }
}
