//! Periodic host resource sampling for one project.

use super::host::{primary_disk_usage, HostMetrics};
use super::task::{PeriodicTask, SamplerJob, TickOutcome};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::events::{Broadcaster, MonitorEvent};
use crate::store::MetricsStore;
use crate::types::ResourceSample;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records CPU, memory and disk usage for a project on a fixed interval.
///
/// Readings are host-wide; the project id only scopes where they are stored
/// and which dashboard view receives them.
pub struct ResourceSampler {
    project_id: String,
    store: MetricsStore,
    host: Arc<dyn HostMetrics>,
    broadcaster: Broadcaster,
    config: MonitorConfig,
    task: Option<PeriodicTask>,
}

impl ResourceSampler {
    pub fn new(
        project_id: impl Into<String>,
        store: MetricsStore,
        host: Arc<dyn HostMetrics>,
        broadcaster: Broadcaster,
        config: MonitorConfig,
    ) -> Self {
        Self { project_id: project_id.into(), store, host, broadcaster, config, task: None }
    }

    /// Begin sampling. The first sample is taken immediately.
    ///
    /// Does nothing if already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            debug!(project_id = %self.project_id, "Resource sampler already running");
            return;
        }

        let job = ResourceJob {
            project_id: self.project_id.clone(),
            store: self.store.clone(),
            host: self.host.clone(),
            broadcaster: self.broadcaster.clone(),
            retention_rows: self.config.sample_retention_rows,
        };
        let interval = self.config.resource_interval();
        self.task = Some(PeriodicTask::spawn(job, interval, MonitorConfig::tick_timeout(interval)));

        info!(project_id = %self.project_id, interval_ms = self.config.resource_interval_ms, "Started resource monitoring");
    }

    /// Stop sampling and wait for any in-flight tick. No-op if not running.
    pub async fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop().await;
            info!(project_id = %self.project_id, "Stopped resource monitoring");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

struct ResourceJob {
    project_id: String,
    store: MetricsStore,
    host: Arc<dyn HostMetrics>,
    broadcaster: Broadcaster,
    retention_rows: u32,
}

#[async_trait]
impl SamplerJob for ResourceJob {
    fn kind(&self) -> &'static str {
        "resource"
    }

    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn tick(&mut self) -> Result<TickOutcome> {
        let (cpu, memory, filesystems) = tokio::try_join!(
            self.host.cpu_load(),
            self.host.memory(),
            self.host.filesystems()
        )?;

        let sample = ResourceSample {
            project_id: self.project_id.clone(),
            cpu_usage: cpu.clamp(0.0, 100.0),
            memory_usage: memory.used_percent()?,
            disk_usage: primary_disk_usage(&filesystems).clamp(0.0, 100.0),
            timestamp: Utc::now(),
        };

        self.store.record_resource(&sample).await?;
        self.broadcaster.emit(&MonitorEvent::resource(
            &self.project_id,
            sample.cpu_usage,
            sample.memory_usage,
            sample.disk_usage,
            sample.timestamp,
        ));

        // The sample is already persisted; a failed trim is retried next tick.
        if let Err(e) = self.store.trim_resource_samples(&self.project_id, self.retention_rows).await {
            warn!(project_id = %self.project_id, error = %e, "Failed to trim resource samples");
        }

        Ok(TickOutcome::Recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SonkenError;
    use crate::monitor::host::{FilesystemUsage, MemoryInfo};
    use crate::state::StateManager;
    use crate::types::Project;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedHost {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl HostMetrics for FixedHost {
        async fn cpu_load(&self) -> Result<f64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_on {
                return Err(SonkenError::HostMetrics { reason: "injected".to_string() });
            }
            Ok(37.5)
        }

        async fn memory(&self) -> Result<MemoryInfo> {
            Ok(MemoryInfo { used: 3, total: 4 })
        }

        async fn filesystems(&self) -> Result<Vec<FilesystemUsage>> {
            Ok(vec![FilesystemUsage { mount_point: PathBuf::from("/"), used_percent: 60.0 }])
        }
    }

    async fn job(fail_on: Option<usize>, retention_rows: u32) -> (ResourceJob, Broadcaster) {
        let state = Arc::new(StateManager::new_in_memory().await.unwrap());
        state.insert_project(&Project::new("p1", "p1", "/srv/p1")).await.unwrap();
        let broadcaster = Broadcaster::new();
        let job = ResourceJob {
            project_id: "p1".to_string(),
            store: MetricsStore::new(state),
            host: Arc::new(FixedHost { calls: AtomicUsize::new(0), fail_on }),
            broadcaster: broadcaster.clone(),
            retention_rows,
        };
        (job, broadcaster)
    }

    #[tokio::test]
    async fn test_tick_persists_and_emits() {
        let (mut job, broadcaster) = job(None, 1000).await;
        let mut client = broadcaster.subscribe();

        assert_eq!(job.tick().await.unwrap(), TickOutcome::Recorded);

        let sample = job.store.latest_resource_sample("p1").await.unwrap().unwrap();
        assert_eq!(sample.cpu_usage, 37.5);
        assert!((sample.memory_usage - 75.0).abs() < 1e-9);
        assert_eq!(sample.disk_usage, 60.0);

        let text = tokio::time::timeout(Duration::from_millis(100), client.recv())
            .await
            .unwrap()
            .unwrap();
        let msg: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(msg["type"], "resource_update");
        assert_eq!(msg["data"]["memory"], 75.0);
    }

    #[tokio::test]
    async fn test_failed_reading_writes_nothing() {
        let (mut job, _broadcaster) = job(Some(1), 1000).await;

        assert!(job.tick().await.is_err());
        assert_eq!(job.store.resource_sample_count("p1").await.unwrap(), 0);

        job.tick().await.unwrap();
        assert_eq!(job.store.resource_sample_count("p1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tick_enforces_retention() {
        let (mut job, _broadcaster) = job(None, 3).await;
        for _ in 0..5 {
            job.tick().await.unwrap();
        }
        assert_eq!(job.store.resource_sample_count("p1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_halts() {
        let (job, broadcaster) = job(None, 1000).await;
        let config = MonitorConfig { resource_interval_ms: 20, ..MonitorConfig::default() };
        let mut sampler =
            ResourceSampler::new("p1", job.store.clone(), job.host.clone(), broadcaster, config);

        sampler.start();
        sampler.start();
        assert!(sampler.is_running());
        tokio::time::sleep(Duration::from_millis(70)).await;

        sampler.stop().await;
        assert!(!sampler.is_running());
        let after_stop = job.store.resource_sample_count("p1").await.unwrap();
        assert!(after_stop >= 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(job.store.resource_sample_count("p1").await.unwrap(), after_stop);

        sampler.stop().await;
    }
}
