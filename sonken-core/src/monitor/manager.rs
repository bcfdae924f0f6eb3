//! Registry of per-project sampler pairs.

use super::database::{DatabaseSampler, SlowQueryLog};
use super::host::{HostMetrics, SysinfoHost};
use super::resource::ResourceSampler;
use super::target::{DatabaseConnector, MySqlConnector};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::events::Broadcaster;
use crate::state::StateManager;
use crate::store::MetricsStore;
use crate::types::ProjectStatus;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// The two samplers running for one project.
struct SamplerPair {
    resource: ResourceSampler,
    database: DatabaseSampler,
}

impl SamplerPair {
    async fn stop(mut self) {
        tokio::join!(self.resource.stop(), self.database.stop());
    }
}

/// A registry entry. A project stays `Stopping` until its samplers have fully
/// stopped; the token is cancelled once the entry is gone.
enum Slot {
    Active(SamplerPair),
    Stopping(CancellationToken),
}

type Registry = Arc<Mutex<HashMap<String, Slot>>>;

fn record_active(monitors: &HashMap<String, Slot>) {
    let active = monitors.values().filter(|slot| matches!(slot, Slot::Active(_))).count();
    metrics::gauge!("sonken_active_monitors").set(active as f64);
}

/// Stop `pair` on its own task, then release the project's slot.
///
/// Runs detached so a caller that gives up waiting cannot leave the slot
/// stuck in `Stopping`.
fn retire(
    monitors: Registry,
    project_id: String,
    pair: SamplerPair,
    done: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        pair.stop().await;
        monitors.lock().await.remove(&project_id);
        done.cancel();
        info!(project_id = %project_id, "Stopped monitoring project");
    })
}

/// Starts, tracks and stops monitoring for projects.
///
/// At most one sampler pair exists per project. Starting an already
/// monitored project or stopping an unmonitored one is a no-op.
pub struct MonitorManager {
    state: Arc<StateManager>,
    store: MetricsStore,
    broadcaster: Broadcaster,
    host: Arc<dyn HostMetrics>,
    connector: Arc<dyn DatabaseConnector>,
    slow_queries: SlowQueryLog,
    config: MonitorConfig,
    monitors: Registry,
}

impl MonitorManager {
    /// Create a manager reading the local host and MySQL server from `config`.
    pub fn new(state: Arc<StateManager>, broadcaster: Broadcaster, config: MonitorConfig) -> Self {
        let connector = MySqlConnector::new(config.database_host.clone(), config.database_port);
        Self::with_sources(state, broadcaster, config, Arc::new(SysinfoHost::new()), Arc::new(connector))
    }

    /// Create a manager with explicit metric sources.
    pub fn with_sources(
        state: Arc<StateManager>,
        broadcaster: Broadcaster,
        config: MonitorConfig,
        host: Arc<dyn HostMetrics>,
        connector: Arc<dyn DatabaseConnector>,
    ) -> Self {
        let store = MetricsStore::new(state.clone());
        let slow_queries = SlowQueryLog::new(
            store.clone(),
            broadcaster.clone(),
            Duration::from_millis(config.slow_query_threshold_ms),
        );
        Self {
            state,
            store,
            broadcaster,
            host,
            connector,
            slow_queries,
            config,
            monitors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn slow_query_log(&self) -> &SlowQueryLog {
        &self.slow_queries
    }

    /// Start monitoring every project whose status is running.
    ///
    /// Returns the number of projects newly put under monitoring.
    #[instrument(skip(self))]
    pub async fn start_all(&self) -> Result<usize> {
        let projects = self.state.list_projects_by_status(ProjectStatus::Running).await?;

        let mut started = 0;
        for project in &projects {
            if self.start_project_monitoring(&project.id).await {
                started += 1;
            }
        }

        info!(running = projects.len(), started, "Started monitoring for running projects");
        Ok(started)
    }

    /// Start both samplers for a project. Returns `false` if it was already monitored.
    ///
    /// If the project is still being stopped, waits for that to finish first.
    #[instrument(skip(self))]
    pub async fn start_project_monitoring(&self, project_id: &str) -> bool {
        loop {
            let mut monitors = self.monitors.lock().await;
            match monitors.get(project_id) {
                Some(Slot::Active(_)) => return false,
                Some(Slot::Stopping(done)) => {
                    let done = done.clone();
                    drop(monitors);
                    done.cancelled().await;
                }
                None => {
                    self.spawn_pair(&mut monitors, project_id);
                    return true;
                }
            }
        }
    }

    fn spawn_pair(&self, monitors: &mut HashMap<String, Slot>, project_id: &str) {
        let mut resource = ResourceSampler::new(
            project_id,
            self.store.clone(),
            self.host.clone(),
            self.broadcaster.clone(),
            self.config.clone(),
        );
        let mut database = DatabaseSampler::new(
            project_id,
            self.store.clone(),
            self.connector.clone(),
            self.broadcaster.clone(),
            self.config.clone(),
        );
        resource.start();
        database.start();

        monitors.insert(project_id.to_string(), Slot::Active(SamplerPair { resource, database }));
        record_active(monitors);

        info!("Started monitoring project");
    }

    /// Stop both samplers for a project. Returns `false` if it was not monitored.
    ///
    /// Waits for in-flight ticks, so no further samples are written for the
    /// project once this returns. The project counts as taken until then, and a
    /// concurrent start waits for the stop rather than opening a second pair.
    #[instrument(skip(self))]
    pub async fn stop_project_monitoring(&self, project_id: &str) -> bool {
        let retiring = {
            let mut monitors = self.monitors.lock().await;
            match monitors.remove(project_id) {
                Some(Slot::Active(pair)) => {
                    let done = CancellationToken::new();
                    monitors.insert(project_id.to_string(), Slot::Stopping(done.clone()));
                    record_active(&monitors);
                    Ok(retire(self.monitors.clone(), project_id.to_string(), pair, done))
                }
                Some(Slot::Stopping(done)) => {
                    monitors.insert(project_id.to_string(), Slot::Stopping(done.clone()));
                    Err(Some(done))
                }
                None => Err(None),
            }
        };

        match retiring {
            Ok(handle) => {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Sampler shutdown task failed");
                }
                true
            }
            Err(Some(done)) => {
                done.cancelled().await;
                false
            }
            Err(None) => false,
        }
    }

    /// Stop every running sampler pair.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) {
        let (count, pending) = {
            let mut monitors = self.monitors.lock().await;
            let active: Vec<String> = monitors
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
                .map(|(id, _)| id.clone())
                .collect();

            for id in &active {
                let done = CancellationToken::new();
                if let Some(Slot::Active(pair)) = monitors.insert(id.clone(), Slot::Stopping(done.clone())) {
                    retire(self.monitors.clone(), id.clone(), pair, done);
                }
            }
            record_active(&monitors);

            let pending: Vec<CancellationToken> = monitors
                .values()
                .filter_map(|slot| match slot {
                    Slot::Stopping(done) => Some(done.clone()),
                    Slot::Active(_) => None,
                })
                .collect();
            (active.len(), pending)
        };

        join_all(pending.iter().map(|done| done.cancelled())).await;
        info!(count, "Stopped all monitoring");
    }

    /// Ids of all monitored projects, sorted.
    pub async fn active_project_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .monitors
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn is_monitoring(&self, project_id: &str) -> bool {
        matches!(self.monitors.lock().await.get(project_id), Some(Slot::Active(_)))
    }

    /// Record a slow query for a project, whether or not it is monitored.
    pub async fn log_slow_query(
        &self,
        project_id: &str,
        query_text: &str,
        execution_time_ms: f64,
    ) -> Result<()> {
        self.slow_queries.record(project_id, query_text, execution_time_ms).await
    }

    /// Persist a project's status and start or stop its monitoring to match.
    #[instrument(skip(self))]
    pub async fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        self.state.update_project_status(project_id, status).await?;

        match status {
            ProjectStatus::Running => {
                self.start_project_monitoring(project_id).await;
            }
            ProjectStatus::Stopped => {
                self.stop_project_monitoring(project_id).await;
            }
        }
        Ok(())
    }
}
