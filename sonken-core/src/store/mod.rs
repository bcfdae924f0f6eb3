//! Metric store.
//!
//! Append-only, per-project time series kept in the state database:
//!
//! ```text
//! ┌──────────────────┐  record_*   ┌────────────────────────────┐
//! │ ResourceSampler  │ ──────────► │ resource_metrics           │
//! │ DatabaseSampler  │ ──────────► │ database_metrics           │
//! │ SlowQueryLog     │ ──────────► │ slow_queries               │
//! │ (request layer)  │ ──────────► │ http_requests / error_logs │
//! └──────────────────┘  trim_*     └────────────────────────────┘
//!                       purge_*          ▲
//!                                        │ recent_* / latest_* / *_stats
//!                                  dashboard queries
//! ```
//!
//! Rows are only ever inserted or deleted. Sample tables are capped by row
//! count per project; slow queries age out by wall-clock time.

mod logs;
mod samples;

use crate::state::StateManager;
use std::sync::Arc;

/// Handle to the metric tables. Cheap to clone.
#[derive(Clone)]
pub struct MetricsStore {
    state: Arc<StateManager>,
}

impl MetricsStore {
    pub fn new(state: Arc<StateManager>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.state.pool()
    }
}
