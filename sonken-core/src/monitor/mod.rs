//! Per-project background samplers and the manager that owns them.
//!
//! ```text
//!                      MonitorManager
//!                 project_id -> SamplerPair
//!                  /                    \
//!     ResourceSampler                  DatabaseSampler
//!     (HostMetrics)                    (DatabaseConnector -> DatabaseProbe)
//!            \                              /
//!             PeriodicTask: tick, persist, emit, trim
//!                         |          |
//!                   MetricsStore  Broadcaster
//! ```
//!
//! Every sampler runs on its own [`PeriodicTask`]: one tick immediately, then
//! one per interval, never two at once. A failed tick is logged and leaves no
//! row behind; the next tick runs as scheduled.

pub mod database;
pub mod host;
pub mod manager;
pub mod resource;
pub mod target;
pub mod task;

pub use database::{DatabaseSampler, SlowQueryLog};
pub use host::{primary_disk_usage, FilesystemUsage, HostMetrics, MemoryInfo, SysinfoHost};
pub use manager::MonitorManager;
pub use resource::ResourceSampler;
pub use target::{DatabaseConnector, DatabaseProbe, MySqlConnector};
pub use task::{PeriodicTask, SamplerJob, TickOutcome};
