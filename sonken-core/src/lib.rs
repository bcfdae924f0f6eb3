//! Sonken Core Library
//!
//! Monitoring for locally managed PHP projects: per-project samplers, the
//! metric store they write to, and the live-update channel they publish on.

pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod observability;
pub mod paths;
pub mod state;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use config::{Config, MonitorConfig};
pub use error::{Result, SonkenError};
pub use events::{Broadcaster, LiveClient, MonitorEvent};
pub use monitor::{MonitorManager, SlowQueryLog};
pub use observability::{init as init_observability, shutdown as shutdown_observability};
pub use state::StateManager;
pub use store::MetricsStore;
pub use types::{
    DatabaseCredentials, DatabaseSample, Project, ProjectStatus, ResourceSample, SlowQueryEvent,
    SlowQueryStats,
};
