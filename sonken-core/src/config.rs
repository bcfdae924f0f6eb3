//! Configuration management.
//!
//! Values are layered: built-in defaults, then `config.json` in the config
//! directory, then `SONKEN_*` environment variables.

use crate::error::{Result, SonkenError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Smallest bound applied to a single sampler tick.
const MIN_TICK_TIMEOUT: Duration = Duration::from_secs(1);

/// Persistent configuration for the Sonken daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: String,
    pub db_path: String,
    pub listen_addr: String,
    pub metrics_port: u16,
    pub log_level: String,
    pub monitor: MonitorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: paths::data_dir().to_string_lossy().to_string(),
            db_path: paths::db_path().to_string_lossy().to_string(),
            listen_addr: "127.0.0.1:3001".to_string(),
            metrics_port: 9464,
            log_level: "info".to_string(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Sampler timing, retention and target-database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub resource_interval_ms: u64,
    pub database_interval_ms: u64,
    /// Informational only: call sites decide when a query is slow.
    pub slow_query_threshold_ms: u64,
    /// Rows kept per project for resource and database samples.
    pub sample_retention_rows: u32,
    pub slow_query_retention_days: u32,
    /// Rolling window the database sampler counts slow queries over.
    pub slow_query_window_secs: u64,
    pub database_host: String,
    pub database_port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            resource_interval_ms: 2000,
            database_interval_ms: 5000,
            slow_query_threshold_ms: 1000,
            sample_retention_rows: 1000,
            slow_query_retention_days: 7,
            slow_query_window_secs: 3600,
            database_host: "localhost".to_string(),
            database_port: 3306,
        }
    }
}

impl MonitorConfig {
    pub fn resource_interval(&self) -> Duration {
        Duration::from_millis(self.resource_interval_ms)
    }

    pub fn database_interval(&self) -> Duration {
        Duration::from_millis(self.database_interval_ms)
    }

    pub fn slow_query_window(&self) -> Duration {
        Duration::from_secs(self.slow_query_window_secs)
    }

    pub fn slow_query_retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.slow_query_retention_days) * 24 * 3600)
    }

    /// Upper bound for one tick of a sampler running every `interval`.
    pub fn tick_timeout(interval: Duration) -> Duration {
        interval.max(MIN_TICK_TIMEOUT)
    }

    /// Check that intervals and retention bounds are usable.
    pub fn validate(&self) -> Result<()> {
        if self.resource_interval_ms == 0 || self.database_interval_ms == 0 {
            return Err(SonkenError::InvalidConfig {
                reason: "sampling intervals must be greater than zero".to_string(),
            });
        }
        if self.sample_retention_rows == 0 {
            return Err(SonkenError::InvalidConfig {
                reason: "sample_retention_rows must be greater than zero".to_string(),
            });
        }
        if self.slow_query_retention_days == 0 {
            return Err(SonkenError::InvalidConfig {
                reason: "slow_query_retention_days must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Config {
    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join("config.json")
    }

    /// Load configuration from the default location with env overrides applied.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path` (defaults if missing) with env overrides applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| SonkenError::IoError { path: path.to_path_buf(), source: e })?;
            serde_json::from_str(&content).map_err(|e| SonkenError::InvalidConfig {
                reason: format!("Failed to parse config: {}", e),
            })?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.monitor.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SonkenError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| SonkenError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Apply `SONKEN_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("SONKEN_DATA_DIR") {
            self.db_path = Path::new(&dir).join("sonken.db").to_string_lossy().to_string();
            self.data_dir = dir;
        }
        if let Some(path) = lookup("SONKEN_DB_PATH") {
            self.db_path = path;
        }
        if let Some(addr) = lookup("SONKEN_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(host) = lookup("SONKEN_DATABASE_HOST") {
            self.monitor.database_host = host;
        }
        override_parsed(&lookup, "SONKEN_METRICS_PORT", &mut self.metrics_port)?;
        override_parsed(&lookup, "SONKEN_RESOURCE_INTERVAL_MS", &mut self.monitor.resource_interval_ms)?;
        override_parsed(&lookup, "SONKEN_DATABASE_INTERVAL_MS", &mut self.monitor.database_interval_ms)?;
        override_parsed(
            &lookup,
            "SONKEN_SLOW_QUERY_THRESHOLD_MS",
            &mut self.monitor.slow_query_threshold_ms,
        )?;
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|_| SonkenError::InvalidConfig {
            reason: format!("{} must be a number, got '{}'", key, raw),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.monitor.resource_interval(), Duration::from_secs(2));
        assert_eq!(config.monitor.database_interval(), Duration::from_secs(5));
        assert_eq!(config.monitor.slow_query_threshold_ms, 1000);
        assert_eq!(config.monitor.sample_retention_rows, 1000);
        assert_eq!(config.monitor.slow_query_retention(), Duration::from_secs(7 * 86400));
        assert!(config.monitor.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("SONKEN_RESOURCE_INTERVAL_MS", "250"),
            ("SONKEN_SLOW_QUERY_THRESHOLD_MS", "40"),
            ("SONKEN_DB_PATH", "/tmp/x.db"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.monitor.resource_interval_ms, 250);
        assert_eq!(config.monitor.slow_query_threshold_ms, 40);
        assert_eq!(config.monitor.database_interval_ms, 5000);
        assert_eq!(config.db_path, "/tmp/x.db");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let vars = env(&[("SONKEN_DATABASE_INTERVAL_MS", "soon")]);
        let mut config = Config::default();
        let err = config.apply_env(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, SonkenError::InvalidConfig { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let monitor = MonitorConfig { resource_interval_ms: 0, ..Default::default() };
        assert!(monitor.validate().is_err());
    }

    #[test]
    fn test_tick_timeout_has_floor() {
        assert_eq!(MonitorConfig::tick_timeout(Duration::from_millis(20)), MIN_TICK_TIMEOUT);
        assert_eq!(
            MonitorConfig::tick_timeout(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_save_and_load_roundtrip_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"monitor": {"database_interval_ms": 9000}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.monitor.database_interval_ms, 9000);
        assert_eq!(config.monitor.resource_interval_ms, 2000);

        config.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.monitor.database_interval_ms, 9000);
    }
}
