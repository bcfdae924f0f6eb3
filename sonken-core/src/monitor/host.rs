//! Host resource readings.

use crate::error::{Result, SonkenError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};

/// Memory totals in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub used: u64,
    pub total: u64,
}

impl MemoryInfo {
    /// Used memory as a percentage of total.
    pub fn used_percent(&self) -> Result<f64> {
        if self.total == 0 {
            return Err(SonkenError::HostMetrics {
                reason: "host reports zero total memory".to_string(),
            });
        }
        Ok((self.used as f64 / self.total as f64 * 100.0).clamp(0.0, 100.0))
    }
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemUsage {
    pub mount_point: PathBuf,
    /// Used space as a percentage of capacity (0-100)
    pub used_percent: f64,
}

/// Source of host-wide CPU, memory and filesystem readings.
#[async_trait]
pub trait HostMetrics: Send + Sync {
    /// Current overall CPU load as a percentage (0-100).
    async fn cpu_load(&self) -> Result<f64>;

    async fn memory(&self) -> Result<MemoryInfo>;

    async fn filesystems(&self) -> Result<Vec<FilesystemUsage>>;
}

/// Usage of the root filesystem, falling back to the first listed one.
///
/// Returns 0 when no filesystem is reported.
pub fn primary_disk_usage(filesystems: &[FilesystemUsage]) -> f64 {
    filesystems
        .iter()
        .find(|fs| fs.mount_point == Path::new("/"))
        .or_else(|| filesystems.first())
        .map(|fs| fs.used_percent)
        .unwrap_or(0.0)
}

struct CpuState {
    system: System,
    refreshed_at: Instant,
    last: Option<f64>,
}

impl CpuState {
    /// How long to hold off before the next refresh yields a usable reading.
    ///
    /// `None` means the cached load is still current.
    fn wait_before_refresh(&self) -> Option<Duration> {
        let since = self.refreshed_at.elapsed();
        match self.last {
            Some(_) if since < MINIMUM_CPU_UPDATE_INTERVAL => None,
            Some(_) => Some(Duration::ZERO),
            None => Some(MINIMUM_CPU_UPDATE_INTERVAL.saturating_sub(since)),
        }
    }
}

/// [`HostMetrics`] backed by `sysinfo`.
///
/// CPU load is computed between successive refreshes, so one instance is kept
/// for the lifetime of the process and shared by all samplers. Readings
/// requested faster than sysinfo can measure reuse the previous value, and the
/// first reading waits until a full measurement window has passed since
/// construction.
pub struct SysinfoHost {
    cpu: Mutex<CpuState>,
    memory: Mutex<System>,
}

impl SysinfoHost {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            cpu: Mutex::new(CpuState { system, refreshed_at: Instant::now(), last: None }),
            memory: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> SonkenError {
    SonkenError::HostMetrics { reason: "host sampler state poisoned".to_string() }
}

#[async_trait]
impl HostMetrics for SysinfoHost {
    async fn cpu_load(&self) -> Result<f64> {
        loop {
            let wait = {
                let mut state = self.cpu.lock().map_err(|_| poisoned())?;
                match state.wait_before_refresh() {
                    None => return state.last.ok_or_else(poisoned),
                    Some(wait) if wait.is_zero() => {
                        state.system.refresh_cpu_usage();
                        let load = f64::from(state.system.global_cpu_usage()).clamp(0.0, 100.0);
                        state.refreshed_at = Instant::now();
                        state.last = Some(load);
                        return Ok(load);
                    }
                    Some(wait) => wait,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    async fn memory(&self) -> Result<MemoryInfo> {
        let mut system = self.memory.lock().map_err(|_| poisoned())?;
        system.refresh_memory();
        Ok(MemoryInfo { used: system.used_memory(), total: system.total_memory() })
    }

    async fn filesystems(&self) -> Result<Vec<FilesystemUsage>> {
        tokio::task::spawn_blocking(|| {
            Disks::new_with_refreshed_list()
                .iter()
                .filter(|disk| disk.total_space() > 0)
                .map(|disk| {
                    let total = disk.total_space();
                    let used = total.saturating_sub(disk.available_space());
                    FilesystemUsage {
                        mount_point: disk.mount_point().to_path_buf(),
                        used_percent: used as f64 / total as f64 * 100.0,
                    }
                })
                .collect()
        })
        .await
        .map_err(|e| SonkenError::HostMetrics { reason: format!("disk listing failed: {}", e) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs(mount: &str, used_percent: f64) -> FilesystemUsage {
        FilesystemUsage { mount_point: PathBuf::from(mount), used_percent }
    }

    #[test]
    fn test_memory_percent() {
        let info = MemoryInfo { used: 4, total: 16 };
        assert!((info.used_percent().unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_memory_is_an_error() {
        let info = MemoryInfo { used: 0, total: 0 };
        assert!(matches!(info.used_percent(), Err(SonkenError::HostMetrics { .. })));
    }

    #[test]
    fn test_primary_disk_prefers_root() {
        let list = vec![fs("/boot", 10.0), fs("/", 42.0), fs("/home", 90.0)];
        assert_eq!(primary_disk_usage(&list), 42.0);
    }

    #[test]
    fn test_primary_disk_falls_back_to_first() {
        assert_eq!(primary_disk_usage(&[fs("/data", 33.0), fs("/srv", 1.0)]), 33.0);
        assert_eq!(primary_disk_usage(&[]), 0.0);
    }

    #[tokio::test]
    async fn test_first_cpu_reading_spans_a_full_window() {
        let created = Instant::now();
        let host = SysinfoHost::new();

        let first = host.cpu_load().await.unwrap();
        assert!(created.elapsed() >= MINIMUM_CPU_UPDATE_INTERVAL);
        assert!((0.0..=100.0).contains(&first));

        let again = Instant::now();
        assert_eq!(host.cpu_load().await.unwrap(), first);
        assert!(again.elapsed() < MINIMUM_CPU_UPDATE_INTERVAL);
    }

    #[tokio::test]
    async fn test_sysinfo_readings_in_range() {
        let host = SysinfoHost::new();

        let cpu = host.cpu_load().await.unwrap();
        assert!((0.0..=100.0).contains(&cpu));

        let memory = host.memory().await.unwrap();
        assert!(memory.total > 0);
        assert!(memory.used <= memory.total);

        for fs in host.filesystems().await.unwrap() {
            assert!((0.0..=100.0).contains(&fs.used_percent));
        }
    }
}
