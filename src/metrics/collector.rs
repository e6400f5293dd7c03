//! Host metrics collection using sysinfo and direct /sys access.

use crate::error::MetricUnavailable;
use crate::metrics::data::{percent, MetricReadings};
use crate::metrics::traits::MetricSource;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};

/// System metrics collector.
pub struct SystemCollector {
    system: System,
    disks: Disks,
    thermal_path: PathBuf,
    disk_mount: PathBuf,
    primed: bool,
}

impl SystemCollector {
    /// Create a collector reading temperature from `thermal_path` and disk
    /// usage for the filesystem mounted at `disk_mount`.
    pub fn new(thermal_path: impl Into<PathBuf>, disk_mount: impl Into<PathBuf>) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            thermal_path: thermal_path.into(),
            disk_mount: disk_mount.into(),
            primed: false,
        }
    }

    /// Refresh CPU counters. Usage is a delta between two refreshes, so the
    /// very first call waits out sysinfo's minimum update interval.
    fn refresh_cpu(&mut self) {
        self.system.refresh_cpu_usage();
        if !self.primed {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            self.system.refresh_cpu_usage();
            self.primed = true;
        }
    }

    fn cpu_percent(&self) -> Result<f32, MetricUnavailable> {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(MetricUnavailable::new("cpu_percent", "no CPU information"));
        }
        Ok(cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32)
    }

    fn cpu_cores(&self) -> Result<u32, MetricUnavailable> {
        match self.system.cpus().len() {
            0 => Err(MetricUnavailable::new("cpu_cores", "no CPU information")),
            n => Ok(n as u32),
        }
    }

    fn cpu_model(&self) -> Result<String, MetricUnavailable> {
        // Model is the same on every core of a Pi
        self.system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .or_else(read_cpuinfo_model)
            .ok_or_else(|| MetricUnavailable::new("cpu_model", "CPU brand not reported"))
    }

    fn memory_percent(&self) -> Result<f32, MetricUnavailable> {
        percent(self.system.used_memory(), self.system.total_memory())
            .ok_or_else(|| MetricUnavailable::new("memory_percent", "total memory is zero"))
    }

    fn disk_percent(&self) -> Result<f32, MetricUnavailable> {
        let disk = self
            .disks
            .iter()
            .find(|disk| disk.mount_point() == self.disk_mount.as_path())
            .ok_or_else(|| {
                MetricUnavailable::new(
                    "disk_percent",
                    format!("no filesystem mounted at {}", self.disk_mount.display()),
                )
            })?;

        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        percent(used, total)
            .ok_or_else(|| MetricUnavailable::new("disk_percent", "filesystem reports zero size"))
    }
}

impl MetricSource for SystemCollector {
    fn sample(&mut self) -> MetricReadings {
        self.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();

        MetricReadings {
            cpu_percent: self.cpu_percent(),
            cpu_cores: self.cpu_cores(),
            cpu_model: self.cpu_model(),
            cpu_temperature: read_temperature(&self.thermal_path),
            memory_percent: self.memory_percent(),
            disk_percent: self.disk_percent(),
        }
    }
}

/// Read a thermal zone file reporting millidegrees Celsius.
pub fn read_temperature(path: &Path) -> Result<f32, MetricUnavailable> {
    let raw = fs::read_to_string(path).map_err(|e| {
        MetricUnavailable::new("cpu_temperature", format!("{}: {}", path.display(), e))
    })?;
    let millicelsius = raw.trim().parse::<i32>().map_err(|e| {
        MetricUnavailable::new(
            "cpu_temperature",
            format!("unexpected value {:?}: {}", raw.trim(), e),
        )
    })?;
    Ok(millicelsius as f32 / 1000.0)
}

/// Fallback for kernels where sysinfo reports an empty brand (common on ARM).
fn read_cpuinfo_model() -> Option<String> {
    let cpuinfo = fs::read_to_string("/proc/cpuinfo").ok()?;
    cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        matches!(key.trim(), "Model" | "model name")
            .then(|| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_thermal_zone_is_unavailable() {
        let err = read_temperature(Path::new("/nonexistent/thermal_zone/temp")).unwrap_err();
        assert_eq!(err.metric, "cpu_temperature");
    }

    #[test]
    fn test_thermal_zone_parsing() {
        let path = std::env::temp_dir().join(format!("pdg-thermal-{}", std::process::id()));
        fs::write(&path, "48312\n").unwrap();
        let celsius = read_temperature(&path).unwrap();
        assert!((celsius - 48.312).abs() < 0.001);

        fs::write(&path, "garbage").unwrap();
        assert!(read_temperature(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_collector_degrades_per_metric() {
        let mut collector = SystemCollector::new("/nonexistent/temp", "/definitely/not/mounted");
        let readings = collector.sample();

        assert!(readings.cpu_temperature.is_err());
        assert!(readings.disk_percent.is_err());
        assert!(readings.cpu_cores.is_ok(), "host CPUs should be visible");
        assert!(readings.memory_percent.is_ok());
    }
}
